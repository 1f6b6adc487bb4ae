//! Capacity pool manager
//!
//! Keeps each environment's idle pool at its `reserved` target without
//! exceeding `capacity`, and hands sessions out to learners. The only
//! serialization point is the session's resource version: every phase
//! change is a revision-guarded write, and a lost race just moves on to the
//! next candidate.

mod plan;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use kube::ResourceExt;
use tracing::{debug, info, instrument, warn};

use crate::config::OperatorConfig;
use crate::crd::{
    Credentials, SessionPhase, WorkshopEnvironment, WorkshopSession, WorkshopSessionSpec,
    WorkshopSessionStatus, ENVIRONMENT_LABEL, PORTAL_LABEL,
};
use crate::credentials::{name_suffix, session_credentials, SESSION_SUFFIX_LENGTH};
use crate::gateway::{parse_object, ClusterApi, CreateOutcome, WriteOutcome};
use crate::owner::{attach_owner, ParentRef};
use crate::templates::{labels, object_meta, session_hostname, ObjectSpec};
use crate::{Error, Result};

pub use plan::{clamp, oldest_first, plan, PoolCounts, PoolPlan, SessionView};

/// Re-list attempts when every candidate was lost to a concurrent writer
pub const MAX_ALLOCATE_ROUNDS: usize = 3;

/// Attempts at finding an unused session name
const MAX_NAME_ATTEMPTS: usize = 5;

/// A session bound to a learner
#[derive(Clone, Debug, PartialEq)]
pub struct SessionHandle {
    /// Session name
    pub name: String,
    /// Namespace the session lives in
    pub namespace: String,
    /// Public URL
    pub url: String,
    /// Login for the session workload
    pub credentials: Credentials,
    /// Learner it is bound to
    pub user: String,
    /// When the session expires
    pub expires_at: DateTime<Utc>,
}

/// Result of an allocation request
#[derive(Clone, Debug, PartialEq)]
pub enum Allocation {
    /// A session was bound to the learner
    Allocated(SessionHandle),
    /// No idle session and no room to create one
    Busy,
}

/// Result of a release request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Release {
    /// The session was retired
    Released,
    /// No such session
    NotFound,
    /// The session is idle in the pool and not bound to anyone
    NotAllocated,
}

/// What one reconcile pass did
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PoolReport {
    /// Sessions created
    pub created: u32,
    /// Sessions reclaimed or purged
    pub removed: Vec<String>,
    /// Allocated sessions that ran past their deadline
    pub expired: Vec<String>,
    /// Counts after the pass
    pub counts: PoolCounts,
}

/// Pool operations for all environments
pub struct PoolManager {
    api: Arc<dyn ClusterApi>,
    config: Arc<OperatorConfig>,
}

impl PoolManager {
    /// Create a pool manager over a gateway
    pub fn new(api: Arc<dyn ClusterApi>, config: Arc<OperatorConfig>) -> Self {
        Self { api, config }
    }

    /// Bring an environment's pool to its targets
    ///
    /// Expired sessions are retired first, then the plan for the remaining
    /// sessions is carried out.
    #[instrument(skip(self, env), fields(environment = %env.name_any()))]
    pub async fn reconcile(&self, env: &WorkshopEnvironment) -> Result<PoolReport> {
        let parent = ParentRef::of(env)?;
        let namespace = env_namespace(env);
        let (capacity, reserved) = env.spec.limits();
        let mut report = PoolReport::default();

        let sessions = self.api.list_sessions(&namespace, &parent.name).await?;

        let now = Utc::now();
        for session in sessions.iter().filter(|s| s.is_expired(now)) {
            if self.retire(session).await? {
                info!(session = %session.name_any(), "session expired");
                report.expired.push(session.name_any());
            }
        }

        let remaining: Vec<WorkshopSession> = sessions
            .into_iter()
            .filter(|s| !report.expired.contains(&s.name_any()))
            .collect();
        let views = SessionView::observe(&remaining);
        let plan = plan(capacity, reserved, &views);

        if !plan.is_empty() {
            debug!(
                create = plan.create,
                reclaim = plan.reclaim.len(),
                purge = plan.purge.len(),
                "pool out of balance"
            );
        }

        for name in plan.purge.iter().chain(plan.reclaim.iter()) {
            let Some(session) = remaining.iter().find(|s| s.name_any() == *name) else {
                continue;
            };
            if self.retire(session).await? {
                report.removed.push(name.clone());
            }
        }

        for _ in 0..plan.create {
            let session = self.create_session(env, &parent).await?;
            debug!(session = %session.name_any(), "reserved session created");
            report.created += 1;
        }

        let final_views: Vec<SessionView> = views
            .into_iter()
            .filter(|v| !report.removed.contains(&v.name))
            .collect();
        report.counts = PoolCounts::of(&final_views);
        report.counts.reserved += report.created;

        if report.created > 0 || !report.removed.is_empty() {
            info!(
                created = report.created,
                removed = report.removed.len(),
                reserved = report.counts.reserved,
                allocated = report.counts.allocated,
                "pool reconciled"
            );
        }
        Ok(report)
    }

    /// Bind a session of `env` to `user`
    ///
    /// Idle sessions are tried oldest first. A write that loses to a
    /// concurrent claim moves on to the next candidate; when every candidate
    /// was lost the sessions are listed again, up to
    /// [`MAX_ALLOCATE_ROUNDS`] times. With no idle session left a session is
    /// created on demand if capacity allows.
    #[instrument(skip(self, env), fields(environment = %env.name_any()))]
    pub async fn allocate(&self, env: &WorkshopEnvironment, user: &str) -> Result<Allocation> {
        let parent = ParentRef::of(env)?;
        let namespace = env_namespace(env);
        let (capacity, _) = env.spec.limits();
        let duration = self.session_duration(env).await?;

        for round in 0..MAX_ALLOCATE_ROUNDS {
            let sessions = self.api.list_sessions(&namespace, &parent.name).await?;
            let views = SessionView::observe(&sessions);
            let candidates =
                oldest_first(views.iter().filter(|v| v.phase == SessionPhase::Reserved));

            if candidates.is_empty() {
                if PoolCounts::of(&views).live() >= capacity {
                    info!(user, "no capacity left");
                    return Ok(Allocation::Busy);
                }
                let session = self.create_session(env, &parent).await?;
                info!(session = %session.name_any(), "session created on demand");
                if let Some(handle) = self.claim(&session, user, duration).await? {
                    return Ok(Allocation::Allocated(handle));
                }
                continue;
            }

            for candidate in candidates {
                let Some(session) = sessions.iter().find(|s| s.name_any() == candidate.name)
                else {
                    continue;
                };
                if let Some(handle) = self.claim(session, user, duration).await? {
                    return Ok(Allocation::Allocated(handle));
                }
            }
            debug!(round, "every candidate was claimed concurrently");
        }

        warn!(user, "allocation gave up after repeated conflicts");
        Ok(Allocation::Busy)
    }

    /// Release an allocated session by name
    ///
    /// Reserved sessions belong to the pool and are left alone.
    #[instrument(skip(self))]
    pub async fn release(&self, session: &str) -> Result<Release> {
        for _ in 0..MAX_ALLOCATE_ROUNDS {
            let Some(current) = self.api.find_session(session).await? else {
                return Ok(Release::NotFound);
            };
            match current.phase() {
                SessionPhase::Reserved => return Ok(Release::NotAllocated),
                SessionPhase::Terminated => return Ok(Release::NotFound),
                SessionPhase::Allocated | SessionPhase::Expiring => {}
            }
            if self.retire(&current).await? {
                info!("session released");
                return Ok(Release::Released);
            }
        }
        Err(Error::conflict("WorkshopSession", session))
    }

    /// Move a session to `Expiring` and delete it
    ///
    /// Returns `false` when the status write lost to a concurrent writer; a
    /// session that is already gone counts as retired.
    pub async fn retire(&self, session: &WorkshopSession) -> Result<bool> {
        let name = session.name_any();

        if session.phase().can_transition_to(SessionPhase::Expiring) {
            let status = WorkshopSessionStatus {
                phase: SessionPhase::Expiring,
                ..session.status.clone().unwrap_or_default()
            };
            match self.api.update_session_status(session, &status).await? {
                WriteOutcome::Written(_) => {}
                WriteOutcome::Conflict => {
                    debug!(session = %name, "session changed before it could be retired");
                    return Ok(false);
                }
                WriteOutcome::NotFound => return Ok(true),
            }
        }

        let key = ObjectSpec::from_typed(session)?.key();
        self.api.delete(&key).await?;
        Ok(true)
    }

    async fn claim(
        &self,
        session: &WorkshopSession,
        user: &str,
        duration: chrono::Duration,
    ) -> Result<Option<SessionHandle>> {
        let now = Utc::now();
        let url = self.session_url(session);
        let status = WorkshopSessionStatus {
            phase: SessionPhase::Allocated,
            user: Some(user.to_string()),
            allocated_at: Some(now),
            expires_at: Some(now + duration),
            url: Some(url.clone()),
        };

        match self.api.update_session_status(session, &status).await? {
            WriteOutcome::Written(updated) => {
                info!(session = %updated.name_any(), user, "session allocated");
                Ok(Some(SessionHandle {
                    name: updated.name_any(),
                    namespace: updated.namespace().unwrap_or_default(),
                    url,
                    credentials: updated.spec.credentials.clone(),
                    user: user.to_string(),
                    expires_at: now + duration,
                }))
            }
            WriteOutcome::Conflict | WriteOutcome::NotFound => {
                debug!(session = %session.name_any(), "lost race for session");
                Ok(None)
            }
        }
    }

    async fn create_session(
        &self,
        env: &WorkshopEnvironment,
        parent: &ParentRef,
    ) -> Result<WorkshopSession> {
        for _ in 0..MAX_NAME_ATTEMPTS {
            let name = format!("{}-{}", parent.name, name_suffix(SESSION_SUFFIX_LENGTH));
            let resource = session_resource(env, &name, self.session_domain(env));
            let spec = attach_owner(ObjectSpec::from_typed(&resource)?, parent)?;

            match self.api.create(&spec).await? {
                CreateOutcome::Created(created) => return parse_object(*created),
                CreateOutcome::AlreadyExists => {
                    debug!(session = %name, "session name taken, picking another");
                }
            }
        }
        Err(Error::conflict("WorkshopSession", &parent.name))
    }

    async fn session_duration(&self, env: &WorkshopEnvironment) -> Result<chrono::Duration> {
        let configured = match self.api.get_workshop(&env.spec.workshop.name).await? {
            Some(workshop) => workshop.spec.session_duration()?,
            None => None,
        };
        let duration = configured.unwrap_or_else(|| self.config.session_duration());
        chrono::Duration::from_std(duration)
            .map_err(|e| Error::validation_for_field("Workshop", "duration", e.to_string()))
    }

    fn session_domain(&self, env: &WorkshopEnvironment) -> String {
        if env.spec.session.domain.is_empty() {
            self.config.ingress_domain.clone()
        } else {
            env.spec.session.domain.clone()
        }
    }

    fn session_url(&self, session: &WorkshopSession) -> String {
        format!(
            "{}://{}",
            self.config.ingress_protocol,
            session_hostname(&session.name_any(), &session.spec.domain)
        )
    }
}

fn env_namespace(env: &WorkshopEnvironment) -> String {
    env.namespace().unwrap_or_else(|| env.name_any())
}

/// A fresh reserved session for `env`
fn session_resource(env: &WorkshopEnvironment, name: &str, domain: String) -> WorkshopSession {
    let env_name = env.name_any();
    let portal = env.labels().get(PORTAL_LABEL).cloned().unwrap_or_default();
    let labels = labels([
        (ENVIRONMENT_LABEL, env_name.as_str()),
        (PORTAL_LABEL, portal.as_str()),
    ]);

    WorkshopSession {
        metadata: object_meta(name, Some(&env_namespace(env)), &labels),
        spec: WorkshopSessionSpec {
            environment: env_name,
            workshop: env.spec.workshop.name.clone(),
            domain,
            credentials: session_credentials(),
            env: env.spec.session.env.clone(),
        },
        status: None,
    }
}
