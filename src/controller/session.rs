//! WorkshopSession controller
//!
//! Ensures each live session has its workload and retires sessions once
//! their deadline passes.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use kube::runtime::controller::Action;
use kube::ResourceExt;
use tracing::{debug, info, instrument};

use super::Context;
use crate::crd::{SessionPhase, WorkshopSession};
use crate::gateway::CreateOutcome;
use crate::owner::{attach_owner, ParentRef};
use crate::templates::{build_session_objects, SessionParams};
use crate::{Error, Result};

/// Reconcile a WorkshopSession
#[instrument(skip(session, ctx), fields(session = %session.name_any()))]
pub async fn reconcile(session: Arc<WorkshopSession>, ctx: Arc<Context>) -> Result<Action> {
    let phase = session.phase();
    if session.is_deleting() || phase == SessionPhase::Terminated {
        return Ok(Action::await_change());
    }

    let now = Utc::now();
    if !phase.is_live() || session.is_expired(now) {
        if ctx.pool.retire(&session).await? {
            info!(%phase, "session retired");
            return Ok(Action::await_change());
        }
        // lost to a concurrent writer, look again once the change arrives
        return Ok(Action::requeue(Duration::from_secs(1)));
    }

    ensure_workload(&session, &ctx).await?;

    match session.status.as_ref().and_then(|s| s.expires_at) {
        Some(deadline) if phase == SessionPhase::Allocated => {
            let remaining = (deadline - now).to_std().unwrap_or_default();
            debug!(?remaining, "session allocated until deadline");
            Ok(Action::requeue(remaining + Duration::from_secs(1)))
        }
        _ => Ok(Action::await_change()),
    }
}

/// Create the session's workload objects, tolerating ones that exist
async fn ensure_workload(session: &WorkshopSession, ctx: &Context) -> Result<()> {
    let name = session.name_any();
    let workshop_name = &session.spec.workshop;
    let workshop = ctx
        .api
        .get_workshop(workshop_name)
        .await?
        .ok_or_else(|| Error::dependency_not_ready("Workshop", workshop_name))?;

    let config = ctx.config.as_ref();
    let image = workshop
        .spec
        .image()
        .map(str::to_string)
        .unwrap_or_else(|| config.workshop_image(workshop_name));

    let params = SessionParams {
        session: name.clone(),
        namespace: session
            .namespace()
            .unwrap_or_else(|| session.spec.environment.clone()),
        environment: session.spec.environment.clone(),
        workshop: workshop_name.clone(),
        domain: session.spec.domain.clone(),
        protocol: config.ingress_protocol.clone(),
        image,
        ingress_class: config.ingress_class.clone(),
        ingress_secret: config.ingress_secret.clone(),
        credentials: session.spec.credentials.clone(),
        env: session.spec.env.clone(),
    };

    let parent = ParentRef::of(session)?;
    let mut created = 0;
    for object in build_session_objects(&params)? {
        let object = attach_owner(object, &parent)?;
        if let CreateOutcome::Created(_) = ctx.api.create(&object).await? {
            created += 1;
        }
    }
    if created > 0 {
        debug!(created, "session workload created");
    }
    Ok(())
}
