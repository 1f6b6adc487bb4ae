//! TrainingPortal controller
//!
//! `Pending -> Provisioning -> Ready`, or `Failed` when the spec cannot be
//! realized. Provisioning creates one environment per workshop entry and
//! the portal UI, all owned by the portal.

use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::core::v1::{LimitRange, ResourceQuota};
use kube::api::ApiResource;
use kube::runtime::controller::Action;
use kube::{Resource, ResourceExt};
use tracing::{debug, info, instrument, warn};

use super::Context;
use crate::config::OperatorConfig;
use crate::credentials::admin_credentials;
use crate::crd::{
    Condition, ConditionStatus, Credentials, EnvironmentSummary, PortalCredentials, PortalPhase,
    PortalSettings, PortalWorkshop, TrainingPortal, TrainingPortalStatus,
};
use crate::gateway::CreateOutcome;
use crate::owner::{attach_owner, is_owned_by, ParentRef};
use crate::pool::clamp;
use crate::templates::{
    build_environment_objects, build_portal_ui_objects, portal_namespace, EnvironmentParams,
    ObjectSpec, PortalParams,
};
use crate::{Error, Result};

/// Resync period for portals that are Ready
pub const READY_RESYNC: Duration = Duration::from_secs(300);

/// Name of the environment for the workshop entry at `index`
pub fn environment_name(portal: &str, index: usize) -> String {
    format!("{portal}-w{:02}", index + 1)
}

/// Effective `(capacity, reserved)` for a workshop entry
///
/// A workshop-level capacity takes the entry's reserved (defaulting to that
/// capacity); otherwise the portal defaults apply, and the portal's reserved
/// defaults to its capacity. Process defaults stand in for an unset portal
/// capacity.
pub fn effective_limits(
    entry: &PortalWorkshop,
    portal: &PortalSettings,
    config: &OperatorConfig,
) -> (u32, u32) {
    let (capacity, reserved) = match entry.capacity {
        Some(capacity) => (capacity, entry.reserved.unwrap_or(capacity)),
        None => match portal.capacity {
            Some(capacity) => (capacity, portal.reserved.unwrap_or(capacity)),
            None => {
                let capacity = config.default_capacity;
                let reserved = portal
                    .reserved
                    .or(config.default_reserved)
                    .unwrap_or(capacity);
                (capacity, reserved)
            }
        },
    };
    clamp(capacity, reserved)
}

/// Reconcile a TrainingPortal
#[instrument(skip(portal, ctx), fields(portal = %portal.name_any()))]
pub async fn reconcile(portal: Arc<TrainingPortal>, ctx: Arc<Context>) -> Result<Action> {
    if portal.meta().deletion_timestamp.is_some() {
        debug!("portal is being deleted");
        return Ok(Action::await_change());
    }

    let name = portal.name_any();
    let generation = portal.metadata.generation;
    let status = portal.status.clone().unwrap_or_default();

    let observed = status.observed_generation == generation;
    if observed && status.phase == PortalPhase::Failed {
        return Ok(Action::await_change());
    }
    // Ready at this generation: only recreate children that went missing
    let resync = observed && status.phase == PortalPhase::Ready;
    if resync {
        debug!("checking portal children");
    } else {
        info!(phase = %status.phase, ?generation, "reconciling portal");
    }

    if let Err(e) = portal.spec.validate(&name) {
        warn!(error = %e, "portal spec is invalid");
        write_failed(&portal, &ctx, &e).await?;
        return Ok(Action::await_change());
    }

    // The credential is recorded before any child is created so a retried
    // pass reuses the one already written into the portal secret.
    let admin = match status.administrator() {
        Some(admin) => admin.clone(),
        None => admin_credentials(),
    };
    let needs_provisioning = status.phase != PortalPhase::Provisioning && !resync;
    if needs_provisioning || status.administrator().is_none() {
        let provisioning = TrainingPortalStatus {
            credentials: Some(PortalCredentials {
                administrator: admin.clone(),
            }),
            ..status.clone()
        }
        .phase(PortalPhase::Provisioning)
        .condition(Condition::new(
            "Ready",
            ConditionStatus::False,
            "Provisioning",
            "creating environments and portal UI",
        ));
        if !write_status(&portal, &ctx, &provisioning).await? {
            return Ok(Action::await_change());
        }
    }

    match provision(&portal, &ctx, admin).await {
        Ok(ready) if resync && same_summary(&status, &ready) => {
            Ok(Action::requeue(READY_RESYNC))
        }
        Ok(ready) => {
            if write_status(&portal, &ctx, &ready).await? {
                info!(url = ready.url.as_deref().unwrap_or_default(), "portal ready");
            }
            Ok(Action::requeue(READY_RESYNC))
        }
        Err(e) if !e.is_retryable() => {
            warn!(error = %e, "portal cannot be provisioned");
            write_failed(&portal, &ctx, &e).await?;
            Ok(Action::await_change())
        }
        Err(e) => Err(e),
    }
}

fn same_summary(current: &TrainingPortalStatus, ready: &TrainingPortalStatus) -> bool {
    current.url == ready.url
        && current.workshops == ready.workshops
        && current.environments == ready.environments
}

/// Create every child of the portal and return the Ready status
async fn provision(
    portal: &TrainingPortal,
    ctx: &Context,
    admin: Credentials,
) -> Result<TrainingPortalStatus> {
    let name = portal.name_any();
    let parent = ParentRef::of(portal)?;
    let config = ctx.config.as_ref();
    let domain = portal
        .spec
        .portal
        .domain
        .clone()
        .unwrap_or_else(|| config.ingress_domain.clone());

    let mut workshops = Vec::with_capacity(portal.spec.workshops.len());
    let mut environments = Vec::with_capacity(portal.spec.workshops.len());

    for (index, entry) in portal.spec.workshops.iter().enumerate() {
        let workshop = ctx
            .api
            .get_workshop(&entry.name)
            .await?
            .ok_or_else(|| Error::dependency_not_ready("Workshop", &entry.name))?;
        workshops.push(workshop.spec.details(&entry.name));

        let (capacity, reserved) = effective_limits(entry, &portal.spec.portal, config);
        let params = EnvironmentParams {
            portal: name.clone(),
            name: environment_name(&name, index),
            workshop: entry.name.clone(),
            domain: domain.clone(),
            capacity,
            reserved,
            env: entry.env.clone(),
        };
        ensure_environment(ctx, &parent, &params).await?;

        environments.push(EnvironmentSummary {
            name: params.name,
            workshop: entry.name.clone(),
            capacity,
            reserved,
        });
    }

    let ui = PortalParams {
        portal: name.clone(),
        domain,
        protocol: config.ingress_protocol.clone(),
        ingress_class: config.ingress_class.clone(),
        ingress_secret: config.ingress_secret.clone(),
        storage_class: config.storage_class.clone(),
        image: config.portal_image(),
        admin: admin.clone(),
    };
    for object in build_portal_ui_objects(&ui)? {
        let is_namespace = object.kind() == "Namespace";
        create_owned(ctx, &parent, object).await?;
        if is_namespace {
            clear_namespace_limits(ctx, &portal_namespace(&name)).await?;
        }
    }

    Ok(TrainingPortalStatus {
        phase: PortalPhase::Ready,
        message: None,
        conditions: portal
            .status
            .as_ref()
            .map(|s| s.conditions.clone())
            .unwrap_or_default(),
        observed_generation: portal.metadata.generation,
        url: Some(ui.url()),
        credentials: Some(PortalCredentials {
            administrator: admin,
        }),
        workshops,
        environments,
    }
    .condition(Condition::new(
        "Ready",
        ConditionStatus::True,
        "Provisioned",
        "environments and portal UI created",
    )))
}

/// Remove limit ranges and quotas that cluster policy may have added to
/// the portal UI namespace
async fn clear_namespace_limits(ctx: &Context, namespace: &str) -> Result<()> {
    for resource in [
        ApiResource::erase::<LimitRange>(&()),
        ApiResource::erase::<ResourceQuota>(&()),
    ] {
        let deleted = ctx.api.delete_all(&resource, namespace).await?;
        if deleted > 0 {
            info!(namespace, kind = %resource.kind, deleted, "removed namespace limits");
        }
    }
    Ok(())
}

/// Create an environment and its namespace, or bring an existing one's
/// limits up to date
async fn ensure_environment(
    ctx: &Context,
    parent: &ParentRef,
    params: &EnvironmentParams,
) -> Result<()> {
    for object in build_environment_objects(params)? {
        let is_environment = object.kind() == "WorkshopEnvironment";
        let created = create_owned(ctx, parent, object).await?;
        if created || !is_environment {
            continue;
        }

        let existing = ctx
            .api
            .get_environment(&params.name, &params.name)
            .await?
            .ok_or_else(|| Error::dependency_not_ready("WorkshopEnvironment", &params.name))?;

        if existing.meta().deletion_timestamp.is_some() {
            return Err(Error::dependency_not_ready(
                "WorkshopEnvironment",
                &params.name,
            ));
        }
        if !is_owned_by(&existing.metadata, &parent.uid) {
            return Err(Error::owner_invalid(
                format!("WorkshopEnvironment/{}", params.name),
                format!("exists but is not owned by {parent}"),
            ));
        }
        if existing.spec.workshop.name != params.workshop {
            return Err(Error::validation_for(
                &parent.name,
                format!(
                    "environment {} already serves workshop {}",
                    params.name, existing.spec.workshop.name
                ),
            ));
        }
        if (existing.spec.capacity, existing.spec.reserved) != (params.capacity, params.reserved) {
            info!(
                environment = %params.name,
                capacity = params.capacity,
                reserved = params.reserved,
                "updating environment limits"
            );
            ctx.api
                .patch_environment_limits(
                    &params.name,
                    &params.name,
                    params.capacity,
                    params.reserved,
                )
                .await?;
        }
    }
    Ok(())
}

/// Create a child owned by `parent`; returns false when it already existed
async fn create_owned(ctx: &Context, parent: &ParentRef, object: ObjectSpec) -> Result<bool> {
    let object = attach_owner(object, parent)?;
    match ctx.api.create(&object).await? {
        CreateOutcome::Created(_) => {
            debug!(object = %object.describe(), "created");
            Ok(true)
        }
        CreateOutcome::AlreadyExists => Ok(false),
    }
}

/// Write status unless a newer version of the portal has been seen
///
/// Returns false when the write was abandoned.
async fn write_status(
    portal: &TrainingPortal,
    ctx: &Context,
    status: &TrainingPortalStatus,
) -> Result<bool> {
    let name = portal.name_any();
    let current = ctx.api.get_portal(&name).await?;
    let superseded = match &current {
        None => true,
        Some(current) => {
            current.uid() != portal.uid() || current.metadata.generation != portal.metadata.generation
        }
    };
    if superseded {
        debug!("portal changed while reconciling, dropping status write");
        return Ok(false);
    }

    ctx.api.patch_portal_status(&name, status).await?;
    Ok(true)
}

async fn write_failed(portal: &TrainingPortal, ctx: &Context, error: &Error) -> Result<()> {
    let status = TrainingPortalStatus {
        observed_generation: portal.metadata.generation,
        ..portal.status.clone().unwrap_or_default()
    }
    .phase(PortalPhase::Failed)
    .message(error.to_string())
    .condition(Condition::new(
        "Ready",
        ConditionStatus::False,
        "Failed",
        error.to_string(),
    ));
    write_status(portal, ctx, &status).await?;
    Ok(())
}
