//! WorkshopEnvironment controller
//!
//! Keeps the environment's session pool balanced and mirrors the pool's
//! counts onto status. Runs on every environment or session change and on
//! the periodic resync.

use std::sync::Arc;

use kube::runtime::controller::Action;
use kube::{Resource, ResourceExt};
use tracing::{debug, instrument, warn};

use super::Context;
use crate::crd::{
    Condition, ConditionStatus, EnvironmentPhase, WorkshopEnvironment, WorkshopEnvironmentStatus,
};
use crate::pool::PoolCounts;
use crate::{Error, Result};

/// Reconcile a WorkshopEnvironment
#[instrument(skip(env, ctx), fields(environment = %env.name_any()))]
pub async fn reconcile(env: Arc<WorkshopEnvironment>, ctx: Arc<Context>) -> Result<Action> {
    if env.meta().deletion_timestamp.is_some() {
        debug!("environment is being deleted");
        return Ok(Action::await_change());
    }

    let name = env.name_any();
    let (capacity, reserved) = env.spec.limits();

    if capacity == 0 {
        // a zero-capacity plan reclaims every live session
        let report = ctx.pool.reconcile(&env).await?;
        let e = Error::validation_for(&name, "capacity is zero");
        write_failed(&env, &ctx, &e).await?;
        if report.counts.live() > 0 {
            return Ok(Action::requeue(ctx.config.resync_interval()));
        }
        return Ok(Action::await_change());
    }

    let workshop = &env.spec.workshop.name;
    if ctx.api.get_workshop(workshop).await?.is_none() {
        let e = Error::validation_for(&name, format!("workshop {workshop} no longer exists"));
        warn!(workshop = %workshop, "environment's workshop was deleted");
        write_failed(&env, &ctx, &e).await?;
        return Ok(Action::await_change());
    }

    let report = ctx.pool.reconcile(&env).await?;

    let status = ready_status(&env, capacity, reserved, report.counts);
    write_status(&env, &ctx, status).await?;

    Ok(Action::requeue(ctx.config.resync_interval()))
}

fn ready_status(
    env: &WorkshopEnvironment,
    capacity: u32,
    reserved: u32,
    counts: PoolCounts,
) -> WorkshopEnvironmentStatus {
    WorkshopEnvironmentStatus {
        capacity,
        reserved,
        live_count: counts.live(),
        reserved_count: counts.reserved,
        allocated_count: counts.allocated,
        observed_generation: env.metadata.generation,
        conditions: current_conditions(env),
        ..WorkshopEnvironmentStatus::with_phase(EnvironmentPhase::Ready)
    }
    .condition(Condition::new(
        "Ready",
        ConditionStatus::True,
        "PoolBalanced",
        format!("{} reserved, {} allocated", counts.reserved, counts.allocated),
    ))
}

fn current_conditions(env: &WorkshopEnvironment) -> Vec<Condition> {
    env.status
        .as_ref()
        .map(|s| s.conditions.clone())
        .unwrap_or_default()
}

/// Write status only when something observable changed
async fn write_status(
    env: &WorkshopEnvironment,
    ctx: &Context,
    status: WorkshopEnvironmentStatus,
) -> Result<()> {
    let unchanged = env
        .status
        .as_ref()
        .is_some_and(|current| current.same_state(&status));
    if unchanged {
        return Ok(());
    }

    let name = env.name_any();
    let namespace = env.namespace().unwrap_or_else(|| name.clone());
    ctx.api
        .patch_environment_status(&namespace, &name, &status)
        .await
}

async fn write_failed(env: &WorkshopEnvironment, ctx: &Context, error: &Error) -> Result<()> {
    let (capacity, reserved) = env.spec.limits();
    let status = WorkshopEnvironmentStatus {
        capacity,
        reserved,
        observed_generation: env.metadata.generation,
        conditions: current_conditions(env),
        ..WorkshopEnvironmentStatus::with_phase(EnvironmentPhase::Failed)
    }
    .message(error.to_string())
    .condition(Condition::new(
        "Ready",
        ConditionStatus::False,
        "Failed",
        error.to_string(),
    ));
    write_status(env, ctx, status).await
}
