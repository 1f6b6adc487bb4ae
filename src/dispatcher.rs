//! Reconciliation dispatcher
//!
//! Runs one kube-rs `Controller` per training kind and turns reconcile
//! errors into requeue decisions. Temporary failures back off per object;
//! permanent ones wait for the object to change.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::StreamExt;
use kube::runtime::controller::Action;
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, Resource, ResourceExt};
use tracing::{debug, error, info, warn};

use crate::controller::{
    reconcile_environment, reconcile_portal, reconcile_session, reconcile_workshop, Context,
};
use crate::crd::{TrainingPortal, Workshop, WorkshopEnvironment, WorkshopSession};
use crate::error::ErrorClass;
use crate::Error;

/// First retry delay
pub const BACKOFF_BASE: Duration = Duration::from_secs(5);

/// Longest retry delay
pub const BACKOFF_MAX: Duration = Duration::from_secs(300);

/// Server-side watch timeout, kept under the client's read timeout so idle
/// watches are closed by the server first
const WATCH_TIMEOUT_SECS: u32 = 290;

/// Consecutive failures after which retries are logged as warnings
pub const BACKOFF_WARN_AFTER: u32 = 5;

/// Per-object retry state for temporary failures
///
/// Delays double from [`BACKOFF_BASE`] up to [`BACKOFF_MAX`]. A successful
/// reconcile resets the object.
pub struct Backoff {
    attempts: DashMap<String, u32>,
    base: Duration,
    max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(BACKOFF_BASE, BACKOFF_MAX)
    }
}

impl Backoff {
    /// Backoff with custom bounds
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            attempts: DashMap::new(),
            base,
            max,
        }
    }

    /// Record a failure for `key` and return how long to wait
    pub fn next_delay(&self, key: &str) -> Duration {
        let attempt = {
            let mut entry = self.attempts.entry(key.to_string()).or_insert(0);
            *entry = entry.saturating_add(1);
            *entry
        };
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1).min(16));
        self.base.saturating_mul(factor).min(self.max)
    }

    /// Consecutive failures recorded for `key`
    pub fn attempts(&self, key: &str) -> u32 {
        self.attempts.get(key).map(|a| *a).unwrap_or(0)
    }

    /// Forget the failures of `key`
    pub fn reset(&self, key: &str) {
        self.attempts.remove(key);
    }
}

/// Stable key for an object: `Kind/namespace/name`
pub fn object_key<K>(obj: &K) -> String
where
    K: Resource<DynamicType = ()>,
{
    match obj.namespace() {
        Some(ns) => format!("{}/{}/{}", K::kind(&()), ns, obj.name_any()),
        None => format!("{}/{}", K::kind(&()), obj.name_any()),
    }
}

/// Run a reconcile function and reset the object's backoff on success
pub async fn tracked<K, F, Fut>(
    reconcile: F,
    obj: Arc<K>,
    ctx: Arc<Context>,
) -> crate::Result<Action>
where
    K: Resource<DynamicType = ()>,
    F: FnOnce(Arc<K>, Arc<Context>) -> Fut,
    Fut: Future<Output = crate::Result<Action>>,
{
    let key = object_key(obj.as_ref());
    let result = reconcile(obj, ctx.clone()).await;
    if result.is_ok() {
        ctx.backoff.reset(&key);
    }
    result
}

/// Decide what happens after a failed reconcile
pub fn error_policy<K>(obj: Arc<K>, error: &Error, ctx: Arc<Context>) -> Action
where
    K: Resource<DynamicType = ()>,
{
    let key = object_key(obj.as_ref());
    match error.class() {
        ErrorClass::Permanent => {
            error!(object = %key, %error, "reconcile failed permanently, waiting for a change");
            ctx.backoff.reset(&key);
            Action::await_change()
        }
        ErrorClass::Temporary => {
            let delay = ctx.backoff.next_delay(&key);
            let attempts = ctx.backoff.attempts(&key);
            if attempts > BACKOFF_WARN_AFTER {
                warn!(object = %key, %error, attempts, ?delay, "reconcile keeps failing");
            } else {
                debug!(object = %key, %error, attempts, ?delay, "reconcile failed, retrying");
            }
            Action::requeue(delay)
        }
    }
}

/// Portals offering `workshop`
pub fn portals_for_workshop(
    portals: &[Arc<TrainingPortal>],
    workshop: &Workshop,
) -> Vec<ObjectRef<TrainingPortal>> {
    let name = workshop.name_any();
    portals
        .iter()
        .filter(|p| p.spec.workshops.iter().any(|w| w.name == name))
        .map(|p| ObjectRef::from_obj(p.as_ref()))
        .collect()
}

/// Creates a closure for logging reconciliation results
fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    kind: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(outcome) => debug!(kind, ?outcome, "reconciliation completed"),
            Err(e) => error!(kind, error = ?e, "reconciliation error"),
        }
        std::future::ready(())
    }
}

/// Run every controller until shutdown
pub async fn run_controllers(client: Client, ctx: Arc<Context>) {
    let wc = WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS);

    let portals = Controller::new(Api::<TrainingPortal>::all(client.clone()), wc.clone());
    let portal_store = portals.store();
    let portal_controller = portals
        .owns(Api::<WorkshopEnvironment>::all(client.clone()), wc.clone())
        .watches(Api::<Workshop>::all(client.clone()), wc.clone(), move |workshop| {
            portals_for_workshop(&portal_store.state(), &workshop)
        })
        .shutdown_on_signal()
        .run(
            |obj, ctx| tracked(reconcile_portal, obj, ctx),
            error_policy,
            ctx.clone(),
        )
        .for_each(log_reconcile_result("TrainingPortal"));

    let environment_controller =
        Controller::new(Api::<WorkshopEnvironment>::all(client.clone()), wc.clone())
            .owns(Api::<WorkshopSession>::all(client.clone()), wc.clone())
            .shutdown_on_signal()
            .run(
                |obj, ctx| tracked(reconcile_environment, obj, ctx),
                error_policy,
                ctx.clone(),
            )
            .for_each(log_reconcile_result("WorkshopEnvironment"));

    let session_controller =
        Controller::new(Api::<WorkshopSession>::all(client.clone()), wc.clone())
            .shutdown_on_signal()
            .run(
                |obj, ctx| tracked(reconcile_session, obj, ctx),
                error_policy,
                ctx.clone(),
            )
            .for_each(log_reconcile_result("WorkshopSession"));

    let workshop_controller = Controller::new(Api::<Workshop>::all(client), wc)
        .shutdown_on_signal()
        .run(
            |obj, ctx| tracked(reconcile_workshop, obj, ctx),
            error_policy,
            ctx,
        )
        .for_each(log_reconcile_result("Workshop"));

    info!("controllers started");

    tokio::select! {
        _ = portal_controller => info!("portal controller stopped"),
        _ = environment_controller => info!("environment controller stopped"),
        _ = session_controller => info!("session controller stopped"),
        _ = workshop_controller => info!("workshop controller stopped"),
    }
}
