//! Workshop controller
//!
//! Workshops are read-only catalog entries. The controller only checks that
//! an edited workshop still parses, so a bad duration shows up in the log
//! when it is applied rather than at allocation time.

use std::sync::Arc;

use kube::runtime::controller::Action;
use kube::ResourceExt;
use tracing::{debug, instrument, warn};

use super::Context;
use crate::crd::Workshop;
use crate::Result;

/// Reconcile a Workshop
#[instrument(skip(workshop, _ctx), fields(workshop = %workshop.name_any()))]
pub async fn reconcile(workshop: Arc<Workshop>, _ctx: Arc<Context>) -> Result<Action> {
    match workshop.spec.session_duration() {
        Ok(duration) => debug!(?duration, image = workshop.spec.image(), "workshop observed"),
        Err(e) => warn!(error = %e, "workshop has an invalid duration"),
    }
    Ok(Action::await_change())
}
