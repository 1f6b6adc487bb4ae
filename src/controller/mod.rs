//! Controllers for the training resources
//!
//! One reconcile function per kind. Every handler is idempotent: it
//! re-derives what should exist from the object and the cluster, creates
//! what is missing, and tolerates what is already there. Deletion is left to
//! owner-reference garbage collection.

mod environment;
mod portal;
mod session;
mod workshop;

use std::sync::Arc;

use kube::Client;

use crate::config::OperatorConfig;
use crate::dispatcher::Backoff;
use crate::gateway::{ClusterApi, KubeClusterApi};
use crate::pool::PoolManager;

pub use environment::reconcile as reconcile_environment;
pub use portal::{effective_limits, environment_name, reconcile as reconcile_portal};
pub use session::reconcile as reconcile_session;
pub use workshop::reconcile as reconcile_workshop;

/// Controller context shared by every reconcile call
///
/// Use [`ContextBuilder`] to construct instances:
///
/// ```ignore
/// let ctx = Context::builder(client)
///     .config(config)
///     .build();
/// ```
pub struct Context {
    /// Cluster gateway (trait object for testability)
    pub api: Arc<dyn ClusterApi>,
    /// Session pool operations
    pub pool: Arc<PoolManager>,
    /// Process configuration
    pub config: Arc<OperatorConfig>,
    /// Per-object retry state
    pub backoff: Backoff,
}

impl Context {
    /// Create a builder for constructing a Context
    pub fn builder(client: Client) -> ContextBuilder {
        ContextBuilder::new(client)
    }

    /// Create a context for testing with a custom gateway
    #[cfg(test)]
    pub fn for_testing(api: Arc<dyn ClusterApi>, config: OperatorConfig) -> Self {
        let config = Arc::new(config);
        Self {
            pool: Arc::new(PoolManager::new(api.clone(), config.clone())),
            api,
            config,
            backoff: Backoff::default(),
        }
    }
}

/// Builder for constructing [`Context`] instances
pub struct ContextBuilder {
    client: Client,
    api: Option<Arc<dyn ClusterApi>>,
    config: OperatorConfig,
}

impl ContextBuilder {
    fn new(client: Client) -> Self {
        Self {
            client,
            api: None,
            config: OperatorConfig::default(),
        }
    }

    /// Set the process configuration
    pub fn config(mut self, config: OperatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Override the cluster gateway
    pub fn cluster_api(mut self, api: Arc<dyn ClusterApi>) -> Self {
        self.api = Some(api);
        self
    }

    /// Build the Context
    pub fn build(self) -> Context {
        let config = Arc::new(self.config);
        let api = self.api.unwrap_or_else(|| {
            Arc::new(KubeClusterApi::new(self.client, config.api_timeout()))
        });
        Context {
            pool: Arc::new(PoolManager::new(api.clone(), config.clone())),
            api,
            config,
            backoff: Backoff::default(),
        }
    }
}
