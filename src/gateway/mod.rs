//! Cluster API gateway
//!
//! Every read and write the controllers make goes through [`ClusterApi`].
//! Routine idempotency cases (object already exists, object already gone,
//! stale revision) are returned as outcomes rather than errors so handlers
//! can branch on them without inspecting status codes.

mod client;
#[cfg(test)]
pub mod memory;

use async_trait::async_trait;
use kube::api::{ApiResource, DynamicObject};

#[cfg(test)]
use mockall::automock;

use crate::crd::{
    TrainingPortal, TrainingPortalStatus, Workshop, WorkshopEnvironment,
    WorkshopEnvironmentStatus, WorkshopSession, WorkshopSessionStatus,
};
use crate::templates::ObjectSpec;
use crate::Result;

pub use client::KubeClusterApi;

/// Address of an object in the cluster
#[derive(Clone, Debug)]
pub struct ObjectKey {
    /// API coordinates of the object's kind
    pub resource: ApiResource,
    /// Namespace, `None` for cluster-scoped objects
    pub namespace: Option<String>,
    /// Object name
    pub name: String,
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}/{}", self.resource.kind, ns, self.name),
            None => write!(f, "{}/{}", self.resource.kind, self.name),
        }
    }
}

/// Result of a create call
#[derive(Clone, Debug)]
pub enum CreateOutcome {
    /// The object was created; carries the server's copy
    Created(Box<DynamicObject>),
    /// An object with the same name already exists
    AlreadyExists,
}

/// Result of a delete call
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// Deletion was accepted
    Deleted,
    /// Nothing to delete
    NotFound,
}

/// Result of a revision-guarded write
#[derive(Clone, Debug)]
pub enum WriteOutcome<T> {
    /// Written; carries the updated object
    Written(T),
    /// The object changed since it was read
    Conflict,
    /// The object no longer exists
    NotFound,
}

/// Operations the controllers need from the cluster
///
/// All calls are bounded by a timeout in the production implementation; a
/// call that times out fails with a temporary error.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Create an object
    async fn create(&self, spec: &ObjectSpec) -> Result<CreateOutcome>;

    /// Delete an object in the background; dependents are garbage collected
    async fn delete(&self, key: &ObjectKey) -> Result<DeleteOutcome>;

    /// Delete every object of a kind in a namespace; returns how many went
    async fn delete_all(&self, resource: &ApiResource, namespace: &str) -> Result<usize>;

    /// Get a TrainingPortal by name
    async fn get_portal(&self, name: &str) -> Result<Option<TrainingPortal>>;

    /// Get a Workshop by name
    async fn get_workshop(&self, name: &str) -> Result<Option<Workshop>>;

    /// Get a WorkshopEnvironment
    async fn get_environment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<WorkshopEnvironment>>;

    /// List the sessions of an environment
    async fn list_sessions(
        &self,
        namespace: &str,
        environment: &str,
    ) -> Result<Vec<WorkshopSession>>;

    /// Find a session by name in any namespace
    async fn find_session(&self, name: &str) -> Result<Option<WorkshopSession>>;

    /// Replace a session's status if its revision still matches
    async fn update_session_status(
        &self,
        session: &WorkshopSession,
        status: &WorkshopSessionStatus,
    ) -> Result<WriteOutcome<WorkshopSession>>;

    /// Update an environment's capacity and reserved targets
    async fn patch_environment_limits(
        &self,
        namespace: &str,
        name: &str,
        capacity: u32,
        reserved: u32,
    ) -> Result<()>;

    /// Write a portal's status
    async fn patch_portal_status(&self, name: &str, status: &TrainingPortalStatus) -> Result<()>;

    /// Write an environment's status
    async fn patch_environment_status(
        &self,
        namespace: &str,
        name: &str,
        status: &WorkshopEnvironmentStatus,
    ) -> Result<()>;
}

/// Convert a server copy into a typed resource
pub fn parse_object<K>(object: DynamicObject) -> Result<K>
where
    K: kube::Resource<DynamicType = ()> + serde::de::DeserializeOwned,
{
    object.try_parse::<K>().map_err(|e| {
        crate::Error::serialization_for_kind(K::kind(&()).to_string(), e.to_string())
    })
}
