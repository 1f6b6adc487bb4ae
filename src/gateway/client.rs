//! [`ClusterApi`] backed by a `kube::Client`

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use kube::api::{
    Api, ApiResource, DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PostParams,
};
use kube::{Client, ResourceExt};
use serde_json::json;
use tracing::debug;

use super::{ClusterApi, CreateOutcome, DeleteOutcome, ObjectKey, WriteOutcome};
use crate::crd::{
    TrainingPortal, TrainingPortalStatus, Workshop, WorkshopEnvironment,
    WorkshopEnvironmentStatus, WorkshopSession, WorkshopSessionStatus, ENVIRONMENT_LABEL,
};
use crate::error::is_api_status;
use crate::templates::ObjectSpec;
use crate::{Error, Result};

/// Field manager recorded on every write
pub const FIELD_MANAGER: &str = "eduk8s-operator";

/// Production gateway
pub struct KubeClusterApi {
    client: Client,
    timeout: Duration,
}

impl KubeClusterApi {
    /// Wrap a client; every call is bounded by `timeout`
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    async fn bounded<T, F>(&self, operation: impl Into<String>, call: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, kube::Error>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result.map_err(Error::from),
            Err(_) => Err(Error::timeout(operation)),
        }
    }

    fn dynamic(&self, namespace: Option<&str>, resource: &ApiResource) -> Api<DynamicObject> {
        match namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, resource),
            None => Api::all_with(self.client.clone(), resource),
        }
    }
}

/// Map a 404 to `None`
fn optional<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(obj) => Ok(Some(obj)),
        Err(Error::Kube { source }) if is_api_status(&source, 404) => Ok(None),
        Err(e) => Err(e),
    }
}

#[async_trait]
impl ClusterApi for KubeClusterApi {
    async fn create(&self, spec: &ObjectSpec) -> Result<CreateOutcome> {
        let api = self.dynamic(spec.namespace(), &spec.resource);
        let pp = PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };

        let operation = format!("create {}", spec.describe());
        match self.bounded(operation, api.create(&pp, &spec.object)).await {
            Ok(created) => Ok(CreateOutcome::Created(Box::new(created))),
            Err(Error::Kube { source }) if is_api_status(&source, 409) => {
                debug!(object = %spec.describe(), "already exists");
                Ok(CreateOutcome::AlreadyExists)
            }
            Err(e) => Err(e),
        }
    }

    async fn delete(&self, key: &ObjectKey) -> Result<DeleteOutcome> {
        let api = self.dynamic(key.namespace.as_deref(), &key.resource);

        match self
            .bounded(
                format!("delete {key}"),
                api.delete(&key.name, &DeleteParams::background()),
            )
            .await
        {
            Ok(_) => Ok(DeleteOutcome::Deleted),
            Err(Error::Kube { source }) if is_api_status(&source, 404) => {
                Ok(DeleteOutcome::NotFound)
            }
            Err(e) => Err(e),
        }
    }

    async fn delete_all(&self, resource: &ApiResource, namespace: &str) -> Result<usize> {
        let api = self.dynamic(Some(namespace), resource);
        let list = self
            .bounded(
                format!("list {} in {namespace}", resource.kind),
                api.list(&ListParams::default()),
            )
            .await?;

        let mut deleted = 0;
        for item in list.items {
            let key = ObjectKey {
                resource: resource.clone(),
                namespace: Some(namespace.to_string()),
                name: item.name_any(),
            };
            if self.delete(&key).await? == DeleteOutcome::Deleted {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn get_portal(&self, name: &str) -> Result<Option<TrainingPortal>> {
        let api: Api<TrainingPortal> = Api::all(self.client.clone());
        optional(self.bounded(format!("get TrainingPortal/{name}"), api.get(name)).await)
    }

    async fn get_workshop(&self, name: &str) -> Result<Option<Workshop>> {
        let api: Api<Workshop> = Api::all(self.client.clone());
        optional(self.bounded(format!("get Workshop/{name}"), api.get(name)).await)
    }

    async fn get_environment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<WorkshopEnvironment>> {
        let api: Api<WorkshopEnvironment> = Api::namespaced(self.client.clone(), namespace);
        optional(
            self.bounded(format!("get WorkshopEnvironment/{name}"), api.get(name))
                .await,
        )
    }

    async fn list_sessions(
        &self,
        namespace: &str,
        environment: &str,
    ) -> Result<Vec<WorkshopSession>> {
        let api: Api<WorkshopSession> = Api::namespaced(self.client.clone(), namespace);
        let lp = ListParams::default().labels(&format!("{ENVIRONMENT_LABEL}={environment}"));
        let list = self
            .bounded(format!("list sessions of {environment}"), api.list(&lp))
            .await?;
        Ok(list.items)
    }

    async fn find_session(&self, name: &str) -> Result<Option<WorkshopSession>> {
        let api: Api<WorkshopSession> = Api::all(self.client.clone());
        let lp = ListParams::default().fields(&format!("metadata.name={name}"));
        let list = self
            .bounded(format!("find WorkshopSession/{name}"), api.list(&lp))
            .await?;
        Ok(list.items.into_iter().next())
    }

    async fn update_session_status(
        &self,
        session: &WorkshopSession,
        status: &WorkshopSessionStatus,
    ) -> Result<WriteOutcome<WorkshopSession>> {
        let name = session.name_any();
        let namespace = session.namespace().unwrap_or_default();
        let api: Api<WorkshopSession> = Api::namespaced(self.client.clone(), &namespace);

        // A merge patch carrying resourceVersion is rejected with 409 when the
        // object changed since it was read.
        let patch = json!({
            "metadata": { "resourceVersion": session.resource_version() },
            "status": status,
        });
        let pp = PatchParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };

        match self
            .bounded(
                format!("update WorkshopSession/{name} status"),
                api.patch_status(&name, &pp, &Patch::Merge(&patch)),
            )
            .await
        {
            Ok(updated) => Ok(WriteOutcome::Written(updated)),
            Err(Error::Kube { source }) if is_api_status(&source, 409) => {
                Ok(WriteOutcome::Conflict)
            }
            Err(Error::Kube { source }) if is_api_status(&source, 404) => {
                Ok(WriteOutcome::NotFound)
            }
            Err(e) => Err(e),
        }
    }

    async fn patch_environment_limits(
        &self,
        namespace: &str,
        name: &str,
        capacity: u32,
        reserved: u32,
    ) -> Result<()> {
        let api: Api<WorkshopEnvironment> = Api::namespaced(self.client.clone(), namespace);
        let patch = json!({ "spec": { "capacity": capacity, "reserved": reserved } });
        self.bounded(
            format!("patch WorkshopEnvironment/{name}"),
            api.patch(name, &PatchParams::default(), &Patch::Merge(&patch)),
        )
        .await?;
        Ok(())
    }

    async fn patch_portal_status(&self, name: &str, status: &TrainingPortalStatus) -> Result<()> {
        let api: Api<TrainingPortal> = Api::all(self.client.clone());
        let patch = json!({ "status": status });
        self.bounded(
            format!("patch TrainingPortal/{name} status"),
            api.patch_status(name, &PatchParams::default(), &Patch::Merge(&patch)),
        )
        .await?;
        Ok(())
    }

    async fn patch_environment_status(
        &self,
        namespace: &str,
        name: &str,
        status: &WorkshopEnvironmentStatus,
    ) -> Result<()> {
        let api: Api<WorkshopEnvironment> = Api::namespaced(self.client.clone(), namespace);
        let patch = json!({ "status": status });
        self.bounded(
            format!("patch WorkshopEnvironment/{name} status"),
            api.patch_status(name, &PatchParams::default(), &Patch::Merge(&patch)),
        )
        .await?;
        Ok(())
    }
}
