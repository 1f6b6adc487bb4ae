//! In-memory [`ClusterApi`] for unit tests
//!
//! Behaves like a single API server: it assigns uids, resource versions and
//! strictly increasing creation timestamps, rejects stale revisions, and
//! runs owner-reference garbage collection synchronously after each delete.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::api::{ApiResource, DynamicObject};
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{ClusterApi, CreateOutcome, DeleteOutcome, ObjectKey, WriteOutcome};
use crate::crd::{
    TrainingPortal, TrainingPortalStatus, Workshop, WorkshopEnvironment,
    WorkshopEnvironmentStatus, WorkshopSession, WorkshopSessionStatus, ENVIRONMENT_LABEL,
};
use crate::templates::ObjectSpec;
use crate::{Error, Result};

type Key = (String, Option<String>, String);

struct Stored {
    resource: ApiResource,
    object: DynamicObject,
}

struct State {
    objects: BTreeMap<Key, Stored>,
    next_uid: u64,
    next_rv: u64,
    clock: DateTime<Utc>,
    unavailable: bool,
}

/// In-memory cluster
pub struct InMemoryCluster {
    state: Mutex<State>,
}

impl Default for InMemoryCluster {
    fn default() -> Self {
        Self::new()
    }
}

fn to_dynamic<K: Serialize>(obj: &K) -> DynamicObject {
    serde_json::from_value(serde_json::to_value(obj).unwrap()).unwrap()
}

fn to_typed<K: DeserializeOwned>(obj: &DynamicObject) -> K {
    serde_json::from_value(serde_json::to_value(obj).unwrap()).unwrap()
}

impl State {
    fn stamp(&mut self, object: &mut DynamicObject) {
        self.next_uid += 1;
        self.next_rv += 1;
        self.clock += ChronoDuration::seconds(1);
        object.metadata.uid = Some(format!("uid-{}", self.next_uid));
        object.metadata.resource_version = Some(self.next_rv.to_string());
        object.metadata.creation_timestamp = Some(Time(self.clock));
        object.metadata.generation = Some(1);
    }

    fn bump(&mut self, object: &mut DynamicObject) {
        self.next_rv += 1;
        object.metadata.resource_version = Some(self.next_rv.to_string());
    }

    fn find(&self, kind: &str, namespace: Option<&str>, name: &str) -> Option<&Stored> {
        self.objects.get(&(
            kind.to_string(),
            namespace.map(str::to_string),
            name.to_string(),
        ))
    }

    fn find_mut(&mut self, kind: &str, namespace: Option<&str>, name: &str) -> Option<&mut Stored> {
        self.objects.get_mut(&(
            kind.to_string(),
            namespace.map(str::to_string),
            name.to_string(),
        ))
    }

    /// Remove dependents whose owners are all gone and the contents of
    /// deleted namespaces, until nothing changes.
    fn collect_garbage(&mut self, mut removed_namespaces: BTreeSet<String>) {
        loop {
            let live: BTreeSet<String> = self
                .objects
                .values()
                .filter_map(|s| s.object.metadata.uid.clone())
                .collect();

            let doomed: Vec<Key> = self
                .objects
                .iter()
                .filter(|((_, ns, _), stored)| {
                    let in_removed_ns = ns
                        .as_ref()
                        .is_some_and(|ns| removed_namespaces.contains(ns));
                    let orphaned = stored
                        .object
                        .metadata
                        .owner_references
                        .as_ref()
                        .is_some_and(|refs| {
                            !refs.is_empty() && refs.iter().all(|r| !live.contains(&r.uid))
                        });
                    in_removed_ns || orphaned
                })
                .map(|(key, _)| key.clone())
                .collect();

            if doomed.is_empty() {
                return;
            }

            for key in doomed {
                if key.0 == "Namespace" {
                    removed_namespaces.insert(key.2.clone());
                }
                self.objects.remove(&key);
            }
        }
    }
}

impl InMemoryCluster {
    /// Empty cluster
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                objects: BTreeMap::new(),
                next_uid: 0,
                next_rv: 0,
                clock: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                unavailable: false,
            }),
        }
    }

    /// Store a typed object as if it had been created by a user
    pub fn insert<K>(&self, obj: K) -> K
    where
        K: Resource<DynamicType = ()> + Serialize + DeserializeOwned,
    {
        let resource = ApiResource::erase::<K>(&());
        let mut object = to_dynamic(&obj);
        let mut state = self.state.lock().unwrap();
        state.stamp(&mut object);
        let key = (
            resource.kind.clone(),
            object.metadata.namespace.clone(),
            object.metadata.name.clone().unwrap_or_default(),
        );
        let typed = to_typed(&object);
        state.objects.insert(key, Stored { resource, object });
        typed
    }

    /// Read a typed object
    pub fn get<K>(&self, namespace: Option<&str>, name: &str) -> Option<K>
    where
        K: Resource<DynamicType = ()> + DeserializeOwned,
    {
        let state = self.state.lock().unwrap();
        state
            .find(&K::kind(&()), namespace, name)
            .map(|s| to_typed(&s.object))
    }

    /// All objects of a kind
    pub fn list<K>(&self) -> Vec<K>
    where
        K: Resource<DynamicType = ()> + DeserializeOwned,
    {
        let kind = K::kind(&()).to_string();
        let state = self.state.lock().unwrap();
        state
            .objects
            .iter()
            .filter(|((k, _, _), _)| *k == kind)
            .map(|(_, s)| to_typed(&s.object))
            .collect()
    }

    /// Number of objects of a kind
    pub fn count(&self, kind: &str) -> usize {
        let state = self.state.lock().unwrap();
        state.objects.keys().filter(|(k, _, _)| k == kind).count()
    }

    /// Total number of stored objects
    pub fn len(&self) -> usize {
        self.state.lock().unwrap().objects.len()
    }

    /// Objects reachable from `uid` through owner references
    pub fn owned_transitively_by(&self, uid: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        let mut owners = BTreeSet::from([uid.to_string()]);
        let mut found = BTreeSet::new();
        loop {
            let before = owners.len();
            for ((kind, ns, name), stored) in &state.objects {
                let meta = &stored.object.metadata;
                let owned = meta
                    .owner_references
                    .as_ref()
                    .is_some_and(|refs| refs.iter().any(|r| owners.contains(&r.uid)));
                if owned {
                    found.insert(format!("{kind}/{}/{name}", ns.as_deref().unwrap_or("")));
                    if let Some(child_uid) = &meta.uid {
                        owners.insert(child_uid.clone());
                    }
                }
            }
            if owners.len() == before {
                return found.into_iter().collect();
            }
        }
    }

    /// Make every call fail with a timeout
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unwrap().unavailable = unavailable;
    }

    /// Change a portal's spec the way `kubectl edit` would
    pub fn edit_portal(&self, name: &str, edit: impl FnOnce(&mut TrainingPortal)) {
        let mut state = self.state.lock().unwrap();
        let stored = state.find("TrainingPortal", None, name).unwrap();
        let mut portal: TrainingPortal = to_typed(&stored.object);
        edit(&mut portal);
        let generation = portal.metadata.generation.unwrap_or(1) + 1;
        let mut object = to_dynamic(&portal);
        object.metadata.generation = Some(generation);
        state.bump(&mut object);
        state.find_mut("TrainingPortal", None, name).unwrap().object = object;
    }

    /// Bump a session's revision as if another writer had touched it
    pub fn touch_session(&self, namespace: &str, name: &str) {
        let mut state = self.state.lock().unwrap();
        let mut object = state
            .find("WorkshopSession", Some(namespace), name)
            .unwrap()
            .object
            .clone();
        state.bump(&mut object);
        state
            .find_mut("WorkshopSession", Some(namespace), name)
            .unwrap()
            .object = object;
    }

    fn check_available(&self, operation: &str) -> Result<()> {
        if self.state.lock().unwrap().unavailable {
            return Err(Error::timeout(operation));
        }
        Ok(())
    }

    fn set_status<S: Serialize>(
        &self,
        kind: &str,
        namespace: Option<&str>,
        name: &str,
        status: &S,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let Some(stored) = state.find(kind, namespace, name) else {
            return Err(Error::from(not_found(kind, name)));
        };
        let mut object = stored.object.clone();
        object.data["status"] = serde_json::to_value(status).unwrap();
        state.bump(&mut object);
        state.find_mut(kind, namespace, name).unwrap().object = object;
        Ok(())
    }
}

fn not_found(kind: &str, name: &str) -> kube::Error {
    kube::Error::Api(kube::error::ErrorResponse {
        status: "Failure".to_string(),
        message: format!("{kind} {name} not found"),
        reason: "NotFound".to_string(),
        code: 404,
    })
}

#[async_trait]
impl ClusterApi for InMemoryCluster {
    async fn create(&self, spec: &ObjectSpec) -> Result<CreateOutcome> {
        self.check_available("create")?;
        let mut state = self.state.lock().unwrap();
        let key = (
            spec.kind().to_string(),
            spec.namespace().map(str::to_string),
            spec.name().to_string(),
        );
        if state.objects.contains_key(&key) {
            return Ok(CreateOutcome::AlreadyExists);
        }
        let mut object = spec.object.clone();
        state.stamp(&mut object);
        state.objects.insert(
            key,
            Stored {
                resource: spec.resource.clone(),
                object: object.clone(),
            },
        );
        Ok(CreateOutcome::Created(Box::new(object)))
    }

    async fn delete(&self, key: &ObjectKey) -> Result<DeleteOutcome> {
        self.check_available("delete")?;
        let mut state = self.state.lock().unwrap();
        let map_key = (
            key.resource.kind.clone(),
            key.namespace.clone(),
            key.name.clone(),
        );
        if state.objects.remove(&map_key).is_none() {
            return Ok(DeleteOutcome::NotFound);
        }
        let mut removed_namespaces = BTreeSet::new();
        if key.resource.kind == "Namespace" {
            removed_namespaces.insert(key.name.clone());
        }
        state.collect_garbage(removed_namespaces);
        Ok(DeleteOutcome::Deleted)
    }

    async fn delete_all(&self, resource: &ApiResource, namespace: &str) -> Result<usize> {
        self.check_available("delete all")?;
        let mut state = self.state.lock().unwrap();
        let doomed: Vec<Key> = state
            .objects
            .keys()
            .filter(|(kind, ns, _)| *kind == resource.kind && ns.as_deref() == Some(namespace))
            .cloned()
            .collect();
        for key in &doomed {
            state.objects.remove(key);
        }
        state.collect_garbage(BTreeSet::new());
        Ok(doomed.len())
    }

    async fn get_portal(&self, name: &str) -> Result<Option<TrainingPortal>> {
        self.check_available("get portal")?;
        Ok(self.get(None, name))
    }

    async fn get_workshop(&self, name: &str) -> Result<Option<Workshop>> {
        self.check_available("get workshop")?;
        Ok(self.get(None, name))
    }

    async fn get_environment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<WorkshopEnvironment>> {
        self.check_available("get environment")?;
        Ok(self.get(Some(namespace), name))
    }

    async fn list_sessions(
        &self,
        namespace: &str,
        environment: &str,
    ) -> Result<Vec<WorkshopSession>> {
        self.check_available("list sessions")?;
        Ok(self
            .list::<WorkshopSession>()
            .into_iter()
            .filter(|s| s.metadata.namespace.as_deref() == Some(namespace))
            .filter(|s| {
                s.metadata
                    .labels
                    .as_ref()
                    .and_then(|l| l.get(ENVIRONMENT_LABEL))
                    .is_some_and(|v| v == environment)
            })
            .collect())
    }

    async fn find_session(&self, name: &str) -> Result<Option<WorkshopSession>> {
        self.check_available("find session")?;
        Ok(self
            .list::<WorkshopSession>()
            .into_iter()
            .find(|s| s.metadata.name.as_deref() == Some(name)))
    }

    async fn update_session_status(
        &self,
        session: &WorkshopSession,
        status: &WorkshopSessionStatus,
    ) -> Result<WriteOutcome<WorkshopSession>> {
        self.check_available("update session status")?;
        let namespace = session.metadata.namespace.as_deref();
        let name = session.metadata.name.as_deref().unwrap_or_default();

        let mut state = self.state.lock().unwrap();
        let Some(stored) = state.find("WorkshopSession", namespace, name) else {
            return Ok(WriteOutcome::NotFound);
        };
        if stored.object.metadata.resource_version != session.metadata.resource_version {
            return Ok(WriteOutcome::Conflict);
        }
        let mut object = stored.object.clone();
        object.data["status"] = serde_json::to_value(status).unwrap();
        state.bump(&mut object);
        let typed = to_typed(&object);
        state
            .find_mut("WorkshopSession", namespace, name)
            .unwrap()
            .object = object;
        Ok(WriteOutcome::Written(typed))
    }

    async fn patch_environment_limits(
        &self,
        namespace: &str,
        name: &str,
        capacity: u32,
        reserved: u32,
    ) -> Result<()> {
        self.check_available("patch environment")?;
        let mut state = self.state.lock().unwrap();
        let Some(stored) = state.find("WorkshopEnvironment", Some(namespace), name) else {
            return Err(Error::from(not_found("WorkshopEnvironment", name)));
        };
        let mut object = stored.object.clone();
        object.data["spec"]["capacity"] = capacity.into();
        object.data["spec"]["reserved"] = reserved.into();
        object.metadata.generation = object.metadata.generation.map(|g| g + 1);
        state.bump(&mut object);
        state
            .find_mut("WorkshopEnvironment", Some(namespace), name)
            .unwrap()
            .object = object;
        Ok(())
    }

    async fn patch_portal_status(&self, name: &str, status: &TrainingPortalStatus) -> Result<()> {
        self.check_available("patch portal status")?;
        self.set_status("TrainingPortal", None, name, status)
    }

    async fn patch_environment_status(
        &self,
        namespace: &str,
        name: &str,
        status: &WorkshopEnvironmentStatus,
    ) -> Result<()> {
        self.check_available("patch environment status")?;
        self.set_status("WorkshopEnvironment", Some(namespace), name, status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::TrainingPortalSpec;
    use crate::owner::{attach_owner, ParentRef};
    use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Secret};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn configmap(ns: &str, name: &str) -> ObjectSpec {
        ObjectSpec::from_typed(&ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(ns.to_string()),
                ..Default::default()
            },
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_create_is_idempotent() {
        let cluster = InMemoryCluster::new();
        let cm = configmap("ns", "a");
        assert!(matches!(
            cluster.create(&cm).await.unwrap(),
            CreateOutcome::Created(_)
        ));
        assert!(matches!(
            cluster.create(&cm).await.unwrap(),
            CreateOutcome::AlreadyExists
        ));
        assert_eq!(cluster.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_cascades_through_owner_chain() {
        let cluster = InMemoryCluster::new();
        let portal = cluster.insert(TrainingPortal::new("p", TrainingPortalSpec::default()));
        let parent = ParentRef::of(&portal).unwrap();

        let ns = ObjectSpec::from_typed(&Namespace {
            metadata: ObjectMeta {
                name: Some("p-w01".to_string()),
                ..Default::default()
            },
            ..Default::default()
        })
        .unwrap();
        let ns = attach_owner(ns, &parent).unwrap();
        cluster.create(&ns).await.unwrap();
        // unowned object inside the owned namespace
        cluster.create(&configmap("p-w01", "inner")).await.unwrap();
        cluster.create(&configmap("other", "outer")).await.unwrap();

        let key = ObjectSpec::from_typed(&portal).unwrap().key();
        assert_eq!(cluster.delete(&key).await.unwrap(), DeleteOutcome::Deleted);
        assert_eq!(cluster.len(), 1);
        assert_eq!(cluster.delete(&key).await.unwrap(), DeleteOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_delete_all_is_scoped_to_kind_and_namespace() {
        let cluster = InMemoryCluster::new();
        cluster.create(&configmap("ns", "a")).await.unwrap();
        cluster.create(&configmap("ns", "b")).await.unwrap();
        cluster.create(&configmap("other", "c")).await.unwrap();
        let secret = ObjectSpec::from_typed(&Secret {
            metadata: ObjectMeta {
                name: Some("s".to_string()),
                namespace: Some("ns".to_string()),
                ..Default::default()
            },
            ..Default::default()
        })
        .unwrap();
        cluster.create(&secret).await.unwrap();

        let resource = ApiResource::erase::<ConfigMap>(&());
        assert_eq!(cluster.delete_all(&resource, "ns").await.unwrap(), 2);
        assert_eq!(cluster.count("ConfigMap"), 1);
        assert_eq!(cluster.count("Secret"), 1);
        assert_eq!(cluster.delete_all(&resource, "ns").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unavailable_cluster_times_out() {
        let cluster = InMemoryCluster::new();
        cluster.set_unavailable(true);
        let err = cluster.get_portal("p").await.unwrap_err();
        assert!(err.is_retryable());
    }
}
