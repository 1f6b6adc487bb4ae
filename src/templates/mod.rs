//! Object template builders
//!
//! Pure functions producing the child objects for a portal UI, an
//! environment and a session. Objects are built with the typed k8s-openapi
//! structs and erased to [`ObjectSpec`] so the gateway can create any of
//! them through one code path.

mod environment;
mod portal;
mod session;

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{ApiResource, DynamicObject};
use kube::Resource;
use serde::Serialize;

use crate::crd::{MANAGED_BY_LABEL, MANAGED_BY_VALUE};
use crate::gateway::ObjectKey;
use crate::{Error, Result};

pub use environment::{build_environment_objects, EnvironmentParams};
pub use portal::{build_portal_ui_objects, portal_namespace, PortalParams, PORTAL_UI_NAME};
pub use session::{build_session_objects, session_hostname, SessionParams};

/// A child object ready to be submitted to the cluster
#[derive(Clone, Debug)]
pub struct ObjectSpec {
    /// API coordinates of the object's kind
    pub resource: ApiResource,
    /// The object itself
    pub object: DynamicObject,
}

impl ObjectSpec {
    /// Erase a typed object
    pub fn from_typed<K>(obj: &K) -> Result<Self>
    where
        K: Resource<DynamicType = ()> + Serialize,
    {
        let resource = ApiResource::erase::<K>(&());
        let value = serde_json::to_value(obj)
            .map_err(|e| Error::serialization_for_kind(resource.kind.clone(), e.to_string()))?;
        let object: DynamicObject = serde_json::from_value(value)
            .map_err(|e| Error::serialization_for_kind(resource.kind.clone(), e.to_string()))?;
        Ok(Self { resource, object })
    }

    /// Kind of the object
    pub fn kind(&self) -> &str {
        &self.resource.kind
    }

    /// Object name
    pub fn name(&self) -> &str {
        self.object.metadata.name.as_deref().unwrap_or_default()
    }

    /// Namespace, or `None` for cluster-scoped objects
    pub fn namespace(&self) -> Option<&str> {
        self.object.metadata.namespace.as_deref()
    }

    /// Key addressing this object
    pub fn key(&self) -> ObjectKey {
        ObjectKey {
            resource: self.resource.clone(),
            namespace: self.object.metadata.namespace.clone(),
            name: self.name().to_string(),
        }
    }

    /// `Kind/namespace/name` for logs and errors
    pub fn describe(&self) -> String {
        self.key().to_string()
    }
}

/// Metadata shared by every generated object
pub(crate) fn object_meta(
    name: impl Into<String>,
    namespace: Option<&str>,
    labels: &BTreeMap<String, String>,
) -> ObjectMeta {
    let mut labels = labels.clone();
    labels.insert(MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string());
    ObjectMeta {
        name: Some(name.into()),
        namespace: namespace.map(str::to_string),
        labels: Some(labels),
        ..Default::default()
    }
}

/// Build a label map from pairs
pub(crate) fn labels<const N: usize>(pairs: [(&str, &str); N]) -> BTreeMap<String, String> {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
