//! Ownership and cascade deletion
//!
//! Every object the operator creates carries a controller owner reference to
//! the resource it was created for. Deleting a logical resource is only ever
//! a delete of its top-level object; the platform garbage collector removes
//! the rest.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::{Resource, ResourceExt};

use crate::templates::ObjectSpec;
use crate::{Error, Result};

/// Identity of a parent object, captured before its children are created
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParentRef {
    /// Parent apiVersion (`group/version`)
    pub api_version: String,
    /// Parent kind
    pub kind: String,
    /// Parent name
    pub name: String,
    /// Server-assigned uid
    pub uid: String,
    /// Parent namespace, `None` for cluster-scoped parents
    pub namespace: Option<String>,
}

impl ParentRef {
    /// Capture the identity of a persisted object
    ///
    /// Fails when the object has no uid, i.e. it was never returned by the
    /// API server.
    pub fn of<K>(parent: &K) -> Result<Self>
    where
        K: Resource<DynamicType = ()>,
    {
        let kind = K::kind(&()).to_string();
        let name = parent.name_any();
        let uid = parent.uid().ok_or_else(|| {
            Error::owner_pending(
                format!("{kind}/{name}"),
                "owner has not been persisted yet (no uid)",
            )
        })?;

        Ok(Self {
            api_version: K::api_version(&()).to_string(),
            kind,
            name,
            uid,
            namespace: parent.namespace(),
        })
    }

    /// Controller owner reference pointing at this parent
    pub fn owner_reference(&self) -> OwnerReference {
        OwnerReference {
            api_version: self.api_version.clone(),
            kind: self.kind.clone(),
            name: self.name.clone(),
            uid: self.uid.clone(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        }
    }
}

impl std::fmt::Display for ParentRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}/{}", self.kind, ns, self.name),
            None => write!(f, "{}/{}", self.kind, self.name),
        }
    }
}

/// Stamp `parent` as the controlling owner of `child`
///
/// Idempotent: a child already owned by `parent` is returned unchanged.
/// Fails when the reference could not be honoured by the garbage collector:
/// a namespaced owner for a cluster-scoped child, an owner in another
/// namespace, or a child already controlled by someone else.
pub fn attach_owner(mut child: ObjectSpec, parent: &ParentRef) -> Result<ObjectSpec> {
    let describe = child.describe();

    if parent.uid.is_empty() {
        return Err(Error::owner_pending(
            describe,
            format!("owner {parent} has no uid yet"),
        ));
    }

    if let Some(parent_ns) = &parent.namespace {
        match child.namespace() {
            None => {
                return Err(Error::owner_invalid(
                    describe,
                    format!("cluster-scoped object cannot be owned by namespaced {parent}"),
                ))
            }
            Some(ns) if ns != parent_ns => {
                return Err(Error::owner_invalid(
                    describe,
                    format!("owner {parent} is in another namespace"),
                ))
            }
            Some(_) => {}
        }
    }

    let refs = child
        .object
        .metadata
        .owner_references
        .get_or_insert_with(Vec::new);

    if refs.iter().any(|r| r.uid == parent.uid) {
        return Ok(child);
    }

    if let Some(other) = refs.iter().find(|r| r.controller == Some(true)) {
        return Err(Error::owner_invalid(
            describe,
            format!("already controlled by {}/{}", other.kind, other.name),
        ));
    }

    refs.push(parent.owner_reference());
    Ok(child)
}

/// Whether `meta` carries an owner reference to the given uid
pub fn is_owned_by(meta: &ObjectMeta, owner_uid: &str) -> bool {
    meta.owner_references
        .as_ref()
        .is_some_and(|refs| refs.iter().any(|r| r.uid == owner_uid))
}
