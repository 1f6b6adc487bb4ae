//! WorkshopSession Custom Resource Definition
//!
//! A session is one isolated workshop instance for a single learner. It is
//! created by the pool manager in the environment namespace and owns its
//! workload.

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{Credentials, EnvVar, SessionPhase};

/// Specification for a WorkshopSession
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "training.eduk8s.io",
    version = "v1alpha1",
    kind = "WorkshopSession",
    plural = "workshopsessions",
    shortname = "wses",
    status = "WorkshopSessionStatus",
    namespaced,
    printcolumn = r#"{"name":"Environment","type":"string","jsonPath":".spec.environment"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"User","type":"string","jsonPath":".status.user"}"#,
    printcolumn = r#"{"name":"Expires","type":"date","jsonPath":".status.expiresAt"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct WorkshopSessionSpec {
    /// Owning environment
    pub environment: String,

    /// Workshop served by the session
    pub workshop: String,

    /// Ingress domain for the session hostname
    pub domain: String,

    /// Login for the session workload
    pub credentials: Credentials,

    /// Extra environment for the session workload
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
}

/// Status for a WorkshopSession
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkshopSessionStatus {
    /// Lifecycle phase
    #[serde(default)]
    pub phase: SessionPhase,

    /// Learner the session is bound to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// When the session was bound
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allocated_at: Option<DateTime<Utc>>,

    /// When an allocated session expires
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    /// Public URL of the session
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl WorkshopSession {
    /// Current phase; sessions without status are idle
    pub fn phase(&self) -> SessionPhase {
        self.status
            .as_ref()
            .map(|s| s.phase)
            .unwrap_or_default()
    }

    /// The object has been deleted and is waiting on finalizers or GC
    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// Creation timestamp as reported by the API server
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.metadata.creation_timestamp.as_ref().map(|t| t.0)
    }

    /// An allocated session whose deadline has passed
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.phase() == SessionPhase::Allocated
            && self
                .status
                .as_ref()
                .and_then(|s| s.expires_at)
                .is_some_and(|deadline| deadline <= now)
    }
}
