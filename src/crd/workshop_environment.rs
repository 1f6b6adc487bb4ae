//! WorkshopEnvironment Custom Resource Definition
//!
//! One environment exists per workshop entry of a portal. It lives in its
//! own namespace and holds the session pool for that workshop.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{Condition, EnvVar, EnvironmentPhase};

/// Specification for a WorkshopEnvironment
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "training.eduk8s.io",
    version = "v1alpha1",
    kind = "WorkshopEnvironment",
    plural = "workshopenvironments",
    shortname = "wenv",
    status = "WorkshopEnvironmentStatus",
    namespaced,
    printcolumn = r#"{"name":"Workshop","type":"string","jsonPath":".spec.workshop.name"}"#,
    printcolumn = r#"{"name":"Capacity","type":"integer","jsonPath":".spec.capacity"}"#,
    printcolumn = r#"{"name":"Reserved","type":"integer","jsonPath":".spec.reserved"}"#,
    printcolumn = r#"{"name":"Live","type":"integer","jsonPath":".status.liveCount"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct WorkshopEnvironmentSpec {
    /// Workshop served by this environment
    pub workshop: WorkshopRef,

    /// Settings applied to every session
    #[serde(default)]
    pub session: SessionSettings,

    /// Maximum number of live sessions
    #[serde(default)]
    pub capacity: u32,

    /// Number of idle sessions to keep ready
    #[serde(default)]
    pub reserved: u32,
}

/// Reference to a Workshop by name
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct WorkshopRef {
    /// Workshop name
    pub name: String,
}

/// Session settings shared by an environment
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct SessionSettings {
    /// Ingress domain for session hostnames
    #[serde(default)]
    pub domain: String,

    /// Extra environment for session workloads
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
}

impl WorkshopEnvironmentSpec {
    /// Capacity and reserved with `reserved <= capacity` enforced
    ///
    /// The portal controller writes clamped values, but the spec can be
    /// edited directly.
    pub fn limits(&self) -> (u32, u32) {
        (self.capacity, self.reserved.min(self.capacity))
    }
}

/// Status for a WorkshopEnvironment
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkshopEnvironmentStatus {
    /// Current phase
    #[serde(default)]
    pub phase: EnvironmentPhase,

    /// Human-readable message about current state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Conditions representing the environment state
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Effective capacity
    #[serde(default)]
    pub capacity: u32,

    /// Effective reserved count
    #[serde(default)]
    pub reserved: u32,

    /// Sessions counting against capacity
    #[serde(default)]
    pub live_count: u32,

    /// Idle sessions
    #[serde(default)]
    pub reserved_count: u32,

    /// Sessions bound to learners
    #[serde(default)]
    pub allocated_count: u32,

    /// Generation of the spec last reconciled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl WorkshopEnvironmentStatus {
    /// Create a new status with the given phase
    pub fn with_phase(phase: EnvironmentPhase) -> Self {
        Self {
            phase,
            ..Default::default()
        }
    }

    /// Set the message and return self for chaining
    pub fn message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Add a condition and return self for chaining
    pub fn condition(mut self, condition: Condition) -> Self {
        self.conditions.retain(|c| c.type_ != condition.type_);
        self.conditions.push(condition);
        self
    }

    /// True when the observable fields match, ignoring condition timestamps
    pub fn same_state(&self, other: &Self) -> bool {
        self.phase == other.phase
            && self.message == other.message
            && self.capacity == other.capacity
            && self.reserved == other.reserved
            && self.live_count == other.live_count
            && self.reserved_count == other.reserved_count
            && self.allocated_count == other.allocated_count
            && self.observed_generation == other.observed_generation
    }
}
