//! Supporting types shared by the training CRDs

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Environment variable passed through to workshop sessions
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct EnvVar {
    /// Variable name
    pub name: String,
    /// Variable value
    #[serde(default)]
    pub value: String,
}

/// TrainingPortal lifecycle phase
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum PortalPhase {
    /// Portal has been observed but nothing has been created yet
    #[default]
    Pending,
    /// Environments and portal UI are being created
    Provisioning,
    /// Every child object has been created and status is current
    Ready,
    /// The spec cannot be realized until it is changed
    Failed,
}

impl std::fmt::Display for PortalPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Provisioning => write!(f, "Provisioning"),
            Self::Ready => write!(f, "Ready"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// WorkshopEnvironment phase
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum EnvironmentPhase {
    /// Environment has not been reconciled yet
    #[default]
    Pending,
    /// Pool is being maintained
    Ready,
    /// Environment cannot host sessions (missing workshop, zero capacity)
    Failed,
}

impl std::fmt::Display for EnvironmentPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Ready => write!(f, "Ready"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// WorkshopSession phase
///
/// Phases only move forward: `Reserved -> Allocated -> Expiring -> Terminated`.
/// A reserved session may skip straight to `Expiring` when it is reclaimed.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum SessionPhase {
    /// Created and idle, waiting for a learner
    #[default]
    Reserved,
    /// Bound to a learner
    Allocated,
    /// Scheduled for deletion
    Expiring,
    /// Gone; only ever observed on objects that are being removed
    Terminated,
}

impl SessionPhase {
    fn rank(self) -> u8 {
        match self {
            Self::Reserved => 0,
            Self::Allocated => 1,
            Self::Expiring => 2,
            Self::Terminated => 3,
        }
    }

    /// Whether moving from `self` to `next` keeps phases monotonic
    pub fn can_transition_to(self, next: SessionPhase) -> bool {
        next.rank() > self.rank()
    }

    /// Live sessions count against environment capacity
    pub fn is_live(self) -> bool {
        matches!(self, Self::Reserved | Self::Allocated)
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reserved => write!(f, "Reserved"),
            Self::Allocated => write!(f, "Allocated"),
            Self::Expiring => write!(f, "Expiring"),
            Self::Terminated => write!(f, "Terminated"),
        }
    }
}

/// Condition status following Kubernetes conventions
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    /// Condition is true
    True,
    /// Condition is false
    False,
    /// Condition status is unknown
    #[default]
    Unknown,
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::True => write!(f, "True"),
            Self::False => write!(f, "False"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Kubernetes-style condition for status reporting
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct Condition {
    /// Type of condition (e.g., Ready, Provisioning)
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition (True, False, Unknown)
    pub status: ConditionStatus,

    /// Machine-readable reason for the condition
    pub reason: String,

    /// Human-readable message
    pub message: String,

    /// Last time the condition transitioned
    #[serde(rename = "lastTransitionTime")]
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    /// Create a new condition with the current timestamp
    pub fn new(
        type_: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_: type_.into(),
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: Utc::now(),
        }
    }
}

/// Username/password pair
///
/// Debug output never includes the password.
#[derive(Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct Credentials {
    /// Login name
    pub username: String,
    /// Secret
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}
