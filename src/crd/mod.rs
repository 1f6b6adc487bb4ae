//! Custom Resource Definitions for the training platform
//!
//! All kinds live in the `training.eduk8s.io` API group at `v1alpha1`.

mod training_portal;
mod types;
mod workshop;
mod workshop_environment;
mod workshop_session;

pub use training_portal::{
    EnvironmentSummary, PortalCredentials, PortalSettings, PortalWorkshop, TrainingPortal,
    TrainingPortalSpec, TrainingPortalStatus, WorkshopDetails,
};
pub(crate) use training_portal::is_dns_label;
pub use types::{
    Condition, ConditionStatus, Credentials, EnvVar, EnvironmentPhase, PortalPhase, SessionPhase,
};
pub use workshop::{parse_duration, Workshop, WorkshopContent, WorkshopSpec};
pub use workshop_environment::{
    SessionSettings, WorkshopEnvironment, WorkshopEnvironmentSpec, WorkshopEnvironmentStatus,
    WorkshopRef,
};
pub use workshop_session::{WorkshopSession, WorkshopSessionSpec, WorkshopSessionStatus};

/// API group of every training CRD
pub const API_GROUP: &str = "training.eduk8s.io";

/// Label selecting the objects that belong to an environment
pub const ENVIRONMENT_LABEL: &str = "training.eduk8s.io/environment";

/// Label selecting the objects that belong to a portal
pub const PORTAL_LABEL: &str = "training.eduk8s.io/portal";

/// Label selecting the workload of one session
pub const SESSION_LABEL: &str = "training.eduk8s.io/session";

/// Standard managed-by label key
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Value of the managed-by label on every object the operator creates
pub const MANAGED_BY_VALUE: &str = "eduk8s-operator";
