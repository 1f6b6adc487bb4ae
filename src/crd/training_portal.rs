//! TrainingPortal Custom Resource Definition
//!
//! A TrainingPortal is the top-level object a platform operator creates. It
//! lists the workshops to offer and the session capacity for each, and owns
//! everything the operator creates on its behalf.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{Condition, Credentials, EnvVar, PortalPhase};
use crate::credentials::SESSION_SUFFIX_LENGTH;

/// Specification for a TrainingPortal
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "training.eduk8s.io",
    version = "v1alpha1",
    kind = "TrainingPortal",
    plural = "trainingportals",
    shortname = "portal",
    status = "TrainingPortalStatus",
    namespaced = false,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"URL","type":"string","jsonPath":".status.url"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct TrainingPortalSpec {
    /// Portal-wide settings and defaults
    #[serde(default)]
    pub portal: PortalSettings,

    /// Workshops offered by this portal, in display order
    #[serde(default)]
    pub workshops: Vec<PortalWorkshop>,
}

/// Portal-wide settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PortalSettings {
    /// Ingress domain override for this portal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,

    /// Default session capacity for every workshop
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<i64>,

    /// Default number of idle sessions to keep ready (defaults to capacity)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reserved: Option<i64>,
}

/// A workshop entry within a portal
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PortalWorkshop {
    /// Name of the Workshop resource
    pub name: String,

    /// Capacity override for this workshop
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<i64>,

    /// Reserved override for this workshop
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reserved: Option<i64>,

    /// Extra environment for sessions of this workshop
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
}

/// Longest portal name whose session names still fit a DNS label
///
/// Sessions are named `<portal>-wNN-<suffix>` and that name is reused for
/// their services and label values.
pub const MAX_PORTAL_NAME_LENGTH: usize = 63 - "-wNN-".len() - SESSION_SUFFIX_LENGTH;

impl TrainingPortalSpec {
    /// Validate the portal specification
    pub fn validate(&self, portal: &str) -> Result<(), crate::Error> {
        if !is_dns_label(portal) || portal.len() > MAX_PORTAL_NAME_LENGTH {
            return Err(crate::Error::validation_for_field(
                portal,
                "metadata.name",
                format!(
                    "portal name must be a DNS label of at most {MAX_PORTAL_NAME_LENGTH} characters"
                ),
            ));
        }

        if let Some(domain) = &self.portal.domain {
            if domain.trim().is_empty() {
                return Err(crate::Error::validation_for_field(
                    portal,
                    "spec.portal.domain",
                    "domain must not be empty when set",
                ));
            }
        }

        for (index, workshop) in self.workshops.iter().enumerate() {
            if !is_dns_label(&workshop.name) {
                return Err(crate::Error::validation_for_field(
                    portal,
                    format!("spec.workshops[{index}].name"),
                    format!("'{}' is not a valid workshop name", workshop.name),
                ));
            }
        }

        if self.workshops.len() > 99 {
            return Err(crate::Error::validation_for_field(
                portal,
                "spec.workshops",
                "a portal can offer at most 99 workshops",
            ));
        }

        Ok(())
    }
}

/// RFC 1123 label check used for names that become object names
pub(crate) fn is_dns_label(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 63
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !name.starts_with('-')
        && !name.ends_with('-')
}

/// Status for a TrainingPortal
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrainingPortalStatus {
    /// Current phase of the portal lifecycle
    #[serde(default)]
    pub phase: PortalPhase,

    /// Human-readable message about current state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Conditions representing the portal state
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Generation of the spec last fully realized
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Public URL of the portal UI
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Portal credentials
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<PortalCredentials>,

    /// Catalog details of the offered workshops
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub workshops: Vec<WorkshopDetails>,

    /// Environments realized for this portal
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub environments: Vec<EnvironmentSummary>,
}

/// Portal credentials stored on status
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct PortalCredentials {
    /// Administrator login for the portal UI
    pub administrator: Credentials,
}

/// Catalog entry copied from a Workshop
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct WorkshopDetails {
    /// Workshop name
    pub name: String,
    /// Workshop vendor
    #[serde(default)]
    pub vendor: String,
    /// Short title
    #[serde(default)]
    pub title: String,
    /// Longer description
    #[serde(default)]
    pub description: String,
    /// Link to more information
    #[serde(default)]
    pub url: String,
}

/// Realized environment for one workshop entry
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct EnvironmentSummary {
    /// Environment name (`<portal>-wNN`)
    pub name: String,
    /// Workshop the environment serves
    pub workshop: String,
    /// Effective capacity after clamping
    pub capacity: u32,
    /// Effective reserved count after clamping
    pub reserved: u32,
}

impl TrainingPortalStatus {
    /// Create a new status with the given phase
    pub fn with_phase(phase: PortalPhase) -> Self {
        Self {
            phase,
            ..Default::default()
        }
    }

    /// Set the phase and return self for chaining
    pub fn phase(mut self, phase: PortalPhase) -> Self {
        self.phase = phase;
        self
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

    /// Administrator credential recorded by an earlier reconcile, if any
    pub fn administrator(&self) -> Option<&Credentials> {
        self.credentials.as_ref().map(|c| &c.administrator)
    }
}
