//! Workshop Custom Resource Definition
//!
//! A Workshop is a catalog entry describing workshop content. The operator
//! only ever reads it.

use std::time::Duration;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::training_portal::WorkshopDetails;

/// Specification for a Workshop
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "training.eduk8s.io",
    version = "v1alpha1",
    kind = "Workshop",
    plural = "workshops",
    shortname = "workshop",
    namespaced = false,
    printcolumn = r#"{"name":"Title","type":"string","jsonPath":".spec.title"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct WorkshopSpec {
    /// Organization providing the workshop
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

    /// Workshop content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<WorkshopContent>,

    /// Lifetime of an allocated session, e.g. `30m`, `2h` or `3600s`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
}

/// Where the workshop content comes from
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct WorkshopContent {
    /// Container image serving the workshop
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl WorkshopSpec {
    /// Catalog details as recorded on portal status
    pub fn details(&self, name: &str) -> WorkshopDetails {
        WorkshopDetails {
            name: name.to_string(),
            vendor: self.vendor.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            url: self.url.clone(),
        }
    }

    /// Parsed session lifetime, if the workshop sets one
    pub fn session_duration(&self) -> Result<Option<Duration>, crate::Error> {
        self.duration.as_deref().map(parse_duration).transpose()
    }

    /// Content image, if any
    pub fn image(&self) -> Option<&str> {
        self.content.as_ref().and_then(|c| c.image.as_deref())
    }
}

/// Parse `<n>s`, `<n>m`, `<n>h` or a bare number of seconds
pub fn parse_duration(value: &str) -> Result<Duration, crate::Error> {
    let value = value.trim();
    let (digits, unit) = match value.char_indices().last() {
        Some((idx, c)) if c.is_ascii_alphabetic() => (&value[..idx], Some(c)),
        _ => (value, None),
    };

    let amount: u64 = digits.parse().map_err(|_| {
        crate::Error::validation_for_field(
            "workshop",
            "spec.duration",
            format!("invalid duration '{value}'"),
        )
    })?;

    let secs = match unit {
        None | Some('s') => amount,
        Some('m') => amount * 60,
        Some('h') => amount * 3600,
        Some(other) => {
            return Err(crate::Error::validation_for_field(
                "workshop",
                "spec.duration",
                format!("unknown duration unit '{other}'"),
            ))
        }
    };

    Ok(Duration::from_secs(secs))
}
