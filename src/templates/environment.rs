//! Environment objects
//!
//! Each workshop entry of a portal becomes a namespace and a
//! WorkshopEnvironment inside it. Both are owned by the portal.

use k8s_openapi::api::core::v1::Namespace;

use super::{labels, object_meta, ObjectSpec};
use crate::crd::{
    EnvVar, SessionSettings, WorkshopEnvironment, WorkshopEnvironmentSpec, WorkshopRef,
    ENVIRONMENT_LABEL, PORTAL_LABEL,
};
use crate::Result;

/// Inputs for the environment templates
#[derive(Clone, Debug, PartialEq)]
pub struct EnvironmentParams {
    /// Owning portal
    pub portal: String,
    /// Environment name, also its namespace
    pub name: String,
    /// Workshop served
    pub workshop: String,
    /// Ingress domain for sessions
    pub domain: String,
    /// Effective capacity
    pub capacity: u32,
    /// Effective reserved count
    pub reserved: u32,
    /// Extra session environment
    pub env: Vec<EnvVar>,
}

impl EnvironmentParams {
    /// The WorkshopEnvironment resource for these parameters
    pub fn resource(&self) -> WorkshopEnvironment {
        let labels = labels([
            (PORTAL_LABEL, self.portal.as_str()),
            (ENVIRONMENT_LABEL, self.name.as_str()),
        ]);
        WorkshopEnvironment {
            metadata: object_meta(self.name.clone(), Some(&self.name), &labels),
            spec: WorkshopEnvironmentSpec {
                workshop: WorkshopRef {
                    name: self.workshop.clone(),
                },
                session: SessionSettings {
                    domain: self.domain.clone(),
                    env: self.env.clone(),
                },
                capacity: self.capacity,
                reserved: self.reserved,
            },
            status: None,
        }
    }
}

/// Build the environment namespace followed by the environment itself
pub fn build_environment_objects(params: &EnvironmentParams) -> Result<Vec<ObjectSpec>> {
    let labels = labels([
        (PORTAL_LABEL, params.portal.as_str()),
        (ENVIRONMENT_LABEL, params.name.as_str()),
    ]);

    let namespace = Namespace {
        metadata: object_meta(params.name.clone(), None, &labels),
        ..Default::default()
    };

    Ok(vec![
        ObjectSpec::from_typed(&namespace)?,
        ObjectSpec::from_typed(&params.resource())?,
    ])
}
