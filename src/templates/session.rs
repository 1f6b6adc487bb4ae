//! Session workload objects
//!
//! Everything here lives in the environment namespace and is owned by the
//! WorkshopSession, so deleting the session removes its workload. Sessions
//! get no namespace of their own: a namespaced WorkshopSession cannot own a
//! cluster-scoped Namespace.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar as ContainerEnv, EnvVarSource, PodSpec, PodTemplateSpec,
    Secret, SecretKeySelector, Service, ServiceAccount, ServicePort, ServiceSpec,
};
use k8s_openapi::api::rbac::v1::{PolicyRule, Role, RoleBinding, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use super::portal::ingress_for;
use super::{labels, object_meta, ObjectSpec};
use crate::crd::{Credentials, EnvVar, ENVIRONMENT_LABEL, SESSION_LABEL};
use crate::Result;

const SESSION_PORT: i32 = 10080;

/// Inputs for the session templates
#[derive(Clone, Debug)]
pub struct SessionParams {
    /// Session name
    pub session: String,
    /// Environment namespace
    pub namespace: String,
    /// Owning environment
    pub environment: String,
    /// Workshop served
    pub workshop: String,
    /// Ingress domain
    pub domain: String,
    /// URL scheme
    pub protocol: String,
    /// Workshop image
    pub image: String,
    /// Ingress class, if any
    pub ingress_class: Option<String>,
    /// TLS secret for ingresses, if any
    pub ingress_secret: Option<String>,
    /// Session login
    pub credentials: Credentials,
    /// Extra environment
    pub env: Vec<EnvVar>,
}

impl SessionParams {
    /// Public URL of the session
    pub fn url(&self) -> String {
        format!(
            "{}://{}",
            self.protocol,
            session_hostname(&self.session, &self.domain)
        )
    }
}

/// Hostname of a session
pub fn session_hostname(session: &str, domain: &str) -> String {
    format!("{session}.{domain}")
}

/// Build the workload of one session
pub fn build_session_objects(params: &SessionParams) -> Result<Vec<ObjectSpec>> {
    let name = params.session.as_str();
    let ns = Some(params.namespace.as_str());
    let labels = labels([
        (ENVIRONMENT_LABEL, params.environment.as_str()),
        (SESSION_LABEL, name),
    ]);
    let selector = BTreeMap::from([(SESSION_LABEL.to_string(), name.to_string())]);
    let secret_name = format!("{name}-credentials");

    let service_account = ServiceAccount {
        metadata: object_meta(name, ns, &labels),
        ..Default::default()
    };

    let role = Role {
        metadata: object_meta(name, ns, &labels),
        rules: Some(vec![PolicyRule {
            api_groups: Some(vec![String::new(), "apps".to_string()]),
            resources: Some(
                ["pods", "pods/log", "services", "configmaps", "deployments"]
                    .map(String::from)
                    .to_vec(),
            ),
            verbs: ["get", "list", "watch"].map(String::from).to_vec(),
            ..Default::default()
        }]),
    };

    let binding = RoleBinding {
        metadata: object_meta(name, ns, &labels),
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "Role".to_string(),
            name: name.to_string(),
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name: name.to_string(),
            namespace: Some(params.namespace.clone()),
            ..Default::default()
        }]),
    };

    let secret = Secret {
        metadata: object_meta(secret_name.clone(), ns, &labels),
        type_: Some("Opaque".to_string()),
        string_data: Some(BTreeMap::from([
            ("username".to_string(), params.credentials.username.clone()),
            ("password".to_string(), params.credentials.password.clone()),
        ])),
        ..Default::default()
    };

    let mut env = vec![
        plain_env("WORKSHOP_NAME", &params.workshop),
        plain_env("ENVIRONMENT_NAME", &params.environment),
        plain_env("SESSION_NAME", name),
        plain_env("SESSION_NAMESPACE", &params.namespace),
        plain_env("INGRESS_DOMAIN", &params.domain),
        plain_env("INGRESS_PROTOCOL", &params.protocol),
        ContainerEnv {
            name: "AUTH_USERNAME".to_string(),
            value: Some(params.credentials.username.clone()),
            ..Default::default()
        },
        ContainerEnv {
            name: "AUTH_PASSWORD".to_string(),
            value_from: Some(EnvVarSource {
                secret_key_ref: Some(SecretKeySelector {
                    name: secret_name,
                    key: "password".to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        },
    ];
    env.extend(params.env.iter().map(|e| plain_env(&e.name, &e.value)));

    let deployment = Deployment {
        metadata: object_meta(name, ns, &labels),
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(selector.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(object_meta(name, None, &labels)),
                spec: Some(PodSpec {
                    service_account_name: Some(name.to_string()),
                    containers: vec![Container {
                        name: "workshop".to_string(),
                        image: Some(params.image.clone()),
                        ports: Some(vec![ContainerPort {
                            name: Some("http".to_string()),
                            container_port: SESSION_PORT,
                            protocol: Some("TCP".to_string()),
                            ..Default::default()
                        }]),
                        env: Some(env),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    };

    let service = Service {
        metadata: object_meta(name, ns, &labels),
        spec: Some(ServiceSpec {
            selector: Some(selector),
            ports: Some(vec![ServicePort {
                name: Some("http".to_string()),
                port: SESSION_PORT,
                target_port: Some(IntOrString::Int(SESSION_PORT)),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    };

    let ingress = ingress_for(
        name,
        &params.namespace,
        &session_hostname(name, &params.domain),
        SESSION_PORT,
        params.ingress_class.clone(),
        params.ingress_secret.clone(),
        &labels,
    );

    Ok(vec![
        ObjectSpec::from_typed(&service_account)?,
        ObjectSpec::from_typed(&role)?,
        ObjectSpec::from_typed(&binding)?,
        ObjectSpec::from_typed(&secret)?,
        ObjectSpec::from_typed(&deployment)?,
        ObjectSpec::from_typed(&service)?,
        ObjectSpec::from_typed(&ingress)?,
    ])
}

fn plain_env(name: &str, value: &str) -> ContainerEnv {
    ContainerEnv {
        name: name.to_string(),
        value: Some(value.to_string()),
        ..Default::default()
    }
}
