//! Portal UI objects
//!
//! The portal UI runs in `<portal>-ui` with its own service account, a
//! cluster role limited to the training resources, a credentials secret,
//! a persistent volume, and a deployment exposed through a service and
//! ingress.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, DeploymentStrategy};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar as ContainerEnv, EnvVarSource, Namespace,
    PersistentVolumeClaim, PersistentVolumeClaimSpec, PersistentVolumeClaimVolumeSource, PodSpec,
    PodTemplateSpec, ResourceRequirements, Secret, SecretKeySelector, Service, ServiceAccount,
    ServicePort, ServiceSpec, Volume, VolumeMount, VolumeResourceRequirements,
};
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, IngressTLS, ServiceBackendPort,
};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, PolicyRule, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use super::{labels, object_meta, ObjectSpec};
use crate::crd::{Credentials, API_GROUP, PORTAL_LABEL};
use crate::Result;

/// Name shared by the portal UI workload objects
pub const PORTAL_UI_NAME: &str = "eduk8s-portal";

const CREDENTIALS_SECRET: &str = "eduk8s-portal-credentials";
const PORTAL_PORT: i32 = 8080;
const DATA_PATH: &str = "/var/run/eduk8s";

/// Inputs for the portal UI templates
#[derive(Clone, Debug)]
pub struct PortalParams {
    /// Portal name
    pub portal: String,
    /// Ingress domain
    pub domain: String,
    /// URL scheme (`http` or `https`)
    pub protocol: String,
    /// Ingress class, if any
    pub ingress_class: Option<String>,
    /// TLS secret for ingresses, if any
    pub ingress_secret: Option<String>,
    /// Storage class for the portal volume, if any
    pub storage_class: Option<String>,
    /// Portal UI image
    pub image: String,
    /// Administrator login
    pub admin: Credentials,
}

impl PortalParams {
    /// Hostname of the portal UI
    pub fn hostname(&self) -> String {
        format!("{}.{}", portal_namespace(&self.portal), self.domain)
    }

    /// Public URL of the portal UI
    pub fn url(&self) -> String {
        format!("{}://{}", self.protocol, self.hostname())
    }
}

/// Namespace holding a portal's UI workload
pub fn portal_namespace(portal: &str) -> String {
    format!("{portal}-ui")
}

/// Build the portal UI objects, namespace first
pub fn build_portal_ui_objects(params: &PortalParams) -> Result<Vec<ObjectSpec>> {
    let namespace = portal_namespace(&params.portal);
    let ns = Some(namespace.as_str());
    let labels = labels([
        (PORTAL_LABEL, params.portal.as_str()),
        ("app", PORTAL_UI_NAME),
    ]);
    let selector = BTreeMap::from([("app".to_string(), PORTAL_UI_NAME.to_string())]);
    let role_name = format!("{PORTAL_UI_NAME}-{}", params.portal);

    let namespace_obj = Namespace {
        metadata: object_meta(namespace.clone(), None, &labels),
        ..Default::default()
    };

    let service_account = ServiceAccount {
        metadata: object_meta(PORTAL_UI_NAME, ns, &labels),
        ..Default::default()
    };

    let cluster_role = ClusterRole {
        metadata: object_meta(role_name.clone(), None, &labels),
        rules: Some(vec![
            PolicyRule {
                api_groups: Some(vec![API_GROUP.to_string()]),
                resources: Some(
                    [
                        "workshops",
                        "workshopenvironments",
                        "workshopsessions",
                        "trainingportals",
                    ]
                    .map(String::from)
                    .to_vec(),
                ),
                verbs: vec!["get".to_string(), "list".to_string(), "watch".to_string()],
                ..Default::default()
            },
            PolicyRule {
                api_groups: Some(vec![API_GROUP.to_string()]),
                resources: Some(vec!["workshopsessions".to_string()]),
                verbs: vec!["create".to_string(), "delete".to_string()],
                ..Default::default()
            },
        ]),
        ..Default::default()
    };

    let binding = ClusterRoleBinding {
        metadata: object_meta(role_name.clone(), None, &labels),
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "ClusterRole".to_string(),
            name: role_name,
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name: PORTAL_UI_NAME.to_string(),
            namespace: Some(namespace.clone()),
            ..Default::default()
        }]),
    };

    let secret = Secret {
        metadata: object_meta(CREDENTIALS_SECRET, ns, &labels),
        type_: Some("Opaque".to_string()),
        string_data: Some(BTreeMap::from([
            ("username".to_string(), params.admin.username.clone()),
            ("password".to_string(), params.admin.password.clone()),
        ])),
        ..Default::default()
    };

    let claim = PersistentVolumeClaim {
        metadata: object_meta(PORTAL_UI_NAME, ns, &labels),
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteOnce".to_string()]),
            resources: Some(VolumeResourceRequirements {
                requests: Some(BTreeMap::from([(
                    "storage".to_string(),
                    Quantity("1Gi".to_string()),
                )])),
                ..Default::default()
            }),
            storage_class_name: params.storage_class.clone(),
            ..Default::default()
        }),
        ..Default::default()
    };

    let env = vec![
        plain_env("TRAINING_PORTAL", &params.portal),
        ContainerEnv {
            name: "ADMIN_PASSWORD".to_string(),
            value_from: Some(EnvVarSource {
                secret_key_ref: Some(SecretKeySelector {
                    name: CREDENTIALS_SECRET.to_string(),
                    key: "password".to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        },
        plain_env("INGRESS_DOMAIN", &params.domain),
        plain_env("INGRESS_PROTOCOL", &params.protocol),
    ];

    let deployment = Deployment {
        metadata: object_meta(PORTAL_UI_NAME, ns, &labels),
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(selector.clone()),
                ..Default::default()
            },
            strategy: Some(DeploymentStrategy {
                type_: Some("Recreate".to_string()),
                ..Default::default()
            }),
            template: PodTemplateSpec {
                metadata: Some(object_meta(PORTAL_UI_NAME, None, &labels)),
                spec: Some(PodSpec {
                    service_account_name: Some(PORTAL_UI_NAME.to_string()),
                    containers: vec![Container {
                        name: "portal".to_string(),
                        image: Some(params.image.clone()),
                        image_pull_policy: Some("Always".to_string()),
                        ports: Some(vec![ContainerPort {
                            name: Some("http".to_string()),
                            container_port: PORTAL_PORT,
                            protocol: Some("TCP".to_string()),
                            ..Default::default()
                        }]),
                        env: Some(env),
                        resources: Some(ResourceRequirements {
                            requests: Some(memory("256Mi")),
                            limits: Some(memory("256Mi")),
                            ..Default::default()
                        }),
                        volume_mounts: Some(vec![VolumeMount {
                            name: "data".to_string(),
                            mount_path: DATA_PATH.to_string(),
                            ..Default::default()
                        }]),
                        ..Default::default()
                    }],
                    volumes: Some(vec![Volume {
                        name: "data".to_string(),
                        persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                            claim_name: PORTAL_UI_NAME.to_string(),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }]),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    };

    let service = Service {
        metadata: object_meta(PORTAL_UI_NAME, ns, &labels),
        spec: Some(ServiceSpec {
            selector: Some(selector),
            ports: Some(vec![ServicePort {
                name: Some("http".to_string()),
                port: PORTAL_PORT,
                target_port: Some(IntOrString::Int(PORTAL_PORT)),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    };

    let ingress = ingress_for(
        PORTAL_UI_NAME,
        &namespace,
        &params.hostname(),
        PORTAL_PORT,
        params.ingress_class.clone(),
        params.ingress_secret.clone(),
        &labels,
    );

    Ok(vec![
        ObjectSpec::from_typed(&namespace_obj)?,
        ObjectSpec::from_typed(&service_account)?,
        ObjectSpec::from_typed(&cluster_role)?,
        ObjectSpec::from_typed(&binding)?,
        ObjectSpec::from_typed(&secret)?,
        ObjectSpec::from_typed(&claim)?,
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

fn memory(amount: &str) -> BTreeMap<String, Quantity> {
    BTreeMap::from([("memory".to_string(), Quantity(amount.to_string()))])
}

/// Ingress routing `/` on `host` to the named service
pub(crate) fn ingress_for(
    name: &str,
    namespace: &str,
    host: &str,
    port: i32,
    class: Option<String>,
    tls_secret: Option<String>,
    labels: &BTreeMap<String, String>,
) -> Ingress {
    Ingress {
        metadata: object_meta(name, Some(namespace), labels),
        spec: Some(IngressSpec {
            ingress_class_name: class,
            rules: Some(vec![IngressRule {
                host: Some(host.to_string()),
                http: Some(HTTPIngressRuleValue {
                    paths: vec![HTTPIngressPath {
                        path: Some("/".to_string()),
                        path_type: "Prefix".to_string(),
                        backend: IngressBackend {
                            service: Some(IngressServiceBackend {
                                name: name.to_string(),
                                port: Some(ServiceBackendPort {
                                    number: Some(port),
                                    ..Default::default()
                                }),
                            }),
                            ..Default::default()
                        },
                    }],
                }),
            }]),
            tls: tls_secret.map(|secret| {
                vec![IngressTLS {
                    hosts: Some(vec![host.to_string()]),
                    secret_name: Some(secret),
                }]
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}
