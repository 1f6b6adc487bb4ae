//! Shared helpers for the kind tests

use std::future::Future;
use std::time::Duration;

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, DeleteParams, Patch, PatchParams};
use kube::{Client, CustomResourceExt, Resource};
use serde::de::DeserializeOwned;

use eduk8s::crd::{
    PortalSettings, PortalWorkshop, TrainingPortal, TrainingPortalSpec, Workshop,
    WorkshopEnvironment, WorkshopSession, WorkshopSpec,
};

/// Connect to the test cluster and make sure the CRDs are installed
pub async fn ensure_test_cluster() -> anyhow::Result<Client> {
    let client = Client::try_default().await?;
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply("eduk8s-integration-test").force();

    for crd in [
        TrainingPortal::crd(),
        Workshop::crd(),
        WorkshopEnvironment::crd(),
        WorkshopSession::crd(),
    ] {
        let name = crd.metadata.name.clone().unwrap_or_default();
        crds.patch(&name, &params, &Patch::Apply(&crd)).await?;
    }

    // new CRDs take a moment before their endpoints serve
    tokio::time::sleep(Duration::from_secs(2)).await;
    Ok(client)
}

/// A workshop catalog entry
pub fn sample_workshop(name: &str) -> Workshop {
    Workshop::new(
        name,
        WorkshopSpec {
            vendor: "eduk8s.io".to_string(),
            title: "Kubernetes Fundamentals".to_string(),
            description: "Learn the basics".to_string(),
            url: "https://github.com/eduk8s/lab-k8s-fundamentals".to_string(),
            content: None,
            duration: Some("30m".to_string()),
        },
    )
}

/// A portal offering `workshops`
pub fn sample_portal(
    name: &str,
    workshops: &[&str],
    capacity: i64,
    reserved: i64,
) -> TrainingPortal {
    TrainingPortal::new(
        name,
        TrainingPortalSpec {
            portal: PortalSettings {
                domain: Some("training.127.0.0.1.nip.io".to_string()),
                capacity: Some(capacity),
                reserved: Some(reserved),
            },
            workshops: workshops
                .iter()
                .map(|w| PortalWorkshop {
                    name: w.to_string(),
                    ..Default::default()
                })
                .collect(),
        },
    )
}

/// Delete a cluster-scoped object, ignoring errors
pub async fn cleanup<K>(client: &Client, name: &str)
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + std::fmt::Debug,
{
    let api: Api<K> = Api::all(client.clone());
    let _ = api.delete(name, &DeleteParams::default()).await;
}

/// Poll `check` until it returns `Some` or `timeout` passes
pub async fn wait_for<T, F, Fut>(timeout: Duration, mut check: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if let Some(value) = check().await {
            return Some(value);
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    None
}
