//! Integration tests for CRD operations
//!
//! These tests tell the story of how workshop administrators manage training
//! resources through the Kubernetes API, without the operator running.

use kube::api::{Api, Patch, PatchParams, PostParams};

use eduk8s::crd::{TrainingPortal, Workshop};

use super::helpers::{cleanup, ensure_test_cluster, sample_portal, sample_workshop};

/// Story: Administrator publishes a workshop to the catalog
///
/// Workshops are cluster-scoped catalog entries; every field the portal
/// later reports must survive the round trip through the API server.
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_admin_publishes_workshop() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let api: Api<Workshop> = Api::all(client.clone());
    let name = "it-crd-workshop";
    cleanup::<Workshop>(&client, name).await;

    let created = api
        .create(&PostParams::default(), &sample_workshop(name))
        .await
        .expect("failed to create workshop");
    assert_eq!(created.metadata.name.as_deref(), Some(name));

    let fetched = api.get(name).await.expect("failed to get workshop");
    assert_eq!(fetched.spec.title, "Kubernetes Fundamentals");
    assert_eq!(
        fetched.spec.session_duration().unwrap(),
        Some(std::time::Duration::from_secs(1800))
    );

    cleanup::<Workshop>(&client, name).await;
}

/// Story: Administrator raises a portal's capacity
///
/// Editing the spec bumps the generation, which is what the portal
/// controller compares against `observedGeneration`.
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_admin_edits_portal_capacity() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let api: Api<TrainingPortal> = Api::all(client.clone());
    let name = "it-crd-portal";
    cleanup::<TrainingPortal>(&client, name).await;

    let created = api
        .create(
            &PostParams::default(),
            &sample_portal(name, &["lab-k8s-fundamentals"], 2, 1),
        )
        .await
        .expect("failed to create portal");
    let generation = created.metadata.generation;

    let patch = serde_json::json!({"spec": {"portal": {"capacity": 5}}});
    let updated = api
        .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
        .await
        .expect("failed to patch portal");

    assert_eq!(updated.spec.portal.capacity, Some(5));
    assert_eq!(updated.spec.portal.reserved, Some(1));
    assert!(updated.metadata.generation > generation);

    cleanup::<TrainingPortal>(&client, name).await;
}
