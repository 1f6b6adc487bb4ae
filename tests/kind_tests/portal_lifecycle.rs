//! Integration tests for the controllers
//!
//! Each test runs the controllers in-process against the kind cluster and
//! follows a portal from creation to deletion.

use std::sync::Arc;
use std::time::Duration;

use kube::api::{Api, ListParams};
use kube::Client;

use eduk8s::config::OperatorConfig;
use eduk8s::controller::Context;
use eduk8s::crd::{
    PortalPhase, SessionPhase, TrainingPortal, Workshop, WorkshopEnvironment, WorkshopSession,
};
use eduk8s::dispatcher::run_controllers;
use eduk8s::pool::Allocation;

use super::helpers::{cleanup, ensure_test_cluster, sample_portal, sample_workshop, wait_for};

const TIMEOUT: Duration = Duration::from_secs(120);

fn start_operator(client: &Client) -> Arc<Context> {
    let config = OperatorConfig {
        resync_interval_secs: 5,
        ..Default::default()
    };
    let ctx = Arc::new(Context::builder(client.clone()).config(config).build());
    tokio::spawn(run_controllers(client.clone(), ctx.clone()));
    ctx
}

async fn sessions(client: &Client, environment: &str) -> Vec<WorkshopSession> {
    let api: Api<WorkshopSession> = Api::namespaced(client.clone(), environment);
    api.list(&ListParams::default())
        .await
        .map(|l| l.items)
        .unwrap_or_default()
}

/// Story: A portal is provisioned, hands out sessions and is torn down
///
/// The administrator publishes a workshop and a portal for it. The portal
/// becomes Ready, its environment fills the reserved pool, a learner gets a
/// session, and deleting the portal removes everything.
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_portal_from_creation_to_deletion() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let portal_name = "it-lifecycle";
    let workshop_name = "it-lifecycle-lab";
    let env_name = "it-lifecycle-w01";
    cleanup::<TrainingPortal>(&client, portal_name).await;
    cleanup::<Workshop>(&client, workshop_name).await;

    let ctx = start_operator(&client);

    let workshops: Api<Workshop> = Api::all(client.clone());
    workshops
        .create(&Default::default(), &sample_workshop(workshop_name))
        .await
        .expect("failed to create workshop");
    let portals: Api<TrainingPortal> = Api::all(client.clone());
    portals
        .create(
            &Default::default(),
            &sample_portal(portal_name, &[workshop_name], 3, 2),
        )
        .await
        .expect("failed to create portal");

    let (client, portals) = (&client, &portals);

    // Portal becomes Ready with a URL and an administrator login
    let status = wait_for(TIMEOUT, || async move {
        let portal = portals.get(portal_name).await.ok()?;
        portal
            .status
            .filter(|s| s.phase == PortalPhase::Ready)
    })
    .await
    .expect("portal never became Ready");
    assert!(status.url.unwrap().contains("it-lifecycle-ui"));
    assert_eq!(status.environments.len(), 1);
    assert_eq!(status.environments[0].name, env_name);

    // The environment fills its reserved pool
    let idle = wait_for(TIMEOUT, || async move {
        let idle = sessions(client, env_name)
            .await
            .into_iter()
            .filter(|s| s.phase() == SessionPhase::Reserved)
            .count();
        (idle == 2).then_some(idle)
    })
    .await;
    assert_eq!(idle, Some(2), "reserved pool never filled");

    // A learner gets a session
    let envs: &Api<WorkshopEnvironment> = &Api::namespaced(client.clone(), env_name);
    let env = envs.get(env_name).await.expect("environment missing");
    let handle = match ctx.pool.allocate(&env, "alice").await.unwrap() {
        Allocation::Allocated(handle) => handle,
        Allocation::Busy => panic!("expected a session"),
    };
    assert!(handle.url.starts_with(&format!("http://{}.", handle.name)));

    // Deleting the portal cascades to the environment and its sessions
    cleanup::<TrainingPortal>(client, portal_name).await;
    let gone = wait_for(TIMEOUT, || async move {
        envs.get_opt(env_name)
            .await
            .ok()
            .and_then(|e| e.is_none().then_some(()))
    })
    .await;
    assert!(gone.is_some(), "environment survived portal deletion");

    cleanup::<Workshop>(client, workshop_name).await;
}

/// Story: A portal listing a workshop that doesn't exist yet waits for it
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_portal_waits_for_late_workshop() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let portal_name = "it-late";
    let workshop_name = "it-late-lab";
    cleanup::<TrainingPortal>(&client, portal_name).await;
    cleanup::<Workshop>(&client, workshop_name).await;

    start_operator(&client);

    let portals: Api<TrainingPortal> = Api::all(client.clone());
    portals
        .create(
            &Default::default(),
            &sample_portal(portal_name, &[workshop_name], 1, 0),
        )
        .await
        .expect("failed to create portal");

    tokio::time::sleep(Duration::from_secs(5)).await;
    let portal = portals.get(portal_name).await.expect("portal missing");
    assert_ne!(portal.status.map(|s| s.phase), Some(PortalPhase::Ready));

    let workshops: Api<Workshop> = Api::all(client.clone());
    workshops
        .create(&Default::default(), &sample_workshop(workshop_name))
        .await
        .expect("failed to create workshop");

    let portals = &portals;
    let ready = wait_for(TIMEOUT, || async move {
        let portal = portals.get(portal_name).await.ok()?;
        portal.status.filter(|s| s.phase == PortalPhase::Ready)
    })
    .await;
    assert!(ready.is_some(), "portal never picked up the workshop");

    cleanup::<TrainingPortal>(&client, portal_name).await;
    cleanup::<Workshop>(&client, workshop_name).await;
}
