//! eduk8s operator - training portals, environments and sessions

use std::sync::Arc;

use clap::{Parser, Subcommand};
use kube::{Api, Client, CustomResourceExt};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use eduk8s::allocation::{self, AllocationState};
use eduk8s::config::{LogFormat, OperatorConfig};
use eduk8s::controller::Context;
use eduk8s::crd::{TrainingPortal, Workshop, WorkshopEnvironment, WorkshopSession};
use eduk8s::dispatcher::run_controllers;
use eduk8s::retry::{retry_with_backoff, RetryConfig};

/// eduk8s - Kubernetes operator for multi-tenant workshop training portals
#[derive(Parser, Debug)]
#[command(name = "eduk8s-operator", version, about, long_about = None)]
struct Cli {
    /// Generate CRD manifests and exit
    #[arg(long)]
    crd: bool,

    /// Settings for the default controller mode
    #[command(flatten)]
    config: OperatorConfig,

    #[command(subcommand)]
    command: Option<Commands>,
}

impl Cli {
    /// Configuration for the selected mode
    fn into_config(self) -> OperatorConfig {
        match self.command {
            Some(Commands::Controller(config)) => config,
            None => self.config,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run as controller (default mode)
    ///
    /// Watches TrainingPortals, Workshops, WorkshopEnvironments and
    /// WorkshopSessions, and serves the allocation API.
    Controller(OperatorConfig),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.crd {
        for crd in [
            TrainingPortal::crd(),
            Workshop::crd(),
            WorkshopEnvironment::crd(),
            WorkshopSession::crd(),
        ] {
            let yaml = serde_yaml::to_string(&crd)
                .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
            println!("---\n{yaml}");
        }
        return Ok(());
    }

    let config = cli.into_config();

    init_tracing(config.log_format);
    run_controller(config).await
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Text => registry.with(fmt::layer()).init(),
    }
}

/// Run the operator until a shutdown signal arrives
async fn run_controller(config: OperatorConfig) -> anyhow::Result<()> {
    tracing::info!("Starting eduk8s operator");
    tracing::info!(
        domain = %config.ingress_domain,
        registry = %config.image_registry,
        "configuration loaded"
    );

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    retry_with_backoff(&RetryConfig::default(), "install CRDs", || {
        ensure_crds_installed(&client)
    })
    .await
    .map_err(|e| anyhow::anyhow!("Failed to install CRDs: {}", e))?;

    let addr = config.allocation_addr;
    let ctx = Arc::new(Context::builder(client.clone()).config(config).build());
    let state = Arc::new(AllocationState::new(ctx.api.clone(), ctx.pool.clone()));

    tokio::select! {
        result = allocation::serve(addr, state) => {
            result.map_err(|e| anyhow::anyhow!("Allocation API stopped: {}", e))?;
        }
        _ = run_controllers(client, ctx) => {
            tracing::info!("Controllers stopped");
        }
    }

    tracing::info!("eduk8s operator shut down");
    Ok(())
}

/// Install or update the CRDs with server-side apply
async fn ensure_crds_installed(client: &Client) -> eduk8s::Result<()> {
    use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
    use kube::api::{Patch, PatchParams};

    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply("eduk8s-operator").force();

    for crd in [
        TrainingPortal::crd(),
        Workshop::crd(),
        WorkshopEnvironment::crd(),
        WorkshopSession::crd(),
    ] {
        let name = crd.metadata.name.clone().unwrap_or_default();
        tracing::info!(crd = %name, "Installing CRD");
        crds.patch(&name, &params, &Patch::Apply(&crd)).await?;
    }

    tracing::info!("All eduk8s CRDs installed/updated");
    Ok(())
}
