//! Cluster actuator entry point: a single cluster-wide process reconciling
//! every `PodAllocation` record's desired CPU limit into a live in-place
//! container resize (§4.6).

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;

use mbcas::actuator::ClusterActuator;
use mbcas::config::ConfigLoader;
use mbcas::k8s::K8sClient;
use mbcas::logging::init_logging;
use mbcas::metrics::ActuatorMetrics;

#[derive(Parser)]
#[command(name = "mbcas-actuator")]
#[command(version)]
#[command(about = "Market-based CPU allocation cluster actuator")]
struct Cli {
    /// Path to an explicit configuration file; searches standard locations
    /// if unset.
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::new(cli.config.as_deref())
        .load()
        .context("failed to load configuration")?;

    let _log_guard = init_logging(&config.logging, "actuator")?;

    let client = K8sClient::new()
        .await
        .context("failed to build Kubernetes client")?;

    // Fail closed: refuse to start if the platform does not serve the
    // in-place resize subresource this whole component depends on.
    client
        .detect_resize_subresource()
        .await
        .context("platform does not support in-place pod resize")?;

    let metrics = ActuatorMetrics::new();
    let actuator = ClusterActuator::new(client, config, metrics);

    let cancellation = CancellationToken::new();
    let shutdown = cancellation.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received");
        shutdown.cancel();
    });

    tracing::info!("cluster actuator starting");
    actuator.run(cancellation).await;
    tracing::info!("cluster actuator exited cleanly");
    Ok(())
}
