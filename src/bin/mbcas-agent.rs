//! Node agent entry point: one process per worker node, discovering its
//! own managed pods and driving the bidding/clearing pipeline on a fixed
//! tick (§4.5).

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;

use mbcas::agent::NodeAgentCycle;
use mbcas::config::ConfigLoader;
use mbcas::k8s::K8sClient;
use mbcas::logging::init_logging;
use mbcas::metrics::AgentMetrics;

#[derive(Parser)]
#[command(name = "mbcas-agent")]
#[command(version)]
#[command(about = "Market-based CPU allocation node agent")]
struct Cli {
    /// Path to an explicit configuration file; searches standard locations
    /// (./mbcas.yml, $XDG_CONFIG_HOME/mbcas/config.yml, /etc/mbcas) if unset.
    #[arg(short, long)]
    config: Option<String>,

    /// Name of the node this agent runs on. Defaults to the `NODE_NAME`
    /// environment variable, typically populated by the downward API.
    #[arg(long)]
    node_name: Option<String>,

    /// Root of the cgroup v2 filesystem, read-only.
    #[arg(long, default_value = "/sys/fs/cgroup")]
    cgroup_root: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::new(cli.config.as_deref())
        .load()
        .context("failed to load configuration")?;

    let _log_guard = init_logging(&config.logging, "agent")?;

    let node_name = cli
        .node_name
        .or_else(|| std::env::var("NODE_NAME").ok())
        .context("node name not provided: pass --node-name or set NODE_NAME")?;

    let client = K8sClient::new()
        .await
        .context("failed to build Kubernetes client")?;

    let metrics = AgentMetrics::new();
    let cycle = NodeAgentCycle::new(config, node_name.clone(), client, cli.cgroup_root, metrics);

    let cancellation = CancellationToken::new();
    let shutdown = cancellation.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received");
        shutdown.cancel();
    });

    tracing::info!(node = %node_name, "node agent starting");
    cycle.run(cancellation).await;
    tracing::info!("node agent exited cleanly");
    Ok(())
}
