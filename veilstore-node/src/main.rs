//! Veilstore peer daemon entry point

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;
use veilstore_node::{Node, NodeConfig};

#[derive(Parser, Debug)]
#[command(name = "veilstore-node", about = "Veilstore peer daemon", version)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "veilstore.toml", env = "VEILSTORE_CONFIG")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = NodeConfig::load_or_default(&args.config);
    info!(peer_id = %config.node.peer_id, "generating keypair");

    let node = Node::new(config).context("failed to initialize node")?;
    let local_addr = node.start().await.context("failed to start listener")?;
    info!(%local_addr, peers = node.directory().len(), "node running, ctrl-c to stop");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutting down");
    node.shutdown().await;
    Ok(())
}
