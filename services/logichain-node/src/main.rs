use anyhow::{bail, Context};
use logichain_consensus::{ConsensusEngine, MaintenanceScheduler};
use logichain_core::{logging, ConsensusConfig};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

const NODE_PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Serialize)]
struct NodeVersionHandshake {
    version: &'static str,
    protocol_version: u32,
}

#[derive(Debug, Default)]
struct NodeArgs {
    config: Option<PathBuf>,
    node_id: Option<String>,
    json_logs: bool,
    version_json: bool,
}

fn parse_args(args: &[String]) -> anyhow::Result<NodeArgs> {
    let mut parsed = NodeArgs::default();
    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                let path = iter.next().context("--config was provided without a path")?;
                parsed.config = Some(PathBuf::from(path));
            }
            "--node-id" => {
                let id = iter.next().context("--node-id was provided without a value")?;
                parsed.node_id = Some(id.clone());
            }
            "--json-logs" => parsed.json_logs = true,
            "--version-json" => parsed.version_json = true,
            other => bail!("unknown argument: {}", other),
        }
    }
    Ok(parsed)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let args = parse_args(&args)?;

    if args.version_json {
        let handshake = NodeVersionHandshake {
            version: env!("CARGO_PKG_VERSION"),
            protocol_version: NODE_PROTOCOL_VERSION,
        };
        println!("{}", serde_json::to_string(&handshake)?);
        return Ok(());
    }

    if args.json_logs {
        logging::init_json();
    } else {
        logging::init();
    }

    let config = match &args.config {
        Some(path) => ConsensusConfig::from_toml_file(path)?,
        None => ConsensusConfig::default(),
    };
    let node_id = args
        .node_id
        .or_else(|| std::env::var("LOGICHAIN_NODE_ID").ok())
        .context("missing --node-id <id> (or LOGICHAIN_NODE_ID)")?;

    let maintenance = config.maintenance.clone();
    // No storage collaborator is attached here, so no block counts as
    // confirmed and offline transitions are refused.
    let confirmations = Arc::new(HashMap::<String, u64>::new());
    let engine = Arc::new(ConsensusEngine::new(node_id.clone(), Arc::new(config), confirmations)?);

    let shutdown = CancellationToken::new();
    let scheduler = MaintenanceScheduler::spawn(Arc::clone(&engine), maintenance, shutdown.child_token());

    info!(node_id = %node_id, "LogiChain node running");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;

    info!("Shutdown signal received");
    shutdown.cancel();
    scheduler.shutdown().await;
    info!("Node shutdown complete");
    Ok(())
}
