//! fragtree-node — runs a single node's phase coordinator to termination.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};

use fragtree::config::NodeConfig;
use fragtree::driver::run_node;
use fragtree::pacer::FixedPacer;

#[derive(Parser)]
#[command(name = "fragtree-node", version, about = "Run one fragtree node")]
struct Args {
    /// Path to this node's YAML descriptor.
    #[arg(short, long)]
    config: PathBuf,

    /// Upper bound on merge-loop phases before giving up.
    #[arg(long, default_value_t = 64)]
    max_phases: u32,

    /// How long to wait for an expected handshake before declaring a
    /// protocol failure.
    #[arg(long, default_value_t = 10)]
    handshake_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("fragtree=info".parse().unwrap()),
        )
        .init();

    let args = Args::parse();

    let config = match NodeConfig::load(&args.config) {
        Ok(config) => config,
        Err(err) => {
            error!(%err, "failed to load node config");
            return ExitCode::FAILURE;
        }
    };

    info!(node_id = config.id, address = %config.address, "starting node");

    let summary = match run_node(
        &config,
        FixedPacer::default(),
        Duration::from_secs(args.handshake_timeout_secs),
        args.max_phases,
    )
    .await
    {
        Ok(summary) => summary,
        Err(err) => {
            error!(%err, "failed to start node");
            return ExitCode::FAILURE;
        }
    };

    info!(
        node_id = summary.own_id,
        outcome = ?summary.outcome,
        is_root = summary.is_root,
        parent_id = summary.parent_id,
        phases_run = summary.phases_run,
        "run finished"
    );
    println!("node {}: children = {:?}", summary.own_id, summary.children);

    ExitCode::SUCCESS
}
