//! fragtree-cluster — spawns one in-process task per node descriptor in a
//! directory and reports the resulting spanning tree.
//!
//! Direct analogue of the original program's `main()`, which spawned one
//! goroutine per `./nodes/node-N.yaml` file and let them run to completion.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};

use fragtree::pacer::FixedPacer;
use fragtree::{driver, topology};

#[derive(Parser)]
#[command(name = "fragtree-cluster", version, about = "Run every node in a config directory")]
struct Args {
    /// Directory of per-node YAML descriptors.
    #[arg(short, long)]
    dir: PathBuf,

    /// Upper bound on merge-loop phases before giving up, per node.
    #[arg(long, default_value_t = 64)]
    max_phases: u32,

    /// Handshake timeout per node, in seconds.
    #[arg(long, default_value_t = 10)]
    handshake_timeout_secs: u64,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("fragtree=info".parse().unwrap()),
        )
        .init();

    let args = Args::parse();

    let configs = match topology::load_dir(&args.dir) {
        Ok(configs) => configs,
        Err(err) => {
            error!(%err, "failed to load topology");
            return;
        }
    };
    info!(node_count = configs.len(), "topology loaded and validated");

    let handshake_timeout = Duration::from_secs(args.handshake_timeout_secs);
    let max_phases = args.max_phases;

    let tasks: Vec<_> = configs
        .into_iter()
        .map(|config| {
            tokio::spawn(async move {
                driver::run_node(&config, FixedPacer::default(), handshake_timeout, max_phases).await
            })
        })
        .collect();

    for task in tasks {
        match task.await {
            Ok(Ok(summary)) => {
                println!(
                    "node {}: outcome={:?} parent={} children={:?} phases={}",
                    summary.own_id,
                    summary.outcome,
                    summary.parent_id,
                    summary.children,
                    summary.phases_run
                );
            }
            Ok(Err(err)) => error!(%err, "node failed to start"),
            Err(err) => error!(%err, "node task panicked"),
        }
    }
}
