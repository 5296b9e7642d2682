//! The outer run loop: binds a node's endpoint, drives its phase
//! coordinator to termination, and reports what it settled on.
//!
//! Kept separate from [`crate::coordinator`] so the CLI and cluster demo
//! share one entry point instead of each re-deriving the bind/run/summarize
//! sequence (`SPEC_FULL.md` §4.7).

use std::collections::HashSet;
use std::time::Duration;

use tracing::info_span;
use tracing::Instrument;

use crate::config::NodeConfig;
use crate::coordinator::{PhaseCoordinator, RunOutcome};
use crate::endpoint::MessageEndpoint;
use crate::error::NetError;
use crate::neighbor::NeighborTable;
use crate::pacer::Pacer;

/// What a node settled on by the time its run loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub own_id: u8,
    pub outcome: RunOutcome,
    pub is_root: bool,
    pub parent_id: u8,
    pub children: HashSet<u8>,
    pub phases_run: u32,
}

/// Binds `config`'s listen address, runs bootstrap and up to `max_phases`
/// merge-loop phases under `pacer`, and returns the final fragment state.
///
/// Only the listener bind can fail here; every other fault (lost sends,
/// timed-out handshakes) is folded into [`RunOutcome`] rather than
/// propagated, matching the coordinator's own error boundary.
pub async fn run_node<P: Pacer>(
    config: &NodeConfig,
    pacer: P,
    handshake_timeout: Duration,
    max_phases: u32,
) -> Result<RunSummary, NetError> {
    let span = info_span!("node", id = config.id);
    async move {
        let neighbors = NeighborTable::new(config);
        let endpoint = MessageEndpoint::bind(config.id, &config.address).await?;
        let mut coordinator =
            PhaseCoordinator::new(config.id, neighbors, endpoint, pacer, handshake_timeout);

        let (outcome, phases_run) = coordinator.run(max_phases).await;
        let state = coordinator.state();
        Ok(RunSummary {
            own_id: config.id,
            outcome,
            is_root: state.is_root,
            parent_id: state.parent_id,
            children: state.children.clone(),
            phases_run,
        })
    }
    .instrument(span)
    .await
}
