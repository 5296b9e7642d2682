//! The phase coordinator: bootstrap plus the P1-P7 merge loop that grows a
//! node's fragment toward the network's minimum spanning tree.
//!
//! This is the direct generalization of the original node's per-connection
//! packet loop (`spec.md` §2, §4.3) onto the typed [`Command`]/[`Packet`]
//! wire format and the per-command buffer in [`crate::endpoint`].

use std::collections::HashSet;
use std::time::Duration;

use tracing::{info, trace, warn};

use crate::endpoint::MessageEndpoint;
use crate::message::{Command, Packet};
use crate::neighbor::NeighborTable;
use crate::pacer::Pacer;
use crate::state::{sort_candidates, CandidateEdge, NodeState};

/// Pause between a phase's sub-steps, giving peers time to act on one
/// broadcast before the next send goes out (`spec.md` §4.3's "Sleep D").
const SUB_STEP_DELAY: Duration = Duration::from_millis(1000);

/// How the per-node run loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// This node's fragment found no further outgoing edge: its view of the
    /// spanning forest is final.
    Converged,
    /// `max_phases` elapsed without converging (used to bound watchdog tests
    /// against graphs this node can never fully see, e.g. a disconnected
    /// component with an unlucky tie).
    PhaseBudgetExhausted,
    /// A handshake that the protocol expects never arrived. The algorithm
    /// is not designed to recover from a permanently lost handshake
    /// (`spec.md` §5); this surfaces it rather than hanging.
    ProtocolFailure(String),
}

fn encode_candidate(c: CandidateEdge) -> Vec<u8> {
    vec![c.via_id, c.neighbor_id, c.edge_weight]
}

fn decode_candidate(data: &[u8]) -> Option<CandidateEdge> {
    if data.len() < 3 {
        None
    } else {
        Some(CandidateEdge::new(data[0], data[1], data[2]))
    }
}

fn best_of(candidates: impl IntoIterator<Item = CandidateEdge>) -> Option<CandidateEdge> {
    let mut all: Vec<CandidateEdge> = candidates.into_iter().collect();
    sort_candidates(&mut all);
    all.into_iter().next()
}

pub struct PhaseCoordinator<P: Pacer> {
    neighbors: NeighborTable,
    endpoint: MessageEndpoint,
    pacer: P,
    handshake_timeout: Duration,
    state: NodeState,
}

impl<P: Pacer> PhaseCoordinator<P> {
    pub fn new(
        own_id: u8,
        neighbors: NeighborTable,
        endpoint: MessageEndpoint,
        pacer: P,
        handshake_timeout: Duration,
    ) -> Self {
        Self {
            neighbors,
            endpoint,
            pacer,
            handshake_timeout,
            state: NodeState::initial(own_id),
        }
    }

    pub fn state(&self) -> &NodeState {
        &self.state
    }

    /// Runs bootstrap, then the merge loop, for up to `max_phases` rounds.
    /// Returns the outcome alongside the number of merge-loop phases run
    /// (bootstrap itself is not counted).
    pub async fn run(&mut self, max_phases: u32) -> (RunOutcome, u32) {
        self.bootstrap().await;
        info!(
            node_id = self.state.own_id,
            is_root = self.state.is_root,
            parent_id = self.state.parent_id,
            "bootstrap complete"
        );

        for phase in 0..max_phases {
            match self.run_phase().await {
                Ok(true) => {
                    info!(node_id = self.state.own_id, phase, "converged");
                    return (RunOutcome::Converged, phase + 1);
                }
                Ok(false) => {
                    trace!(node_id = self.state.own_id, phase, "phase complete, continuing");
                }
                Err(reason) => {
                    warn!(node_id = self.state.own_id, phase, %reason, "protocol failure");
                    return (RunOutcome::ProtocolFailure(reason), phase + 1);
                }
            }
        }
        (RunOutcome::PhaseBudgetExhausted, max_phases)
    }

    /// Determines this node's initial fragment membership.
    ///
    /// Two neighbours who mutually pick each other as lowest-weight form an
    /// initial 2-node fragment; the larger id becomes its root. A node whose
    /// pick is not reciprocated stays non-root and waits in P1 for a
    /// `NewFragment` from whoever adopted it — it may itself be in another
    /// node's `connected` set (and so already be that node's child) without
    /// knowing it yet. Only a node with no neighbours at all (scenario E) has
    /// no one who could ever adopt it, so it elects itself root immediately
    /// rather than blocking forever.
    async fn bootstrap(&mut self) {
        self.pacer.next_phase().await;

        let lowest = self.neighbors.lowest_weight().cloned();
        if let Some(l) = &lowest {
            self.endpoint
                .send(
                    l.id,
                    &l.address,
                    Packet::new(Command::Connect, self.state.own_id, vec![self.state.own_id]),
                )
                .await;
        }

        self.pacer.next_phase().await;
        let inbound = self.endpoint.drain().await;
        let connected: HashSet<u8> = inbound
            .iter()
            .filter(|p| p.cmd == Command::Connect)
            .map(|p| p.src)
            .collect();
        self.endpoint.reset().await;

        let mutual = lowest.as_ref().is_some_and(|l| connected.contains(&l.id));
        let is_root = match &lowest {
            Some(l) if mutual => self.state.own_id > l.id,
            Some(_) => false,
            None => true,
        };

        self.state.is_root = is_root;
        self.state.children = connected;
        self.state.parent_id = if is_root {
            self.state.own_id
        } else {
            lowest.expect("non-root bootstrap outcome implies a mutual lowest-weight neighbour").id
        };
        self.state.fragment_id = self.state.own_id;
    }

    async fn wait_for(&self, cmd: Command, n: usize, what: &str) -> Result<Vec<Packet>, String> {
        tokio::time::timeout(self.handshake_timeout, self.endpoint.receive_filtered(cmd, n))
            .await
            .map_err(|_| format!("node {}: timed out waiting for {what}", self.state.own_id))
    }

    async fn wait_for_multi(
        &self,
        cmds: &[Command],
        n: usize,
        what: &str,
    ) -> Result<Vec<Packet>, String> {
        tokio::time::timeout(self.handshake_timeout, self.endpoint.receive_filtered_multi(cmds, n))
            .await
            .map_err(|_| format!("node {}: timed out waiting for {what}", self.state.own_id))
    }

    async fn broadcast_to_children(&self, cmd: Command, data: Vec<u8>) {
        for child_id in self.state.children.clone() {
            if let Some(n) = self.neighbors.lookup(child_id) {
                self.endpoint
                    .send(child_id, &n.address, Packet::new(cmd, self.state.own_id, data.clone()))
                    .await;
            }
        }
    }

    /// One full P1-P7 round. Returns `Ok(true)` if this node has converged.
    async fn run_phase(&mut self) -> Result<bool, String> {
        // P1: fragment identity propagates from root to the rest of the tree,
        // then every node (root or not) relays it on to its own children.
        if self.state.is_root {
            self.state.fragment_id = self.state.own_id;
        } else {
            let packets = self.wait_for(Command::NewFragment, 1, "NewFragment from parent").await?;
            let packet = &packets[0];
            self.state.fragment_id = packet.data[0];
            self.state.parent_id = packet.src;
            self.state.children.remove(&packet.src);
        }
        self.broadcast_to_children(Command::NewFragment, vec![self.state.fragment_id]).await;
        self.pacer.within_phase(SUB_STEP_DELAY).await;

        // P2: probe every neighbour, in-tree or not, for fragment membership.
        for id in self.neighbors.ids().collect::<Vec<_>>() {
            let neighbor = self.neighbors.lookup(id).expect("declared neighbour");
            self.endpoint
                .send(
                    id,
                    &neighbor.address,
                    Packet::new(Command::Test, self.state.own_id, vec![self.state.fragment_id]),
                )
                .await;
        }
        self.pacer.within_phase(SUB_STEP_DELAY).await;

        // P3: answer every Test addressed to this node.
        let neighbor_count = self.neighbors.len();
        let tests = self.wait_for(Command::Test, neighbor_count, "Test from every neighbour").await?;
        for test in &tests {
            let neighbor = self.neighbors.lookup(test.src).expect("Test from a declared neighbour");
            let same_fragment = test.data.first() == Some(&self.state.fragment_id);
            let reply_cmd = if same_fragment { Command::Reject } else { Command::Accept };
            self.endpoint
                .send(test.src, &neighbor.address, Packet::new(reply_cmd, self.state.own_id, vec![]))
                .await;
        }
        self.pacer.within_phase(SUB_STEP_DELAY).await;

        // P4: this node's own best outgoing candidate, from its direct Accepts.
        let replies = self
            .wait_for_multi(&[Command::Accept, Command::Reject], neighbor_count, "Test replies")
            .await?;
        let own_candidate = best_of(replies.into_iter().filter(|r| r.cmd == Command::Accept).map(|r| {
            let weight = self.neighbors.weight_to(r.src).expect("Accept from a declared neighbour");
            CandidateEdge::new(self.state.own_id, r.src, weight)
        }));
        self.pacer.within_phase(SUB_STEP_DELAY).await;

        // P5: convergecast the best candidate from the whole subtree upward.
        let mut candidates: Vec<CandidateEdge> = own_candidate.into_iter().collect();
        if !self.state.children.is_empty() {
            let reports = self
                .wait_for(Command::Report, self.state.children.len(), "Report from every child")
                .await?;
            candidates.extend(reports.iter().filter_map(|r| decode_candidate(&r.data)));
        }
        let best = best_of(candidates);

        // P6: root decides; everyone else reports up and waits for the
        // decision, then every node relays it on to its own children.
        let merge = if self.state.is_root {
            best
        } else {
            let parent = self.neighbors.lookup(self.state.parent_id).expect("parent is a neighbour").clone();
            self.endpoint
                .send(
                    self.state.parent_id,
                    &parent.address,
                    Packet::new(Command::Report, self.state.own_id, best.map(encode_candidate).unwrap_or_default()),
                )
                .await;
            let packets = self.wait_for(Command::Merge, 1, "Merge from parent").await?;
            decode_candidate(&packets[0].data)
        };
        self.broadcast_to_children(Command::Merge, merge.map(encode_candidate).unwrap_or_default()).await;
        self.pacer.within_phase(SUB_STEP_DELAY).await;

        let converged = self.apply_merge(merge).await?;
        self.endpoint.reset().await;
        Ok(converged)
    }

    /// P7: every node reacts to the same merge decision independently.
    async fn apply_merge(&mut self, merge: Option<CandidateEdge>) -> Result<bool, String> {
        let Some(candidate) = merge else {
            return Ok(true);
        };

        self.state.is_root = false;
        if candidate.via_id != self.state.own_id {
            // Not the endpoint in charge of this edge; my place in the
            // fragment's internal tree is unaffected.
            return Ok(false);
        }

        let target = self
            .neighbors
            .lookup(candidate.neighbor_id)
            .expect("merge candidate names a declared neighbour")
            .clone();
        self.endpoint
            .send(
                target.id,
                &target.address,
                Packet::new(Command::Connect, self.state.own_id, vec![self.state.own_id]),
            )
            .await;

        let peer = tokio::time::timeout(
            self.handshake_timeout,
            self.endpoint.receive_filtered(Command::Connect, 1),
        )
        .await
        .map_err(|_| {
            format!(
                "node {}: merge handshake with {} never arrived",
                self.state.own_id, target.id
            )
        })?
        .remove(0);
        let become_root = self.state.own_id < peer.src;

        if become_root {
            self.state.children.insert(target.id);
            self.state.children.insert(self.state.parent_id);
            self.state.parent_id = self.state.own_id;
            self.state.is_root = true;
        } else {
            self.state.parent_id = target.id;
        }
        Ok(false)
    }
}
