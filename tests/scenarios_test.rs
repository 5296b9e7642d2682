//! End-to-end scenarios over real TCP loopback connections, one Tokio task
//! per node, using `FastPacer` so a whole run takes well under a second.

use std::collections::HashSet;
use std::time::Duration;

use fragtree::config::{NeighborEntry, NodeConfig};
use fragtree::driver::{run_node, RunSummary};
use fragtree::pacer::FastPacer;
use fragtree::RunOutcome;

fn addr(port: u16) -> String {
    format!("127.0.0.1:{port}")
}

fn node(id: u8, port: u16, neighbours: Vec<(u8, u16, u8)>) -> NodeConfig {
    NodeConfig {
        id,
        address: addr(port),
        neighbours: neighbours
            .into_iter()
            .map(|(nid, nport, weight)| NeighborEntry {
                id: nid,
                address: addr(nport),
                edge_weight: weight,
            })
            .collect(),
    }
}

async fn run_all(configs: Vec<NodeConfig>, max_phases: u32) -> Vec<RunSummary> {
    let mut set = tokio::task::JoinSet::new();
    for config in configs {
        set.spawn(async move {
            run_node(&config, FastPacer::new(200), Duration::from_millis(300), max_phases)
                .await
                .expect("node starts")
        });
    }
    let mut summaries = Vec::new();
    while let Some(result) = set.join_next().await {
        summaries.push(result.expect("task does not panic"));
    }
    summaries.sort_by_key(|s| s.own_id);
    summaries
}

fn find(summaries: &[RunSummary], id: u8) -> &RunSummary {
    summaries.iter().find(|s| s.own_id == id).expect("node present in results")
}

/// Two nodes, one edge. The larger id becomes root; one merge phase finds no
/// further outgoing edge and both sides terminate immediately.
#[tokio::test]
async fn scenario_a_mutual_lowest_weight_pair() {
    let configs = vec![
        node(1, 47001, vec![(2, 47002, 5)]),
        node(2, 47002, vec![(1, 47001, 5)]),
    ];
    let summaries = run_all(configs, 10).await;

    let one = find(&summaries, 1);
    let two = find(&summaries, 2);
    assert_eq!(one.outcome, RunOutcome::Converged);
    assert_eq!(two.outcome, RunOutcome::Converged);
    assert!(!one.is_root);
    assert_eq!(one.parent_id, 2);
    assert!(two.is_root);
    assert_eq!(two.children, HashSet::from([1]));
}

/// Triangle 1-2-3 with edges (1,2)=1, (2,3)=2, (1,3)=3. {1,2} bootstraps into
/// one fragment rooted at 2; 3 starts as its own singleton; one merge phase
/// joins them over the globally minimal outgoing edge (2,3).
#[tokio::test]
async fn scenario_b_triangle_distinct_weights() {
    let configs = vec![
        node(1, 47011, vec![(2, 47012, 1), (3, 47013, 3)]),
        node(2, 47012, vec![(1, 47011, 1), (3, 47013, 2)]),
        node(3, 47013, vec![(2, 47012, 2), (1, 47011, 3)]),
    ];
    let summaries = run_all(configs, 10).await;

    for s in &summaries {
        assert_eq!(s.outcome, RunOutcome::Converged, "node {} did not converge", s.own_id);
    }
    let root = find(&summaries, 2);
    assert!(root.is_root);
    assert_eq!(root.children, HashSet::from([1, 3]));
    assert_eq!(find(&summaries, 1).parent_id, 2);
    assert_eq!(find(&summaries, 3).parent_id, 2);
}

/// Path 1-2-3-4 with weights (1,2)=1, (2,3)=2, (3,4)=3. Bootstrap pairs
/// 1<->2; 3 and 4 start as singletons (3's lowest is 2, not reciprocated;
/// 4's lowest is 3, not reciprocated). The fragment grows one edge per
/// phase until the whole path is one tree rooted at 2.
#[tokio::test]
async fn scenario_c_path_topology() {
    let configs = vec![
        node(1, 47021, vec![(2, 47022, 1)]),
        node(2, 47022, vec![(1, 47021, 1), (3, 47023, 2)]),
        node(3, 47023, vec![(2, 47022, 2), (4, 47024, 3)]),
        node(4, 47024, vec![(3, 47023, 3)]),
    ];
    let summaries = run_all(configs, 10).await;

    for s in &summaries {
        assert_eq!(s.outcome, RunOutcome::Converged, "node {} did not converge", s.own_id);
    }
    let root = find(&summaries, 2);
    assert!(root.is_root);
    assert!(root.children.contains(&1));
    assert!(root.children.contains(&3));
    assert_eq!(find(&summaries, 1).parent_id, 2);
    assert_eq!(find(&summaries, 4).parent_id, 3);
}

/// Symmetric 4-cycle, all outgoing-edge candidates tied at weight 2 across
/// two distinct physical edges: {1,2} independently settles on edge (2,3)
/// while {3,4} independently settles on edge (4,1). Neither rendezvous
/// completes, so the two nodes in charge of executing the handshake
/// (2 and 4) time out — the protocol's documented behavior for a hand-shake
/// that never arrives, not a bug in this test (weighted-edge tie-breaking
/// beyond the local per-candidate rule is an explicit non-goal).
#[tokio::test]
async fn scenario_d_symmetric_cycle_tie_reports_protocol_failure() {
    let configs = vec![
        node(1, 47031, vec![(2, 47032, 1), (4, 47034, 2)]),
        node(2, 47032, vec![(1, 47031, 1), (3, 47033, 2)]),
        node(3, 47033, vec![(2, 47032, 2), (4, 47034, 1)]),
        node(4, 47034, vec![(3, 47033, 1), (1, 47031, 2)]),
    ];
    let summaries = run_all(configs, 10).await;

    // 2 and 4 are each the node in charge of their fragment's (different)
    // chosen edge, so they are the ones that block on a Connect nobody
    // sends; 1 and 3 depend on them for every subsequent NewFragment and
    // so fail in turn once their root stops responding.
    for s in &summaries {
        assert!(
            matches!(s.outcome, RunOutcome::ProtocolFailure(_)),
            "node {} expected a bounded protocol failure, got {:?}",
            s.own_id,
            s.outcome
        );
    }
}

/// A node with zero declared neighbours bootstraps straight to root and
/// converges in its very first phase.
#[tokio::test]
async fn scenario_e_single_node_converges_immediately() {
    let configs = vec![node(1, 47041, vec![])];
    let summaries = run_all(configs, 10).await;

    let only = find(&summaries, 1);
    assert_eq!(only.outcome, RunOutcome::Converged);
    assert!(only.is_root);
    assert!(only.children.is_empty());
    assert_eq!(only.phases_run, 1);
}

/// Node 2 (the fragment's root) declares a neighbour (id 9) whose process
/// never comes up — the runtime analogue of a disconnected or misconfigured
/// deployment that `topology::validate` would normally catch ahead of time.
/// Node 2's P4 gather never sees that neighbour's `Accept`/`Reject` and
/// times out, so it never broadcasts `Merge`; node 1, blocked waiting on
/// that `Merge` from its parent, times out in turn. Both report
/// `ProtocolFailure` rather than hanging (`spec.md` §4.3 failure
/// semantics): a single unreachable neighbour of the root stalls the whole
/// fragment, since every other node in it is ultimately blocked on the
/// root's decision.
#[tokio::test]
async fn scenario_f_unreachable_neighbour_reports_protocol_failure() {
    let configs = vec![
        node(1, 47051, vec![(2, 47052, 1)]),
        node(2, 47052, vec![(1, 47051, 1), (9, 47059, 5)]),
    ];
    let summaries = run_all(configs, 5).await;

    for s in &summaries {
        assert!(
            matches!(s.outcome, RunOutcome::ProtocolFailure(_)),
            "node {} expected a bounded protocol failure, got {:?}",
            s.own_id,
            s.outcome
        );
    }
}
