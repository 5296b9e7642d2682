//! Immutable-after-load directory of a node's declared neighbours.

use std::collections::HashMap;

use crate::config::{NeighborEntry, NodeConfig};

/// Looks up neighbours by id, and finds the lowest-weight one. Built once
/// from a loaded [`NodeConfig`] and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct NeighborTable {
    by_id: HashMap<u8, NeighborEntry>,
    ids_in_order: Vec<u8>,
}

impl NeighborTable {
    pub fn new(config: &NodeConfig) -> Self {
        let mut by_id = HashMap::with_capacity(config.neighbours.len());
        let mut ids_in_order = Vec::with_capacity(config.neighbours.len());
        for entry in &config.neighbours {
            ids_in_order.push(entry.id);
            by_id.insert(entry.id, entry.clone());
        }
        Self { by_id, ids_in_order }
    }

    /// The neighbour with the smallest edge weight; ties broken by smaller id.
    /// `None` only for a neighbourless (single-node) configuration.
    pub fn lowest_weight(&self) -> Option<&NeighborEntry> {
        self.ids_in_order
            .iter()
            .map(|id| &self.by_id[id])
            .min_by_key(|n| (n.edge_weight, n.id))
    }

    pub fn lookup(&self, id: u8) -> Option<&NeighborEntry> {
        self.by_id.get(&id)
    }

    pub fn contains(&self, id: u8) -> bool {
        self.by_id.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Ids in declared order (order is irrelevant to semantics, but stable
    /// iteration makes logs and tests reproducible).
    pub fn ids(&self) -> impl Iterator<Item = u8> + '_ {
        self.ids_in_order.iter().copied()
    }

    pub fn weight_to(&self, id: u8) -> Option<u8> {
        self.lookup(id).map(|n| n.edge_weight)
    }
}
