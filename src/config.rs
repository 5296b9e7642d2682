//! Node descriptor loading.
//!
//! Graph topology loading from a configuration source is an external
//! collaborator to the core algorithm (see `spec.md` §1); this module is the
//! concrete loader the CLI and cluster binaries use, kept deliberately thin.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Edge weight `0` collides with the "no candidate" signal in `Merge`'s wire
/// encoding; `255` is reserved in the original node descriptor format as a
/// wire delimiter. Both are forbidden.
pub const MIN_EDGE_WEIGHT: u8 = 1;
pub const MAX_EDGE_WEIGHT: u8 = 254;
pub const RESERVED_WEIGHT: u8 = 255;

/// One declared neighbour: where to reach it (`host:port`), and the weight
/// of the edge to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeighborEntry {
    pub id: u8,
    pub address: String,
    pub edge_weight: u8,
}

/// A node's own identity, its own listen address (`host:port`), and its
/// declared neighbours. Immutable after load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub id: u8,
    pub address: String,
    pub neighbours: Vec<NeighborEntry>,
}

impl NodeConfig {
    /// Loads and validates a single node descriptor from a YAML file.
    ///
    /// Validates what is locally checkable: edge weight ranges and neighbour
    /// id uniqueness. Cross-node symmetry is checked by [`crate::topology`],
    /// which needs every node's file at once.
    pub fn load(path: impl AsRef<Path>) -> Result<NodeConfig, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: NodeConfig =
            serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = std::collections::HashSet::new();
        for neighbour in &self.neighbours {
            if neighbour.edge_weight < MIN_EDGE_WEIGHT || neighbour.edge_weight == RESERVED_WEIGHT
            {
                return Err(ConfigError::InvalidWeight {
                    id: neighbour.id,
                    weight: neighbour.edge_weight,
                });
            }
            if !seen.insert(neighbour.id) {
                return Err(ConfigError::DuplicateNeighbour { id: neighbour.id });
            }
        }
        Ok(())
    }
}
