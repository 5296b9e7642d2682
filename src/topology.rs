//! Offline, whole-graph validation used by tests and the cluster demo.
//!
//! A single node cannot check that its neighbours agree on edge weights, or
//! that the graph is connected — both require every node's descriptor at
//! once. This is the companion validator `spec.md` §4.2 leaves as an
//! external collaborator.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::config::NodeConfig;
use crate::error::TopologyError;

/// Loads every `*.yaml`/`*.yml` file in `dir` as a [`NodeConfig`] and
/// validates the whole set: symmetric weights, no dangling neighbour
/// references, and full connectivity.
pub fn load_dir(dir: impl AsRef<Path>) -> Result<Vec<NodeConfig>, TopologyError> {
    let mut configs = Vec::new();
    let mut entries: Vec<_> = std::fs::read_dir(dir.as_ref())
        .map_err(|source| TopologyError::Config(crate::error::ConfigError::Io {
            path: dir.as_ref().display().to_string(),
            source,
        }))?
        .filter_map(Result::ok)
        .collect();
    entries.sort_by_key(std::fs::DirEntry::path);

    for entry in entries {
        let path = entry.path();
        let is_yaml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e == "yaml" || e == "yml");
        if is_yaml {
            configs.push(NodeConfig::load(&path)?);
        }
    }

    validate(&configs)?;
    Ok(configs)
}

/// Validates an already-loaded set of node descriptors.
pub fn validate(configs: &[NodeConfig]) -> Result<(), TopologyError> {
    let by_id: HashMap<u8, &NodeConfig> = configs.iter().map(|c| (c.id, c)).collect();

    for config in configs {
        for neighbour in &config.neighbours {
            let Some(other) = by_id.get(&neighbour.id) else {
                return Err(TopologyError::DanglingNeighbour { from: config.id, to: neighbour.id });
            };
            let back_edge = other.neighbours.iter().find(|n| n.id == config.id);
            match back_edge {
                None => {
                    return Err(TopologyError::DanglingNeighbour { from: neighbour.id, to: config.id });
                }
                Some(back) if back.edge_weight != neighbour.edge_weight => {
                    return Err(TopologyError::AsymmetricWeight {
                        a: config.id,
                        b: neighbour.id,
                        weight_a: neighbour.edge_weight,
                        weight_b: back.edge_weight,
                    });
                }
                Some(_) => {}
            }
        }
    }

    let component_count = count_components(configs);
    if component_count != 1 {
        return Err(TopologyError::Disconnected { component_count });
    }
    Ok(())
}

fn count_components(configs: &[NodeConfig]) -> usize {
    let mut parent: HashMap<u8, u8> = configs.iter().map(|c| (c.id, c.id)).collect();

    fn find(parent: &mut HashMap<u8, u8>, x: u8) -> u8 {
        if parent[&x] != x {
            let root = find(parent, parent[&x]);
            parent.insert(x, root);
        }
        parent[&x]
    }

    for config in configs {
        for neighbour in &config.neighbours {
            if !parent.contains_key(&neighbour.id) {
                continue;
            }
            let ra = find(&mut parent, config.id);
            let rb = find(&mut parent, neighbour.id);
            if ra != rb {
                parent.insert(ra, rb);
            }
        }
    }

    let roots: HashSet<u8> = configs.iter().map(|c| find(&mut parent, c.id)).collect();
    roots.len()
}
