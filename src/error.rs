//! Error taxonomy for config loading, topology validation, and the wire/network layer.

use thiserror::Error;

/// Fatal at node startup: the descriptor could not be read or does not
/// satisfy the constraints in the node's own neighbour list.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("neighbour {id} has forbidden edge weight {weight} (must be 1..=254)")]
    InvalidWeight { id: u8, weight: u8 },

    #[error("neighbour id {id} appears more than once in this node's neighbour list")]
    DuplicateNeighbour { id: u8 },
}

/// Raised only by the offline multi-file validator (tests and the
/// cluster demo binary); a single node cannot detect these on its own.
#[derive(Error, Debug)]
pub enum TopologyError {
    #[error("node {a} lists edge weight {weight_a} to {b}, but {b} lists weight {weight_b} back")]
    AsymmetricWeight { a: u8, b: u8, weight_a: u8, weight_b: u8 },

    #[error("node {from} references neighbour {to}, which has no config file")]
    DanglingNeighbour { from: u8, to: u8 },

    #[error("graph is disconnected: {component_count} components, expected 1")]
    Disconnected { component_count: usize },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Transient faults on the wire. These are logged and swallowed by the
/// coordinator; only the listener bind failure is ever propagated further.
#[derive(Error, Debug)]
pub enum NetError {
    #[error("failed to bind listener on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to connect to neighbour {id} at {addr}: {source}")]
    Connect {
        id: u8,
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write packet to neighbour {id}: {source}")]
    Write {
        id: u8,
        #[source]
        source: std::io::Error,
    },

    #[error("packet from {0} too short to contain a command and source byte")]
    ShortPacket(std::net::SocketAddr),
}
