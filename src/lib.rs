pub mod config;
pub mod coordinator;
pub mod driver;
pub mod endpoint;
pub mod error;
pub mod message;
pub mod neighbor;
pub mod pacer;
pub mod state;
pub mod topology;

pub use config::{NeighborEntry, NodeConfig};
pub use coordinator::{PhaseCoordinator, RunOutcome};
pub use driver::{run_node, RunSummary};
pub use endpoint::MessageEndpoint;
pub use error::{ConfigError, NetError, TopologyError};
pub use message::{Command, Packet};
pub use neighbor::NeighborTable;
pub use pacer::{FixedPacer, Pacer};
pub use state::{CandidateEdge, NodeState};
