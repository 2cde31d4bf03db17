//! Ben-Or Consensus
//!
//! Asynchronous randomized binary consensus for a fleet of `n` processes
//! tolerating up to `f` crash-faulty ones (3f < n):
//! - Two-phase rounds (PROPOSE, VOTE) with quorum n - f
//! - Decide on f + 1 matching votes, adopt on one, flip a coin otherwise
//! - Fault gate for processes that report no opinion
//! - Liveness gate holding round 1 until the fleet is ready
//! - In-process JSON transport with latency, loss and partitions

pub mod benor;
pub mod config;
pub mod gate;
pub mod network;

pub use benor::engine::{ConsensusEngine, EngineError, EngineStats};
pub use benor::types::{Message, NodeIndex, Phase, ProcessState, Round, Value};
pub use benor::{Process, ProcessStats};
pub use config::{ConfigError, ConsensusConfig};
pub use gate::{FleetReadiness, NodeStatus, ReadinessProbe};
pub use network::{LocalNetwork, NetworkConfig, NetworkError, Transport};
