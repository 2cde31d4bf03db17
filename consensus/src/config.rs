// Process configuration
//
// Everything a single process needs to know at creation: its index, the
// fleet size and fault bound, its input value and whether it is faulty.

use crate::benor::buffers::DuplicatePolicy;
use crate::benor::rules::Thresholds;
use crate::benor::types::{NodeIndex, Value};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Fleet must contain at least one process")]
    EmptyFleet,

    #[error("Node id {node_id} outside fleet of {total_nodes}")]
    NodeOutOfRange { node_id: NodeIndex, total_nodes: usize },

    #[error("Too many faults: n={total_nodes} tolerates fewer than n/3, got f={max_faulty}")]
    TooManyFaults { total_nodes: usize, max_faulty: usize },

    #[error("Readiness poll interval must be at least 1 ms")]
    ZeroReadinessPoll,

    #[error("Initial value must be 0 or 1, got {0}")]
    InvalidInitialValue(Value),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Configuration of one consensus process
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    /// Index of this process in the fleet
    pub node_id: NodeIndex,

    /// Total number of processes (n)
    pub total_nodes: usize,

    /// Maximum number of faulty processes tolerated (f)
    pub max_faulty: usize,

    /// Input value proposed in round 1
    pub initial_value: Value,

    /// Faulty processes never send and never change state
    pub is_faulty: bool,

    /// How often the liveness gate polls fleet readiness (ms)
    pub readiness_poll_ms: u64,

    /// Counting of repeated messages from one sender
    pub duplicate_policy: DuplicatePolicy,

    /// Drop buffers of rounds before the decided round once decided
    pub prune_on_decide: bool,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            node_id: 0,
            total_nodes: 4,
            max_faulty: 1,
            initial_value: Value::One,
            is_faulty: false,
            readiness_poll_ms: 10,
            duplicate_policy: DuplicatePolicy::CountAll,
            prune_on_decide: true,
        }
    }
}

impl ConsensusConfig {
    pub fn new(node_id: NodeIndex, total_nodes: usize, max_faulty: usize, initial_value: Value) -> Self {
        Self {
            node_id,
            total_nodes,
            max_faulty,
            initial_value,
            ..Self::default()
        }
    }

    pub fn faulty(mut self, is_faulty: bool) -> Self {
        self.is_faulty = is_faulty;
        self
    }

    pub fn with_duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicate_policy = policy;
        self
    }

    pub fn with_readiness_poll(mut self, interval: Duration) -> Self {
        self.readiness_poll_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Parse a JSON configuration and validate it
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn readiness_poll_interval(&self) -> Duration {
        Duration::from_millis(self.readiness_poll_ms)
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds::new(self.total_nodes, self.max_faulty)
    }

    /// Enforce n >= 1, node_id < n, 3f < n, a non-zero poll interval and a
    /// binary input
    pub fn validate(&self) -> Result<()> {
        if self.total_nodes == 0 {
            return Err(ConfigError::EmptyFleet);
        }
        if self.node_id >= self.total_nodes {
            return Err(ConfigError::NodeOutOfRange {
                node_id: self.node_id,
                total_nodes: self.total_nodes,
            });
        }
        if self
            .max_faulty
            .checked_mul(3)
            .map_or(true, |bound| bound >= self.total_nodes)
        {
            return Err(ConfigError::TooManyFaults {
                total_nodes: self.total_nodes,
                max_faulty: self.max_faulty,
            });
        }
        if self.readiness_poll_ms == 0 {
            return Err(ConfigError::ZeroReadinessPoll);
        }
        if !self.initial_value.is_known() {
            return Err(ConfigError::InvalidInitialValue(self.initial_value));
        }
        Ok(())
    }
}
