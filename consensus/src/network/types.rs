// Network configuration, addressing and statistics

use crate::benor::types::NodeIndex;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Port of process 0; process i listens on `BASE_PORT + i`
pub const BASE_PORT: u16 = 3000;

/// Network configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Host every process is reachable on
    pub host: IpAddr,

    /// Port of process 0
    pub base_port: u16,

    /// Upper bound of the random delay added to each delivery (ms, 0 = none)
    pub max_latency_ms: u64,

    /// Probability that a message is dropped (0.0 - 1.0)
    pub drop_rate: f64,

    /// Seed for latency and drop sampling; random when unset
    pub seed: Option<u64>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            base_port: BASE_PORT,
            max_latency_ms: 0,
            drop_rate: 0.0,
            seed: None,
        }
    }
}

impl NetworkConfig {
    /// Address of process `index`: `host:(base_port + index)`
    ///
    /// `None` when the port would overflow.
    pub fn peer_address(&self, index: NodeIndex) -> Option<SocketAddr> {
        let port = usize::from(self.base_port).checked_add(index)?;
        let port = u16::try_from(port).ok()?;
        Some(SocketAddr::new(self.host, port))
    }

    pub fn max_latency(&self) -> Duration {
        Duration::from_millis(self.max_latency_ms)
    }
}

/// Delivery statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NetworkStats {
    /// Send attempts
    pub sent: u64,

    /// Payloads placed in a mailbox
    pub delivered: u64,

    /// Dropped by drop rate or partition
    pub dropped: u64,

    /// Unknown peer or closed mailbox
    pub failed: u64,
}
