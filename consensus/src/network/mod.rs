// Networking layer
//
// The consensus core only needs a send primitive: `Transport::send` delivers
// one message to one process, best effort. This module provides:
// - the `Transport` trait and its error type
// - the JSON wire codec with validation of inbound payloads
// - `LocalNetwork`, an in-process transport with per-node mailboxes,
//   optional latency, drop rate and partitions

use crate::benor::types::{Message, NodeIndex};
use async_trait::async_trait;

pub mod codec;
pub mod local;
pub mod types;


pub use codec::CodecError;
pub use local::LocalNetwork;
pub use types::{NetworkConfig, NetworkStats};

/// Network error types
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("Failed to send message to node {target}: {reason}")]
    SendError { target: NodeIndex, reason: String },
    #[error("Peer not found: {0}")]
    PeerNotFound(NodeIndex),
    #[error("Message to node {0} dropped")]
    Dropped(NodeIndex),
    #[error("Network partition between {from} and {to}")]
    Partitioned { from: NodeIndex, to: NodeIndex },
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}

/// Result type for network operations
pub type NetworkResult<T> = Result<T, NetworkError>;

/// Best-effort point-to-point send primitive
///
/// Implementations must not retry and must not block on the receiver
/// processing the message.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, target: NodeIndex, message: Message) -> NetworkResult<()>;
}
