// In-process transport
//
// Every registered process owns an unbounded mailbox of encoded payloads.
// Sends can be delayed by a random latency, dropped at a configured rate, or
// blocked by directional partitions. Delivery order across concurrent sends
// is not preserved.

use super::codec;
use super::types::{NetworkConfig, NetworkStats};
use super::{NetworkError, NetworkResult, Transport};
use crate::benor::types::{Message, NodeIndex};
use async_trait::async_trait;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};

/// Receiving end of a process mailbox
pub type Inbox = mpsc::UnboundedReceiver<Vec<u8>>;

/// In-memory network connecting processes of one fleet
pub struct LocalNetwork {
    config: NetworkConfig,

    /// Mailbox senders by process index
    mailboxes: RwLock<HashMap<NodeIndex, mpsc::UnboundedSender<Vec<u8>>>>,

    /// Blocked (from, to) pairs
    partitions: RwLock<HashSet<(NodeIndex, NodeIndex)>>,

    /// Latency and drop sampling
    rng: Mutex<ChaCha8Rng>,

    stats: RwLock<NetworkStats>,
}

impl LocalNetwork {
    pub fn new(config: NetworkConfig) -> Self {
        let seed = config.seed.unwrap_or_else(rand::random);
        Self {
            config,
            mailboxes: RwLock::new(HashMap::new()),
            partitions: RwLock::new(HashSet::new()),
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
            stats: RwLock::new(NetworkStats::default()),
        }
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    /// Create the mailbox of process `node`, replacing any previous one
    pub async fn register(&self, node: NodeIndex) -> Inbox {
        let (tx, rx) = mpsc::unbounded_channel();
        self.mailboxes.write().await.insert(node, tx);
        match self.config.peer_address(node) {
            Some(addr) => info!("Node {} registered at {}", node, addr),
            None => info!("Node {} registered", node),
        }
        rx
    }

    /// Remove the mailbox of process `node`; later sends fail
    pub async fn unregister(&self, node: NodeIndex) {
        self.mailboxes.write().await.remove(&node);
    }

    /// Block messages from `from` to `to`
    pub async fn partition(&self, from: NodeIndex, to: NodeIndex) {
        self.partitions.write().await.insert((from, to));
    }

    /// Block messages in both directions between `a` and `b`
    pub async fn partition_bidirectional(&self, a: NodeIndex, b: NodeIndex) {
        let mut partitions = self.partitions.write().await;
        partitions.insert((a, b));
        partitions.insert((b, a));
    }

    /// Cut `node` off from every other registered process
    pub async fn isolate(&self, node: NodeIndex) {
        let peers: Vec<NodeIndex> = self.mailboxes.read().await.keys().copied().collect();
        let mut partitions = self.partitions.write().await;
        for peer in peers.into_iter().filter(|&peer| peer != node) {
            partitions.insert((node, peer));
            partitions.insert((peer, node));
        }
    }

    /// Restore full connectivity
    pub async fn heal_all(&self) {
        self.partitions.write().await.clear();
    }

    pub async fn is_partitioned(&self, from: NodeIndex, to: NodeIndex) -> bool {
        self.partitions.read().await.contains(&(from, to))
    }

    pub async fn stats(&self) -> NetworkStats {
        self.stats.read().await.clone()
    }

    fn should_drop(&self) -> bool {
        if self.config.drop_rate <= 0.0 {
            return false;
        }
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        rng.gen_bool(self.config.drop_rate.min(1.0))
    }

    fn sample_latency(&self) -> Option<Duration> {
        if self.config.max_latency_ms == 0 {
            return None;
        }
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Some(Duration::from_millis(rng.gen_range(0..=self.config.max_latency_ms)))
    }
}

#[async_trait]
impl Transport for LocalNetwork {
    async fn send(&self, target: NodeIndex, message: Message) -> NetworkResult<()> {
        self.stats.write().await.sent += 1;

        if let Some(from) = message.sender {
            if self.is_partitioned(from, target).await {
                self.stats.write().await.dropped += 1;
                return Err(NetworkError::Partitioned { from, to: target });
            }
        }

        if self.should_drop() {
            self.stats.write().await.dropped += 1;
            debug!("Dropping {} to node {}", message, target);
            return Err(NetworkError::Dropped(target));
        }

        let payload = codec::encode(&message)?;

        if let Some(latency) = self.sample_latency() {
            tokio::time::sleep(latency).await;
        }

        let result = match self.mailboxes.read().await.get(&target) {
            Some(mailbox) => mailbox.send(payload).map_err(|_| NetworkError::SendError {
                target,
                reason: "mailbox closed".to_string(),
            }),
            None => Err(NetworkError::PeerNotFound(target)),
        };

        let mut stats = self.stats.write().await;
        match result {
            Ok(()) => stats.delivered += 1,
            Err(_) => stats.failed += 1,
        }
        result
    }
}
