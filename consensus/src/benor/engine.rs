// Consensus Engine - runs one Ben-Or process against a transport
//
// The ConsensusEngine ties together:
// - Process (state machine behind a single mutation lock)
// - Transport (fire-and-forget broadcasts, issued outside the lock)
// - Liveness gate (round 1 waits for fleet readiness)
//
// It exposes the request/response surface of a process: health, message
// delivery, start, stop and state reads.

use super::coin::{Coin, RandomCoin};
use super::rules::ProtocolError;
use super::types::{Message, NodeIndex, ProcessState};
use super::{Process, ProcessStats};
use crate::config::{ConfigError, ConsensusConfig};
use crate::gate::{wait_for_readiness, FaultGate, NodeStatus, Readiness, ReadinessProbe};
use crate::network::{codec, CodecError, NetworkError, Transport};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Consensus engine errors
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Malformed message: {0}")]
    MalformedMessage(#[from] CodecError),

    #[error("Protocol invariant violated: {0}")]
    Protocol(#[from] ProtocolError),
}

impl EngineError {
    /// Errors caused by the sender rather than this process
    pub fn is_client_error(&self) -> bool {
        match self {
            EngineError::MalformedMessage(e) => e.is_client_error(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Snapshot of engine counters
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub process: ProcessStats,
    pub send_failures: u64,
}

/// Runs one process: state machine, transport and liveness gate
pub struct ConsensusEngine {
    node_id: NodeIndex,

    total_nodes: usize,

    gate: FaultGate,

    readiness_poll: Duration,

    /// State machine; held across insert, threshold check and rule
    process: Mutex<Process>,

    transport: Arc<dyn Transport>,

    readiness: Arc<dyn ReadinessProbe>,

    /// Raised by stop; interrupts the readiness wait and start broadcast
    shutdown: watch::Sender<bool>,

    send_failures: Arc<AtomicU64>,
}

impl ConsensusEngine {
    /// Create an engine with a thread-RNG coin
    pub fn new(
        config: ConsensusConfig,
        transport: Arc<dyn Transport>,
        readiness: Arc<dyn ReadinessProbe>,
    ) -> Result<Self> {
        Self::with_coin(config, transport, readiness, Box::new(RandomCoin))
    }

    /// Create an engine with an injected coin
    pub fn with_coin(
        config: ConsensusConfig,
        transport: Arc<dyn Transport>,
        readiness: Arc<dyn ReadinessProbe>,
        coin: Box<dyn Coin>,
    ) -> Result<Self> {
        config.validate()?;
        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            node_id: config.node_id,
            total_nodes: config.total_nodes,
            gate: FaultGate::new(config.is_faulty),
            readiness_poll: config.readiness_poll_interval(),
            process: Mutex::new(Process::new(&config, coin)),
            transport,
            readiness,
            shutdown,
            send_failures: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn node_id(&self) -> NodeIndex {
        self.node_id
    }

    /// Health query; independent of round and decision
    pub fn status(&self) -> NodeStatus {
        self.gate.health()
    }

    /// Current process state
    pub async fn state(&self) -> ProcessState {
        self.process.lock().await.state().clone()
    }

    pub async fn stats(&self) -> EngineStats {
        EngineStats {
            process: self.process.lock().await.stats().clone(),
            send_failures: self.send_failures.load(Ordering::Relaxed),
        }
    }

    /// Deliver an inbound message
    ///
    /// Messages reaching a faulty, killed or decided process are
    /// acknowledged and ignored.
    pub async fn deliver(&self, message: Message) -> Result<()> {
        let outbound = {
            let mut process = self.process.lock().await;
            process.on_message(message)
        };

        match outbound {
            Ok(Some(next)) => {
                self.broadcast(next);
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(e) => {
                error!("Node {} rejected {}: {}", self.node_id, message, e);
                Err(e.into())
            }
        }
    }

    /// Decode a JSON payload and deliver it
    pub async fn deliver_bytes(&self, payload: &[u8]) -> Result<()> {
        let message = codec::decode(payload).map_err(|e| {
            warn!("Node {} received malformed message: {}", self.node_id, e);
            e
        })?;
        self.deliver(message).await
    }

    /// Begin round 1
    ///
    /// A faulty process clears its opinion and returns. A correct process
    /// waits for fleet readiness, then sends its proposal to every process
    /// in turn, awaiting each send. Stop interrupts both waits.
    pub async fn start(&self) -> Result<()> {
        if self.gate.is_faulty() {
            self.process.lock().await.start();
            info!("Node {} is faulty, reporting no opinion", self.node_id);
            return Ok(());
        }

        let mut shutdown = self.shutdown.subscribe();
        if self.process.lock().await.state().killed {
            return Ok(());
        }

        if wait_for_readiness(self.readiness.as_ref(), self.readiness_poll, &mut shutdown).await
            == Readiness::Shutdown
        {
            info!("Node {} stopped before the fleet was ready", self.node_id);
            return Ok(());
        }

        let proposal = match self.process.lock().await.start() {
            Some(proposal) => proposal,
            None => return Ok(()),
        };

        for target in 0..self.total_nodes {
            tokio::select! {
                result = self.transport.send(target, proposal) => {
                    if let Err(e) = result {
                        self.record_send_failure(target, &proposal, &e);
                    }
                }
                _ = shutdown.changed() => {
                    info!("Node {} stopped during initial broadcast", self.node_id);
                    break;
                }
            }
        }
        Ok(())
    }

    /// Set the killed flag and interrupt pending waits
    pub async fn stop(&self) {
        self.process.lock().await.stop();
        self.shutdown.send_replace(true);
        info!("Node {} stopped", self.node_id);
    }

    /// Drain a mailbox, delivering each payload on its own task
    pub fn spawn_inbox(self: &Arc<Self>, mut inbox: mpsc::UnboundedReceiver<Vec<u8>>) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(payload) = inbox.recv().await {
                let engine = Arc::clone(&engine);
                tokio::spawn(async move {
                    if let Err(e) = engine.deliver_bytes(&payload).await {
                        debug!("Node {} delivery failed: {}", engine.node_id, e);
                    }
                });
            }
            debug!("Node {} inbox closed", engine.node_id);
        })
    }

    /// Send `message` to every process, including this one
    ///
    /// Each send runs on its own task; failures are logged and counted.
    fn broadcast(&self, message: Message) {
        debug!("Node {} broadcasting {}", self.node_id, message);
        for target in 0..self.total_nodes {
            let transport = Arc::clone(&self.transport);
            let failures = Arc::clone(&self.send_failures);
            let node_id = self.node_id;
            tokio::spawn(async move {
                if let Err(e) = transport.send(target, message).await {
                    failures.fetch_add(1, Ordering::Relaxed);
                    warn!("Node {} failed to send {} to node {}: {}", node_id, message, target, e);
                }
            });
        }
    }

    fn record_send_failure(&self, target: NodeIndex, message: &Message, error: &NetworkError) {
        self.send_failures.fetch_add(1, Ordering::Relaxed);
        warn!(
            "Node {} failed to send {} to node {}: {}",
            self.node_id, message, target, error
        );
    }
}
