// Fault and liveness gates
//
// The fault gate decides whether a process takes part in the protocol at
// all. The liveness gate holds back round 1 until the fleet reports ready,
// polling a readiness predicate until it holds or the process is stopped.

use crate::benor::types::{NodeIndex, ProcessState};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

/// Health signal reported by a process
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Live,
    Faulty,
}

impl NodeStatus {
    pub fn is_live(self) -> bool {
        self == NodeStatus::Live
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeStatus::Live => write!(f, "live"),
            NodeStatus::Faulty => write!(f, "faulty"),
        }
    }
}

/// Whether an inbound message may touch the state machine
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    Admit,
    Faulty,
    Killed,
    Decided,
}

/// Fault switch fixed at process creation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FaultGate {
    faulty: bool,
}

impl FaultGate {
    pub fn new(faulty: bool) -> Self {
        Self { faulty }
    }

    pub fn is_faulty(&self) -> bool {
        self.faulty
    }

    /// Health does not depend on round or decision state
    pub fn health(&self) -> NodeStatus {
        if self.faulty {
            NodeStatus::Faulty
        } else {
            NodeStatus::Live
        }
    }

    /// Check a process before it handles a message or takes a step
    pub fn admit(&self, state: &ProcessState) -> Admission {
        if self.faulty {
            Admission::Faulty
        } else if state.killed {
            Admission::Killed
        } else if state.is_decided() {
            Admission::Decided
        } else {
            Admission::Admit
        }
    }
}

/// Fleet readiness predicate polled before round 1
pub trait ReadinessProbe: Send + Sync {
    fn is_ready(&self) -> bool;
}

/// Probe that is always satisfied
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysReady;

impl ReadinessProbe for AlwaysReady {
    fn is_ready(&self) -> bool {
        true
    }
}

/// Readiness flags for a fleet of `n` processes
///
/// Each process marks itself ready once it can receive messages; the fleet
/// is ready when every flag is set.
#[derive(Debug)]
pub struct FleetReadiness {
    ready: Vec<AtomicBool>,
}

impl FleetReadiness {
    pub fn new(n: usize) -> Self {
        Self {
            ready: (0..n).map(|_| AtomicBool::new(false)).collect(),
        }
    }

    /// Returns false for an index outside the fleet
    pub fn mark_ready(&self, node: NodeIndex) -> bool {
        match self.ready.get(node) {
            Some(flag) => {
                flag.store(true, Ordering::Release);
                debug!("Node {} is ready", node);
                true
            }
            None => false,
        }
    }

    pub fn ready_count(&self) -> usize {
        self.ready
            .iter()
            .filter(|flag| flag.load(Ordering::Acquire))
            .count()
    }

    pub fn fleet_size(&self) -> usize {
        self.ready.len()
    }
}

impl ReadinessProbe for FleetReadiness {
    fn is_ready(&self) -> bool {
        self.ready_count() == self.ready.len()
    }
}

/// Result of waiting on the liveness gate
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    Shutdown,
}

/// Poll `probe` every `poll_interval` until it holds
///
/// Returns early with `Shutdown` once the shutdown flag is raised or its
/// sender is gone.
pub async fn wait_for_readiness(
    probe: &dyn ReadinessProbe,
    poll_interval: Duration,
    shutdown: &mut watch::Receiver<bool>,
) -> Readiness {
    loop {
        if *shutdown.borrow() {
            return Readiness::Shutdown;
        }
        if probe.is_ready() {
            return Readiness::Ready;
        }

        tokio::select! {
            _ = tokio::time::sleep(poll_interval) => {}
            changed = shutdown.changed() => {
                if changed.is_err() {
                    return Readiness::Shutdown;
                }
            }
        }
    }
}
