// Round buffer store
//
// Keeps the proposal and vote sequences received for every round, in an
// ordered map keyed by round number. Sequences are created on first insert
// and only grow. Rounds below the decided round can be pruned once the
// process has decided.

use super::types::{NodeIndex, Phase, Round, Value};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// How repeated messages from the same sender are counted
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Every received value counts toward thresholds
    #[default]
    CountAll,

    /// At most one entry per sender per round and phase. Messages that do
    /// not name a sender always count.
    OnePerSender,
}

/// Values received for one (round, phase)
#[derive(Debug, Default, Clone)]
struct Sequence {
    values: Vec<Value>,
    senders: HashSet<NodeIndex>,
}

/// Proposal and vote sequences of a single round
#[derive(Debug, Default, Clone)]
pub struct RoundRecord {
    proposals: Sequence,
    votes: Sequence,
}

impl RoundRecord {
    pub fn proposals(&self) -> &[Value] {
        &self.proposals.values
    }

    pub fn votes(&self) -> &[Value] {
        &self.votes.values
    }

    fn sequence(&self, phase: Phase) -> &Sequence {
        match phase {
            Phase::Propose => &self.proposals,
            Phase::Vote => &self.votes,
        }
    }

    fn sequence_mut(&mut self, phase: Phase) -> &mut Sequence {
        match phase {
            Phase::Propose => &mut self.proposals,
            Phase::Vote => &mut self.votes,
        }
    }
}

/// Per-process store of round records
#[derive(Debug, Clone)]
pub struct RoundBuffers {
    rounds: BTreeMap<Round, RoundRecord>,
    policy: DuplicatePolicy,
}

impl RoundBuffers {
    pub fn new(policy: DuplicatePolicy) -> Self {
        Self {
            rounds: BTreeMap::new(),
            policy,
        }
    }

    /// Append `value` to the `(round, phase)` sequence
    ///
    /// Returns the new sequence length, or `None` when the duplicate
    /// policy refuses a repeated sender.
    pub fn record(
        &mut self,
        round: Round,
        phase: Phase,
        value: Value,
        sender: Option<NodeIndex>,
    ) -> Option<usize> {
        let sequence = self.rounds.entry(round).or_default().sequence_mut(phase);

        if let (DuplicatePolicy::OnePerSender, Some(sender)) = (self.policy, sender) {
            if !sequence.senders.insert(sender) {
                return None;
            }
        }

        sequence.values.push(value);
        Some(sequence.values.len())
    }

    /// Values received so far for `(round, phase)`
    pub fn values(&self, round: Round, phase: Phase) -> &[Value] {
        self.rounds
            .get(&round)
            .map(|record| record.sequence(phase).values.as_slice())
            .unwrap_or(&[])
    }

    pub fn len(&self, round: Round, phase: Phase) -> usize {
        self.values(round, phase).len()
    }

    pub fn round(&self, round: Round) -> Option<&RoundRecord> {
        self.rounds.get(&round)
    }

    /// Drop every record for rounds strictly below `round`
    ///
    /// Returns the number of rounds removed.
    pub fn prune_before(&mut self, round: Round) -> usize {
        let before = self.rounds.len();
        self.rounds = self.rounds.split_off(&round);
        before - self.rounds.len()
    }

    /// Number of rounds currently held
    pub fn round_count(&self) -> usize {
        self.rounds.len()
    }

    pub fn oldest_round(&self) -> Option<Round> {
        self.rounds.keys().next().copied()
    }

    pub fn policy(&self) -> DuplicatePolicy {
        self.policy
    }
}

impl Default for RoundBuffers {
    fn default() -> Self {
        Self::new(DuplicatePolicy::default())
    }
}
