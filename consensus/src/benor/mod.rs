// Ben-Or randomized binary consensus
// Implements the per-process state machine: PROPOSE/VOTE rounds, quorum
// detection and the three-way vote rule (decide, adopt, coin flip)

pub mod buffers;
pub mod coin;
pub mod engine;
pub mod rules;
pub mod types;


use crate::config::ConsensusConfig;
use crate::gate::{Admission, FaultGate, NodeStatus};
use buffers::RoundBuffers;
use coin::Coin;
use rules::{ProtocolError, Thresholds, VoteOutcome};
use serde::Serialize;
use tracing::{debug, error, info};
use types::{Message, NodeIndex, Phase, ProcessState, Round, Value};

/// Per-process protocol counters
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ProcessStats {
    /// Messages handed to the state machine, ignored ones included
    pub messages_received: u64,

    /// Messages dropped by the fault gate (faulty, killed or decided)
    pub messages_ignored: u64,

    /// Entries refused by the duplicate policy
    pub duplicates_refused: u64,

    pub proposals_cast: u64,
    pub votes_cast: u64,
    pub rounds_advanced: u64,
    pub coin_flips: u64,
}

/// Ben-Or state machine for one process
///
/// Performs no I/O: every step returns the message to broadcast, if any,
/// and the caller delivers it to all n processes (itself included).
pub struct Process {
    /// Index of this process
    node_id: NodeIndex,

    /// n, f and derived thresholds
    thresholds: Thresholds,

    gate: FaultGate,

    state: ProcessState,

    /// Proposal and vote sequences per round
    buffers: RoundBuffers,

    /// Random source for the coin-flip branch
    coin: Box<dyn Coin>,

    prune_on_decide: bool,

    stats: ProcessStats,
}

impl Process {
    /// Create a process from a validated configuration
    pub fn new(config: &ConsensusConfig, coin: Box<dyn Coin>) -> Self {
        Self {
            node_id: config.node_id,
            thresholds: config.thresholds(),
            gate: FaultGate::new(config.is_faulty),
            state: ProcessState::new(config.initial_value),
            buffers: RoundBuffers::new(config.duplicate_policy),
            coin,
            prune_on_decide: config.prune_on_decide,
            stats: ProcessStats::default(),
        }
    }

    pub fn node_id(&self) -> NodeIndex {
        self.node_id
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn state(&self) -> &ProcessState {
        &self.state
    }

    pub fn status(&self) -> NodeStatus {
        self.gate.health()
    }

    pub fn buffers(&self) -> &RoundBuffers {
        &self.buffers
    }

    pub fn stats(&self) -> &ProcessStats {
        &self.stats
    }

    /// Enter round 1
    ///
    /// Returns the round-1 proposal to broadcast. A faulty process clears
    /// its opinion instead. Killed, decided or already started processes
    /// return `None`.
    pub fn start(&mut self) -> Option<Message> {
        if self.gate.is_faulty() {
            self.state.clear_opinion();
            debug!("Node {} is faulty, not starting", self.node_id);
            return None;
        }
        if self.gate.admit(&self.state) != Admission::Admit || self.state.round.is_some() {
            return None;
        }

        let value = self.state.estimate?;
        self.state.round = Some(1);
        self.stats.proposals_cast += 1;
        info!("Node {} starting round 1 with {}", self.node_id, value);
        Some(Message::propose(1, value).from_node(self.node_id))
    }

    /// Set the killed flag; a prior decision is kept
    pub fn stop(&mut self) {
        self.state.killed = true;
    }

    /// Handle an inbound PROPOSE or VOTE
    ///
    /// Returns the message to broadcast when the buffer for this round and
    /// phase reaches quorum for the first time.
    pub fn on_message(&mut self, message: Message) -> rules::Result<Option<Message>> {
        self.stats.messages_received += 1;

        let admission = self.gate.admit(&self.state);
        if admission != Admission::Admit {
            self.stats.messages_ignored += 1;
            debug!("Node {} ignoring {}: {:?}", self.node_id, message, admission);
            return Ok(None);
        }

        let len = match self
            .buffers
            .record(message.round, message.phase, message.value, message.sender)
        {
            Some(len) => len,
            None => {
                self.stats.duplicates_refused += 1;
                debug!(
                    "Node {} refused duplicate {} from {:?}",
                    self.node_id, message, message.sender
                );
                return Ok(None);
            }
        };

        // Fire only on the insert that reaches quorum
        if len != self.thresholds.quorum() {
            return Ok(None);
        }

        match message.phase {
            Phase::Propose => Ok(Some(self.cast_vote(message.round))),
            Phase::Vote => self.conclude_round(message.round),
        }
    }

    fn cast_vote(&mut self, round: Round) -> Message {
        let proposals = self.buffers.values(round, Phase::Propose);
        let value = rules::proposal_majority(proposals, &self.thresholds);
        self.stats.votes_cast += 1;
        debug!("Node {} votes {} in round {}", self.node_id, value, round);
        Message::vote(round, value).from_node(self.node_id)
    }

    fn conclude_round(&mut self, round: Round) -> rules::Result<Option<Message>> {
        let votes = self.buffers.values(round, Phase::Vote);
        let outcome = rules::evaluate_votes(round, votes, &self.thresholds)?;

        let value = match outcome {
            VoteOutcome::Decide(value) => {
                self.decide(round, value);
                return Ok(None);
            }
            _ if self.is_stale(round) => {
                debug!(
                    "Node {} ignoring stale outcome of round {} (now in {:?})",
                    self.node_id, round, self.state.round
                );
                return Ok(None);
            }
            _ if round == Round::MAX => {
                error!("Node {} cannot advance past round {}", self.node_id, round);
                return Err(ProtocolError::RoundOverflow { round });
            }
            VoteOutcome::Adopt(value) => {
                debug!("Node {} adopts {} after round {}", self.node_id, value, round);
                value
            }
            VoteOutcome::CoinFlip => {
                self.stats.coin_flips += 1;
                let value = self.coin.flip();
                debug!("Node {} flipped {} after round {}", self.node_id, value, round);
                value
            }
        };

        Ok(Some(self.advance(round + 1, value)))
    }

    /// An outcome for `round` that would not move the round forward
    fn is_stale(&self, round: Round) -> bool {
        matches!(self.state.round, Some(current) if round < current)
    }

    fn decide(&mut self, round: Round, value: Value) {
        self.state.estimate = Some(value);
        self.state.decided = Some(true);
        self.state.round = Some(self.state.round.map_or(round, |current| current.max(round)));
        info!("Node {} decided {} in round {}", self.node_id, value, round);

        if self.prune_on_decide {
            let pruned = self.buffers.prune_before(round);
            debug!("Node {} pruned {} rounds", self.node_id, pruned);
        }
    }

    fn advance(&mut self, next: Round, value: Value) -> Message {
        self.state.round = Some(next);
        self.state.estimate = Some(value);
        self.stats.rounds_advanced += 1;
        self.stats.proposals_cast += 1;
        info!("Node {} entering round {} with {}", self.node_id, next, value);
        Message::propose(next, value).from_node(self.node_id)
    }
}

#[cfg(test)]
mod tests {
    use super::buffers::DuplicatePolicy;
    use super::coin::{FixedCoin, SeededCoin};
    use super::types::Value::{One, Unknown, Zero};
    use super::*;

    fn process(node_id: NodeIndex, n: usize, f: usize, initial: Value) -> Process {
        let config = ConsensusConfig::new(node_id, n, f, initial);
        Process::new(&config, Box::new(SeededCoin::new(node_id as u64)))
    }

    fn feed(p: &mut Process, messages: &[Message]) -> Vec<Message> {
        messages
            .iter()
            .filter_map(|m| p.on_message(*m).unwrap())
            .collect()
    }

    #[test]
    fn test_new_process_state() {
        let p = process(0, 4, 1, One);
        assert_eq!(p.state(), &ProcessState::new(One));
        assert_eq!(p.state().round, None);
        assert_eq!(p.status(), NodeStatus::Live);
    }

    #[test]
    fn test_start_proposes_initial_value() {
        let mut p = process(2, 4, 1, Zero);
        let msg = p.start().unwrap();
        assert_eq!(msg, Message::propose(1, Zero).from_node(2));
        assert_eq!(p.state().round, Some(1));

        // Starting twice does nothing
        assert!(p.start().is_none());
        assert_eq!(p.stats().proposals_cast, 1);
    }

    #[test]
    fn test_faulty_start_clears_opinion() {
        let config = ConsensusConfig::new(0, 4, 1, One).faulty(true);
        let mut p = Process::new(&config, Box::new(FixedCoin(One)));
        assert_eq!(p.status(), NodeStatus::Faulty);
        assert!(p.start().is_none());

        let state = p.state();
        assert_eq!(state.estimate, None);
        assert_eq!(state.decided, None);
        assert_eq!(state.round, None);
    }

    #[test]
    fn test_faulty_never_records_or_sends() {
        let config = ConsensusConfig::new(0, 4, 1, One).faulty(true);
        let mut p = Process::new(&config, Box::new(FixedCoin(One)));
        p.start();

        let out = feed(&mut p, &[Message::propose(1, One); 4]);
        assert!(out.is_empty());
        assert_eq!(p.buffers().round_count(), 0);
        assert_eq!(p.stats().messages_ignored, 4);

        p.stop();
        assert_eq!(p.status(), NodeStatus::Faulty);
        assert_eq!(p.state().estimate, None);
    }

    #[test]
    fn test_split_scenario_decides_one() {
        // n=4, f=1: process 0 (input 0) is faulty, the rest hold 1
        let mut p = process(1, 4, 1, One);
        p.start();

        let votes = feed(
            &mut p,
            &[
                Message::propose(1, One).from_node(1),
                Message::propose(1, One).from_node(2),
                Message::propose(1, One).from_node(3),
            ],
        );
        assert_eq!(votes, vec![Message::vote(1, One).from_node(1)]);

        let out = feed(
            &mut p,
            &[
                Message::vote(1, One).from_node(1),
                Message::vote(1, One).from_node(2),
                Message::vote(1, One).from_node(3),
            ],
        );
        assert!(out.is_empty());
        assert!(p.state().is_decided());
        assert_eq!(p.state().decision(), Some(One));
        assert_eq!(p.state().round, Some(1));
    }

    #[test]
    fn test_proposal_without_majority_votes_unknown() {
        let mut p = process(1, 4, 1, One);
        let votes = feed(&mut p, &[Message::propose(1, Zero), Message::propose(1, One), Message::propose(1, One)]);
        assert_eq!(votes, vec![Message::vote(1, Unknown).from_node(1)]);
    }

    #[test]
    fn test_quorum_fires_once() {
        let mut p = process(1, 4, 1, One);
        let votes = feed(&mut p, &[Message::propose(1, One); 4]);
        assert_eq!(votes.len(), 1);
        assert_eq!(p.buffers().len(1, Phase::Propose), 4);
        assert_eq!(p.stats().votes_cast, 1);
    }

    #[test]
    fn test_adopt_ties_toward_one_and_reproposes() {
        let mut p = process(3, 4, 1, Zero);
        p.start();
        let out = feed(&mut p, &[Message::vote(1, Zero), Message::vote(1, One), Message::vote(1, Unknown)]);

        assert_eq!(out, vec![Message::propose(2, One).from_node(3)]);
        assert_eq!(p.state().round, Some(2));
        assert_eq!(p.state().estimate, Some(One));
        assert_eq!(p.state().decided, Some(false));
    }

    #[test]
    fn test_coin_flip_uses_injected_coin() {
        let config = ConsensusConfig::new(0, 4, 1, One);
        let mut p = Process::new(&config, Box::new(FixedCoin(Zero)));
        p.start();
        let out = feed(&mut p, &[Message::vote(1, Unknown); 3]);

        assert_eq!(out, vec![Message::propose(2, Zero).from_node(0)]);
        assert_eq!(p.state().estimate, Some(Zero));
        assert_eq!(p.stats().coin_flips, 1);
    }

    #[test]
    fn test_unstarted_process_advances_on_vote_quorum() {
        let mut p = process(0, 4, 1, One);
        let out = feed(&mut p, &[Message::vote(3, Zero); 1]);
        assert!(out.is_empty());

        let out = feed(&mut p, &[Message::vote(3, Unknown); 2]);
        assert_eq!(out, vec![Message::propose(4, Zero).from_node(0)]);
        assert_eq!(p.state().round, Some(4));

        // Round 1 can no longer be started
        assert!(p.start().is_none());
    }

    #[test]
    fn test_stale_round_outcome_is_ignored() {
        let mut p = process(0, 4, 1, One);
        feed(&mut p, &[Message::vote(5, Unknown); 3]);
        assert_eq!(p.state().round, Some(6));
        let estimate = p.state().estimate;

        let out = feed(&mut p, &[Message::vote(2, One), Message::vote(2, Unknown), Message::vote(2, Unknown)]);
        assert!(out.is_empty());
        assert_eq!(p.state().round, Some(6));
        assert_eq!(p.state().estimate, estimate);
    }

    #[test]
    fn test_decision_never_moves_round_backwards() {
        let mut p = process(0, 4, 1, One);
        feed(&mut p, &[Message::vote(5, Unknown); 3]);
        feed(&mut p, &[Message::vote(2, Zero); 3]);
        assert_eq!(p.state().decision(), Some(Zero));
        assert_eq!(p.state().round, Some(6));
    }

    #[test]
    fn test_decided_state_is_terminal() {
        let mut p = process(1, 4, 1, One);
        p.start();
        feed(&mut p, &[Message::vote(1, One); 3]);
        let decided = p.state().clone();
        let rounds = p.buffers().round_count();

        let out = feed(
            &mut p,
            &[
                Message::propose(1, Zero),
                Message::vote(1, Zero),
                Message::propose(2, Zero),
                Message::vote(2, Zero),
                Message::vote(2, Zero),
                Message::vote(2, Zero),
            ],
        );
        assert!(out.is_empty());
        assert_eq!(p.state(), &decided);
        assert_eq!(p.buffers().round_count(), rounds);
        assert_eq!(p.stats().messages_ignored, 6);
        assert!(p.start().is_none());
    }

    #[test]
    fn test_killed_process_ignores_messages_and_keeps_decision() {
        let mut p = process(1, 4, 1, One);
        p.stop();
        assert!(p.start().is_none());
        assert!(feed(&mut p, &[Message::propose(1, One); 3]).is_empty());
        assert_eq!(p.buffers().round_count(), 0);

        let mut decided = process(1, 4, 1, One);
        feed(&mut decided, &[Message::vote(1, One); 3]);
        decided.stop();
        assert!(decided.state().killed);
        assert_eq!(decided.state().decision(), Some(One));
    }

    #[test]
    fn test_prune_on_decide() {
        let mut p = process(0, 4, 1, One);
        feed(&mut p, &[Message::vote(1, Unknown); 3]);
        feed(&mut p, &[Message::vote(2, Unknown); 3]);
        assert_eq!(p.buffers().round_count(), 2);

        feed(&mut p, &[Message::vote(3, One), Message::vote(3, One), Message::vote(3, Unknown)]);
        assert!(p.state().is_decided());
        assert_eq!(p.buffers().oldest_round(), Some(3));
        assert_eq!(p.buffers().round_count(), 1);
    }

    #[test]
    fn test_replayed_votes_surface_conflict() {
        // n=5, f=1 with replays counted: two 0s and two 1s reach quorum
        let mut p = process(0, 5, 1, One);
        let state = p.state().clone();
        for value in [Zero, Zero, One] {
            assert!(p.on_message(Message::vote(1, value).from_node(1)).unwrap().is_none());
        }
        let err = p.on_message(Message::vote(1, One).from_node(1)).unwrap_err();
        assert_eq!(err, ProtocolError::ConflictingMajorities { round: 1, ones: 2, zeros: 2 });
        assert_eq!(p.state(), &state);
    }

    #[test]
    fn test_last_round_cannot_advance() {
        let mut p = process(0, 4, 1, One);
        p.start();
        let state = p.state().clone();

        let payload = br#"{"messageType":"vote","k":18446744073709551615,"x":"?"}"#;
        let last = crate::network::codec::decode(payload).unwrap();
        assert_eq!(last.round, Round::MAX);

        assert!(p.on_message(last).unwrap().is_none());
        assert!(p.on_message(last).unwrap().is_none());
        let err = p.on_message(last).unwrap_err();
        assert_eq!(err, ProtocolError::RoundOverflow { round: Round::MAX });
        assert_eq!(p.state(), &state);
        assert_eq!(p.stats().coin_flips, 0);

        // A decision in the last round needs no successor
        let mut p = process(1, 4, 1, One);
        feed(&mut p, &[Message::vote(Round::MAX, Zero); 3]);
        assert_eq!(p.state().decision(), Some(Zero));
        assert_eq!(p.state().round, Some(Round::MAX));
    }

    #[test]
    fn test_one_per_sender_refuses_replays() {
        let config = ConsensusConfig::new(0, 4, 1, One).with_duplicate_policy(DuplicatePolicy::OnePerSender);
        let mut p = Process::new(&config, Box::new(FixedCoin(One)));

        let out = feed(&mut p, &[Message::propose(1, One).from_node(2); 3]);
        assert!(out.is_empty());
        assert_eq!(p.buffers().len(1, Phase::Propose), 1);
        assert_eq!(p.stats().duplicates_refused, 2);

        let out = feed(
            &mut p,
            &[Message::propose(1, One).from_node(1), Message::propose(1, One).from_node(3)],
        );
        assert_eq!(out, vec![Message::vote(1, One).from_node(0)]);
    }

    #[test]
    fn test_single_process_decides_alone() {
        let mut p = process(0, 1, 0, Zero);
        let proposal = p.start().unwrap();
        let vote = p.on_message(proposal).unwrap().unwrap();
        assert_eq!(vote, Message::vote(1, Zero).from_node(0));
        assert!(p.on_message(vote).unwrap().is_none());
        assert_eq!(p.state().decision(), Some(Zero));
    }
}
