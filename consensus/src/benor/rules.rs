// Decision rules
//
// Pure functions evaluated when a round's buffer reaches quorum:
// - PROPOSE side: the value held by more than n/2 proposals, else "?"
// - VOTE side: decide on f+1 identical votes, adopt the leading value when
//   any value is known, flip the coin when every vote is "?"

use super::types::{Round, Value};
use thiserror::Error;

/// Protocol invariant violations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Conflicting strong majorities in round {round}: {ones} votes for 1, {zeros} votes for 0")]
    ConflictingMajorities {
        round: Round,
        ones: usize,
        zeros: usize,
    },

    #[error("Round {round} has no successor")]
    RoundOverflow { round: Round },
}

pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Fleet size and fault bound with the thresholds derived from them
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Thresholds {
    /// Total number of processes (n)
    pub n: usize,

    /// Maximum faulty processes (f)
    pub f: usize,
}

impl Thresholds {
    pub fn new(n: usize, f: usize) -> Self {
        Self { n, f }
    }

    /// Entries needed before a buffer is acted on (n - f)
    pub fn quorum(&self) -> usize {
        self.n.saturating_sub(self.f)
    }

    /// Identical known votes needed to decide (f + 1)
    pub fn strong_majority(&self) -> usize {
        self.f + 1
    }

    /// Strictly more than n/2
    pub fn is_majority(&self, count: usize) -> bool {
        2 * count > self.n
    }
}

/// Occurrence counts of each value in a sequence
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Tally {
    pub zeros: usize,
    pub ones: usize,
    pub unknown: usize,
}

impl Tally {
    pub fn of(values: &[Value]) -> Self {
        values.iter().fold(Tally::default(), |mut tally, value| {
            match value {
                Value::Zero => tally.zeros += 1,
                Value::One => tally.ones += 1,
                Value::Unknown => tally.unknown += 1,
            }
            tally
        })
    }

    pub fn known(&self) -> usize {
        self.zeros + self.ones
    }

    /// The more frequent known value; a tie goes to 1
    pub fn leader(&self) -> Value {
        if self.ones >= self.zeros {
            Value::One
        } else {
            Value::Zero
        }
    }
}

/// Outcome of a full VOTE buffer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoteOutcome {
    /// f+1 identical known votes
    Decide(Value),

    /// No strong majority but some known vote: re-propose this value
    Adopt(Value),

    /// Every vote is "?": re-propose a coin flip
    CoinFlip,
}

/// Value to vote for once a PROPOSE buffer reaches quorum
pub fn proposal_majority(proposals: &[Value], thresholds: &Thresholds) -> Value {
    let tally = Tally::of(proposals);
    if thresholds.is_majority(tally.ones) {
        Value::One
    } else if thresholds.is_majority(tally.zeros) {
        Value::Zero
    } else {
        Value::Unknown
    }
}

/// Evaluate a VOTE buffer that reached quorum in `round`
///
/// Both strong-majority thresholds holding at once cannot happen among
/// correct processes and is reported as an error instead of being broken
/// like a tie.
pub fn evaluate_votes(round: Round, votes: &[Value], thresholds: &Thresholds) -> Result<VoteOutcome> {
    let tally = Tally::of(votes);
    let needed = thresholds.strong_majority();

    match (tally.ones >= needed, tally.zeros >= needed) {
        (true, true) => Err(ProtocolError::ConflictingMajorities {
            round,
            ones: tally.ones,
            zeros: tally.zeros,
        }),
        (true, false) => Ok(VoteOutcome::Decide(Value::One)),
        (false, true) => Ok(VoteOutcome::Decide(Value::Zero)),
        (false, false) if tally.known() > 0 => Ok(VoteOutcome::Adopt(tally.leader())),
        (false, false) => Ok(VoteOutcome::CoinFlip),
    }
}
