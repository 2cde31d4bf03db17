// Core Ben-Or data structures
//
// Value domain, message phases, messages and the externally visible
// process state. Wire names follow the JSON shape peers exchange:
// `messageType`, `k` (round) and `x` (value).

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Index of a process in the fleet (0..n)
pub type NodeIndex = usize;

/// Round number, starting at 1
pub type Round = u64;

/// Binary consensus value plus the "no information yet" marker
///
/// On the wire `Zero` and `One` are the JSON integers `0` and `1`,
/// `Unknown` is the string `"?"`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Value {
    Zero,
    One,
    Unknown,
}

impl Value {
    /// Build a value from a binary input (0 or 1)
    pub fn from_bit(bit: u8) -> Option<Self> {
        match bit {
            0 => Some(Value::Zero),
            1 => Some(Value::One),
            _ => None,
        }
    }

    /// Binary form of a known value
    pub fn as_bit(self) -> Option<u8> {
        match self {
            Value::Zero => Some(0),
            Value::One => Some(1),
            Value::Unknown => None,
        }
    }

    /// True for 0 and 1
    pub fn is_known(self) -> bool {
        self != Value::Unknown
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Zero => write!(f, "0"),
            Value::One => write!(f, "1"),
            Value::Unknown => write!(f, "?"),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Zero => serializer.serialize_u8(0),
            Value::One => serializer.serialize_u8(1),
            Value::Unknown => serializer.serialize_str("?"),
        }
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0, 1 or \"?\"")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Value, E> {
        match v {
            0 => Ok(Value::Zero),
            1 => Ok(Value::One),
            other => Err(E::invalid_value(de::Unexpected::Unsigned(other), &self)),
        }
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Value, E> {
        match u64::try_from(v) {
            Ok(v) => self.visit_u64(v),
            Err(_) => Err(E::invalid_value(de::Unexpected::Signed(v), &self)),
        }
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Value, E> {
        match v {
            "?" => Ok(Value::Unknown),
            other => Err(E::invalid_value(de::Unexpected::Str(other), &self)),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ValueVisitor)
    }
}

/// Message phases of a Ben-Or round
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    #[serde(rename = "proposal")]
    Propose,
    #[serde(rename = "vote")]
    Vote,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Propose => write!(f, "PROPOSE"),
            Phase::Vote => write!(f, "VOTE"),
        }
    }
}

/// A PROPOSE or VOTE message
///
/// `sender` is optional on the wire; every message this crate emits
/// carries it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Message {
    #[serde(rename = "messageType")]
    pub phase: Phase,

    #[serde(rename = "k")]
    pub round: Round,

    #[serde(rename = "x")]
    pub value: Value,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender: Option<NodeIndex>,
}

impl Message {
    pub fn propose(round: Round, value: Value) -> Self {
        Self {
            phase: Phase::Propose,
            round,
            value,
            sender: None,
        }
    }

    pub fn vote(round: Round, value: Value) -> Self {
        Self {
            phase: Phase::Vote,
            round,
            value,
            sender: None,
        }
    }

    /// Tag the message with its sender
    pub fn from_node(mut self, sender: NodeIndex) -> Self {
        self.sender = Some(sender);
        self
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(k={}, x={})", self.phase, self.round, self.value)
    }
}

/// Externally visible state of one process
///
/// `None` fields are the "no opinion" sentinel a faulty process reports.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessState {
    /// Set by stop; all further message processing ceases
    pub killed: bool,

    /// Current working value
    #[serde(rename = "x")]
    pub estimate: Option<Value>,

    /// Whether the estimate is final
    pub decided: Option<bool>,

    /// Current round, `None` before start
    #[serde(rename = "k")]
    pub round: Option<Round>,
}

impl ProcessState {
    pub fn new(initial: Value) -> Self {
        Self {
            killed: false,
            estimate: Some(initial),
            decided: Some(false),
            round: None,
        }
    }

    /// Replace estimate, decided and round with the "no opinion" sentinel
    pub fn clear_opinion(&mut self) {
        self.estimate = None;
        self.decided = None;
        self.round = None;
    }

    pub fn is_decided(&self) -> bool {
        self.decided == Some(true)
    }

    /// The decided value, if any
    pub fn decision(&self) -> Option<Value> {
        if self.is_decided() {
            self.estimate
        } else {
            None
        }
    }
}
