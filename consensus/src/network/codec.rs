// JSON wire codec
//
// Wire shape: {"messageType": "proposal" | "vote", "k": <round >= 1>,
// "x": 0 | 1 | "?", "sender": <index, optional>}
//
// Decoding validates every field; a payload that does not describe a
// well-formed message is rejected instead of being counted.

use crate::benor::types::{Message, NodeIndex, Phase, Round, Value};
use serde::Deserialize;
use serde_json::Value as Json;
use thiserror::Error;

/// Malformed or unencodable messages
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Invalid messageType: {0}")]
    InvalidMessageType(String),

    #[error("Invalid round: {0}")]
    InvalidRound(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Invalid sender: {0}")]
    InvalidSender(String),

    #[error("Encoding failed: {0}")]
    Encode(String),
}

impl CodecError {
    /// Decode failures are the sender's fault; encode failures are ours
    pub fn is_client_error(&self) -> bool {
        !matches!(self, CodecError::Encode(_))
    }
}

pub type Result<T> = std::result::Result<T, CodecError>;

/// Inbound payload before validation; `null` counts as missing
#[derive(Deserialize)]
struct RawMessage {
    #[serde(rename = "messageType")]
    message_type: Option<Json>,
    k: Option<Json>,
    x: Option<Json>,
    sender: Option<Json>,
}

/// Encode a message into its JSON wire form
pub fn encode(message: &Message) -> Result<Vec<u8>> {
    serde_json::to_vec(message).map_err(|e| CodecError::Encode(e.to_string()))
}

/// Decode and validate a JSON payload
pub fn decode(payload: &[u8]) -> Result<Message> {
    let raw: RawMessage =
        serde_json::from_slice(payload).map_err(|e| CodecError::InvalidJson(e.to_string()))?;

    let phase = decode_phase(raw.message_type.ok_or(CodecError::MissingField("messageType"))?)?;
    let round = decode_round(raw.k.ok_or(CodecError::MissingField("k"))?)?;
    let value = decode_value(raw.x.ok_or(CodecError::MissingField("x"))?)?;
    let sender = raw.sender.map(decode_sender).transpose()?;

    Ok(Message {
        phase,
        round,
        value,
        sender,
    })
}

fn decode_phase(json: Json) -> Result<Phase> {
    match json.as_str() {
        Some("proposal") => Ok(Phase::Propose),
        Some("vote") => Ok(Phase::Vote),
        _ => Err(CodecError::InvalidMessageType(json.to_string())),
    }
}

fn decode_round(json: Json) -> Result<Round> {
    match json.as_u64() {
        Some(round) if round >= 1 => Ok(round),
        _ => Err(CodecError::InvalidRound(json.to_string())),
    }
}

fn decode_value(json: Json) -> Result<Value> {
    let text = json.to_string();
    serde_json::from_value(json).map_err(|_| CodecError::InvalidValue(text))
}

fn decode_sender(json: Json) -> Result<NodeIndex> {
    json.as_u64()
        .and_then(|sender| NodeIndex::try_from(sender).ok())
        .ok_or_else(|| CodecError::InvalidSender(json.to_string()))
}
