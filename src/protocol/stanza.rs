//! Stanzas exchanged with the gateway.
//!
//! Each frame carries one JSON object tagged by its `tag` field. Message
//! content travels as base64 of the protobuf-encoded [`proto::Message`].
//!
//! A session runs as follows. The client opens with `hello`. An unpaired
//! device then receives `pair-refs` and shows one QR code per reference
//! until the gateway answers `pair-success` on the same socket. A paired
//! device receives `success`. Outgoing `message` stanzas are confirmed by an
//! `ack` with the same id. `failure` ends the session: reason 401 means the
//! device was unlinked and 405 means the gateway rejects this client version.

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use prost::Message as _;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::proto;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tag", rename_all = "kebab-case")]
pub enum Stanza {
    /// First stanza on every connection. `jid` is absent for unpaired devices.
    Hello {
        user_agent: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        jid: Option<String>,
        registration_id: u32,
        noise_key: String,
    },
    /// Pairing references, one per QR code.
    PairRefs { refs: Vec<String> },
    PairSuccess {
        jid: String,
        #[serde(default)]
        platform: String,
        #[serde(default)]
        business_name: String,
    },
    /// Login accepted.
    Success,
    /// Outgoing messages set `to`, incoming ones set `from`.
    Message {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        participant: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        push_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<i64>,
        payload: String,
    },
    /// Server acknowledgement of a sent message, `timestamp` in unix seconds.
    Ack { id: String, timestamp: i64 },
    Failure {
        reason: u16,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    StreamError { code: String },
}

/// Failure code meaning the device was unlinked.
pub const FAILURE_LOGGED_OUT: u16 = 401;
/// Failure code meaning the client version is no longer accepted.
pub const FAILURE_CLIENT_OUTDATED: u16 = 405;

#[derive(Debug, Error)]
pub enum StanzaError {
    #[error("malformed stanza: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed payload encoding: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("malformed message payload: {0}")]
    Proto(#[from] prost::DecodeError),
}

pub fn encode(stanza: &Stanza) -> Result<Vec<u8>, StanzaError> {
    Ok(serde_json::to_vec(stanza)?)
}

pub fn decode(data: &[u8]) -> Result<Stanza, StanzaError> {
    Ok(serde_json::from_slice(data)?)
}

pub fn encode_payload(message: &proto::Message) -> String {
    B64.encode(message.encode_to_vec())
}

pub fn decode_payload(payload: &str) -> Result<proto::Message, StanzaError> {
    let bytes = B64.decode(payload)?;
    Ok(proto::Message::decode(bytes.as_slice())?)
}

/// Generate a unique message ID.
pub fn generate_message_id() -> String {
    format!("3EB0{:016X}", rand::random::<u64>())
}
