//! Events emitted by the client to registered handlers.

use chrono::{DateTime, Utc};

use crate::proto;
use crate::types::JID;

/// Emitted once the gateway accepts our login.
#[derive(Debug, Clone)]
pub struct Connected;

/// Emitted when the socket closes for any reason.
#[derive(Debug, Clone)]
pub struct Disconnected {
    pub reason: DisconnectReason,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DisconnectReason {
    /// `disconnect()` was called locally
    Requested,
    /// The gateway closed the stream
    ServerClosed,
    NetworkError(String),
}

/// Emitted when the gateway reports that the device was unlinked.
#[derive(Debug, Clone)]
pub struct LoggedOut {
    pub reason: Option<String>,
}

/// Emitted after a QR code was scanned and the device identity saved.
#[derive(Debug, Clone)]
pub struct PairSuccess {
    pub id: JID,
    pub platform: String,
    pub business_name: String,
}

/// Stream-level error reported by the gateway.
#[derive(Debug, Clone)]
pub struct StreamError {
    pub code: String,
}

/// A received message.
#[derive(Debug, Clone)]
pub struct Message {
    pub info: MessageInfo,
    pub message: proto::Message,
}

impl Message {
    /// Body of a plain-text message, if this is one.
    pub fn conversation(&self) -> Option<&str> {
        self.message.conversation.as_deref()
    }
}

#[derive(Debug, Clone)]
pub struct MessageInfo {
    pub id: String,
    pub sender: JID,
    /// Same as sender for 1:1 chats, group JID for groups
    pub chat: JID,
    pub is_from_me: bool,
    pub is_group: bool,
    pub timestamp: DateTime<Utc>,
    pub push_name: Option<String>,
}

/// All possible events that can be received
#[derive(Debug, Clone)]
pub enum Event {
    Connected(Connected),
    Disconnected(Disconnected),
    LoggedOut(LoggedOut),
    PairSuccess(PairSuccess),
    StreamError(StreamError),
    Message(Message),
}
