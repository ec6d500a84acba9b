//! Client abstraction used by the bot.
//!
//! [`Client`](super::Client) is the production implementation; tests drive
//! the bot through mocks of this trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::proto;
use crate::protocol::qr::QRChannel;
use crate::protocol::stanza::StanzaError;
use crate::socket::SocketError;
use crate::store::StoreError;
use crate::types::{Event, MessageID, JID};

/// Callback invoked for every event, on the client's reader task.
pub type EventHandler = Box<dyn Fn(Event) + Send + Sync>;

/// Server acknowledgement of a sent message.
#[derive(Debug, Clone, PartialEq)]
pub struct SendResponse {
    pub id: MessageID,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("not connected")]
    NotConnected,
    #[error("not logged in")]
    NotLoggedIn,
    #[error("already connected")]
    AlreadyConnected,
    #[error("QR channel is only available for an unpaired device before connecting")]
    QRStoreContainsID,
    #[error("unknown server {0:?} in recipient JID")]
    UnknownServer(String),
    #[error("timed out waiting for server acknowledgement of {0}")]
    Timeout(MessageID),
    #[error("connection closed before the message was acknowledged")]
    Disconnected,
    #[error(transparent)]
    Socket(#[from] SocketError),
    #[error(transparent)]
    Stanza(#[from] StanzaError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[async_trait]
pub trait MessagingClient: Send + Sync {
    /// Account JID of the bound device, `None` until paired.
    fn store_id(&self) -> Option<JID>;

    /// Register a handler, returning its ID.
    fn add_event_handler(&self, handler: EventHandler) -> u32;

    /// Open a pairing session. Must be called before [`connect`](Self::connect).
    async fn qr_channel(&self) -> Result<QRChannel, ClientError>;

    async fn connect(&self) -> Result<(), ClientError>;

    async fn send_message(
        &self,
        to: &JID,
        message: &proto::Message,
    ) -> Result<SendResponse, ClientError>;

    async fn disconnect(&self);
}
