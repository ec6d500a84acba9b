//! wa-bot: a minimal multi-device messaging bot.
//!
//! ## Modules
//!
//! - `logger` - Severity-tagged console logging
//! - `types` - JIDs and client events
//! - `proto` - Message payloads
//! - `store` - SQLite session store
//! - `socket` - WebSocket frame transport
//! - `protocol` - Gateway client, QR pairing and the `MessagingClient` trait
//! - `bot` - Startup sequence, echo handler and the scheduled send
//! - `config` - Bot configuration

pub mod bot;
pub mod config;
pub mod crypto;
pub mod logger;
pub mod proto;
pub mod protocol;
pub mod socket;
pub mod store;
pub mod types;

pub use bot::{Bot, BotError, DelayedSend, LoginPath};
pub use config::BotConfig;
pub use logger::{Logger, PrefixLogger};
pub use protocol::{Client, ClientConfig, ClientError, MessagingClient, QREvent, SendResponse};
pub use store::{Container, Device};
pub use types::{Event, JID};
