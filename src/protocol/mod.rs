//! Protocol client: the gateway connection, pairing and messaging.

mod client;
pub mod qr;
pub mod stanza;
mod traits;

pub use client::{Client, ClientConfig};
pub use qr::{QRChannel, QREvent};
pub use traits::{ClientError, EventHandler, MessagingClient, SendResponse};
