//! Protocol types: identifiers and the events handed to event handlers.

mod events;
mod jid;

pub use events::*;
pub use jid::*;
