//! Protobuf payloads.

mod wa;

pub use wa::*;
