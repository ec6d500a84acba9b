//! Message payload definitions.
//!
//! Field tags match the `Message` protobuf used by the multi-device service,
//! restricted to the plain-text field this client produces and inspects.
//! Other fields of incoming payloads are skipped on decode.

/// Message content carried inside a `message` stanza.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Message {
    #[prost(string, optional, tag = "1")]
    pub conversation: Option<String>,
}

impl Message {
    /// Plain-text message with `body` as its only field.
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            conversation: Some(body.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message as _;

    #[test]
    fn test_text_message_wire_bytes() {
        let msg = Message::text("hi");
        // field 1, wire type 2, length 2, "hi"
        assert_eq!(msg.encode_to_vec(), vec![0x0a, 0x02, b'h', b'i']);
    }

    #[test]
    fn test_decode_skips_unknown_fields() {
        // field 6 (extended text) holding field 1 "x", then conversation "hi"
        let wire = [0x32, 0x03, 0x0a, 0x01, b'x', 0x0a, 0x02, b'h', b'i'];
        let decoded = Message::decode(wire.as_slice()).unwrap();
        assert_eq!(decoded.conversation.as_deref(), Some("hi"));

        let link_only = Message::decode(&wire[..5]).unwrap();
        assert!(link_only.conversation.is_none());
    }
}
