//! WebSocket frame transport to the gateway.
//!
//! The bot does not speak the encrypted protocol of the public service. It
//! talks to a gateway that terminates that protocol and relays plain stanzas
//! (see [`crate::protocol::stanza`]). Each WebSocket binary message carries
//! one frame: a 3-byte big-endian length followed by the payload. The first
//! frame sent on a connection is preceded by the 4-byte connection header.

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Default gateway endpoint, a gateway running on the local host.
pub const DEFAULT_ENDPOINT: &str = "ws://127.0.0.1:8080/ws";

/// Header sent once, before the first frame.
pub const CONN_HEADER: [u8; 4] = [b'W', b'A', 6, 3];

/// Largest payload expressible with a 3-byte length.
pub const MAX_FRAME_SIZE: usize = (1 << 24) - 1;

#[derive(Debug, Error)]
pub enum SocketError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("send failed: {0}")]
    SendFailed(String),
    #[error("receive failed: {0}")]
    ReceiveFailed(String),
    #[error("frame too large: {0} bytes")]
    FrameTooLarge(usize),
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
    #[error("connection closed")]
    ConnectionClosed,
}

/// Prefix `payload` with its 3-byte length.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, SocketError> {
    if payload.len() > MAX_FRAME_SIZE {
        return Err(SocketError::FrameTooLarge(payload.len()));
    }
    let mut frame = Vec::with_capacity(payload.len() + 3);
    let len = payload.len() as u32;
    frame.extend_from_slice(&len.to_be_bytes()[1..]);
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Strip and check the length prefix of one frame.
pub fn decode_frame(data: &[u8]) -> Result<&[u8], SocketError> {
    if data.len() < 3 {
        return Err(SocketError::InvalidFrame(format!("{} byte frame", data.len())));
    }
    let len = u32::from_be_bytes([0, data[0], data[1], data[2]]) as usize;
    let payload = &data[3..];
    if payload.len() != len {
        return Err(SocketError::InvalidFrame(format!(
            "length prefix {len} but {} payload bytes",
            payload.len()
        )));
    }
    Ok(payload)
}

/// An open connection to the gateway.
pub struct FrameSocket {
    ws: WsStream,
}

impl FrameSocket {
    pub async fn connect(url: &str) -> Result<Self, SocketError> {
        let (ws, _response) = connect_async(url)
            .await
            .map_err(|e| SocketError::ConnectionFailed(e.to_string()))?;
        Ok(Self { ws })
    }

    /// Split into independently owned halves.
    pub fn split(self) -> (FrameWriter, FrameReader) {
        let (sink, stream) = self.ws.split();
        (
            FrameWriter {
                sink,
                header_sent: false,
            },
            FrameReader { stream },
        )
    }
}

pub struct FrameWriter {
    sink: SplitSink<WsStream, Message>,
    header_sent: bool,
}

impl FrameWriter {
    pub async fn send(&mut self, payload: &[u8]) -> Result<(), SocketError> {
        let frame = encode_frame(payload)?;
        let data = if self.header_sent {
            frame
        } else {
            let mut data = Vec::with_capacity(CONN_HEADER.len() + frame.len());
            data.extend_from_slice(&CONN_HEADER);
            data.extend_from_slice(&frame);
            data
        };
        self.sink
            .send(Message::Binary(data))
            .await
            .map_err(|e| SocketError::SendFailed(e.to_string()))?;
        self.header_sent = true;
        Ok(())
    }

    pub async fn close(&mut self) -> Result<(), SocketError> {
        self.sink
            .close()
            .await
            .map_err(|e| SocketError::SendFailed(e.to_string()))
    }
}

pub struct FrameReader {
    stream: SplitStream<WsStream>,
}

impl FrameReader {
    /// Next frame payload. Control messages are skipped.
    pub async fn recv(&mut self) -> Result<Vec<u8>, SocketError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Binary(data))) => return Ok(decode_frame(&data)?.to_vec()),
                Some(Ok(Message::Close(_))) | None => return Err(SocketError::ConnectionClosed),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(SocketError::ReceiveFailed(e.to_string())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_length_prefix() {
        let frame = encode_frame(b"hello").unwrap();
        assert_eq!(&frame[..3], &[0, 0, 5]);
        assert_eq!(decode_frame(&frame).unwrap(), b"hello");
    }

    #[test]
    fn test_empty_payload() {
        let frame = encode_frame(&[]).unwrap();
        assert_eq!(frame, vec![0, 0, 0]);
        assert!(decode_frame(&frame).unwrap().is_empty());
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let payload = vec![0u8; MAX_FRAME_SIZE + 1];
        assert!(matches!(
            encode_frame(&payload),
            Err(SocketError::FrameTooLarge(n)) if n == MAX_FRAME_SIZE + 1
        ));
    }

    #[test]
    fn test_truncated_frames_rejected() {
        assert!(matches!(decode_frame(&[0, 1]), Err(SocketError::InvalidFrame(_))));
        assert!(matches!(decode_frame(&[0, 0, 4, 1, 2]), Err(SocketError::InvalidFrame(_))));
    }
}
