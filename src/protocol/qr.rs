//! QR code pairing for linking a new device.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use qrcode::{render::unicode, QrCode};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::store::Device;

/// Events delivered on the QR channel. The channel closes after
/// `Success`, `Timeout`, `Error` or `ClientOutdated`.
#[derive(Debug, Clone, PartialEq)]
pub enum QREvent {
    /// New QR code to display
    Code {
        code: String,
        /// How long this code stays valid
        timeout: Duration,
    },
    Success,
    /// Every code expired without being scanned
    Timeout,
    Error(String),
    ClientOutdated,
}

impl QREvent {
    /// Short event name.
    pub fn event(&self) -> &'static str {
        match self {
            QREvent::Code { .. } => "code",
            QREvent::Success => "success",
            QREvent::Timeout => "timeout",
            QREvent::Error(_) => "error",
            QREvent::ClientOutdated => "err-client-outdated",
        }
    }
}

/// Receiving side of a pairing session.
pub type QRChannel = mpsc::Receiver<QREvent>;

/// Validity of the code at `index`: the first one lasts longer.
pub fn code_timeout(index: usize) -> Duration {
    if index == 0 {
        Duration::from_secs(60)
    } else {
        Duration::from_secs(20)
    }
}

/// QR code contents: `ref,noisePublicKey,identityPublicKey,advSecretKey`.
pub fn make_qr_data(reference: &str, device: &Device) -> String {
    format!(
        "{},{},{},{}",
        reference,
        B64.encode(device.noise_key.public),
        B64.encode(device.identity_key.public),
        B64.encode(device.adv_secret_key)
    )
}

#[derive(Debug, Error)]
pub enum QRError {
    #[error("QR generation failed: {0}")]
    GenerationFailed(#[from] qrcode::types::QrError),
}

/// Render QR data for a terminal.
pub fn render_qr(data: &str) -> Result<String, QRError> {
    let code = QrCode::new(data.as_bytes())?;
    Ok(code
        .render::<unicode::Dense1x2>()
        .dark_color(unicode::Dense1x2::Light)
        .light_color(unicode::Dense1x2::Dark)
        .build())
}

/// Emit each code in turn, waiting out its validity, then `Timeout`.
///
/// Returns early if the receiver is gone. The caller decides what happens
/// once every code has expired.
pub(crate) async fn rotate_codes(codes: Vec<String>, tx: mpsc::Sender<QREvent>) {
    for (index, code) in codes.into_iter().enumerate() {
        let timeout = code_timeout(index);
        if tx.send(QREvent::Code { code, timeout }).await.is_err() {
            return;
        }
        tokio::time::sleep(timeout).await;
    }
    let _ = tx.send(QREvent::Timeout).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qr_data_layout() {
        let device = Device::new();
        let data = make_qr_data("2@abc", &device);
        let parts: Vec<&str> = data.split(',').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], "2@abc");
        assert_eq!(B64.decode(parts[1]).unwrap(), device.noise_key.public);
        assert_eq!(B64.decode(parts[3]).unwrap(), device.adv_secret_key);
    }

    #[test]
    fn test_code_timeouts() {
        assert_eq!(code_timeout(0), Duration::from_secs(60));
        assert_eq!(code_timeout(1), Duration::from_secs(20));
        assert_eq!(code_timeout(5), Duration::from_secs(20));
    }

    #[test]
    fn test_event_names() {
        assert_eq!(QREvent::Success.event(), "success");
        assert_eq!(QREvent::Timeout.event(), "timeout");
        assert_eq!(QREvent::ClientOutdated.event(), "err-client-outdated");
    }

    #[test]
    fn test_qr_render() {
        let rendered = render_qr("2@abc,def,ghi,jkl").unwrap();
        assert!(rendered.lines().count() > 10);
    }

    #[tokio::test]
    async fn test_rotation_with_no_codes_times_out() {
        let (tx, mut rx) = mpsc::channel(4);
        rotate_codes(Vec::new(), tx).await;
        assert_eq!(rx.recv().await, Some(QREvent::Timeout));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_rotation_stops_when_receiver_dropped() {
        let (tx, rx) = mpsc::channel(4);
        drop(rx);
        // would sleep 60s if it kept going
        rotate_codes(vec!["a".into(), "b".into()], tx).await;
    }
}
