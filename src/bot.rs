//! Startup sequence: login, echo incoming texts, send one scheduled message.

use std::future::Future;
use std::io::{self, Write};
use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinHandle;

use crate::config::BotConfig;
use crate::logger::Logger;
use crate::proto;
use crate::protocol::qr;
use crate::protocol::{ClientError, EventHandler, MessagingClient, QREvent, SendResponse};
use crate::store::{Container, Device, StoreError};
use crate::types::{Event, JID};

/// Fatal startup failures. Each one ends the process.
#[derive(Debug, Error)]
pub enum BotError {
    #[error("Database error: {0}")]
    Database(#[source] StoreError),
    #[error("Device store error: {0}")]
    DeviceStore(#[source] StoreError),
    #[error("Failed to connect: {0}")]
    Connect(#[source] ClientError),
    #[error("Failed to write output: {0}")]
    Output(#[from] io::Error),
}

/// Which branch `login` took and how it ended.
#[derive(Debug, Clone, PartialEq)]
pub enum LoginPath {
    /// No stored identity: paired through the QR channel.
    Paired,
    /// No stored identity, and the QR channel closed without a successful
    /// pairing. Holds its last event, if any.
    PairingFailed(Option<QREvent>),
    /// Stored identity: connected directly.
    Resumed,
}

/// Open the session store at `url`.
pub async fn open_store(url: &str, log: Arc<dyn Logger>) -> Result<Container, BotError> {
    Container::open(url, log).await.map_err(BotError::Database)
}

/// First stored device, or a fresh unsaved one.
pub async fn load_device(container: &Container) -> Result<Device, BotError> {
    container
        .get_first_device()
        .await
        .map_err(BotError::DeviceStore)
}

/// Console line for a plain-text message event, `None` for anything else.
pub fn incoming_line(event: &Event) -> Option<String> {
    match event {
        Event::Message(msg) => msg
            .conversation()
            .map(|text| format!("Incoming message from {}: {}", msg.info.sender.user, text)),
        _ => None,
    }
}

/// Handler echoing plain-text messages to stdout.
pub fn echo_handler() -> EventHandler {
    Box::new(|event| {
        if let Some(line) = incoming_line(&event) {
            println!("{line}");
        }
    })
}

/// Parse `recipient`, send `text` to it and log the outcome.
///
/// Failures are logged and reported as `None`; they never propagate.
pub async fn send_once<C>(
    client: &C,
    recipient: &str,
    text: &str,
    log: &dyn Logger,
) -> Option<SendResponse>
where
    C: MessagingClient + ?Sized,
{
    let to: JID = match recipient.parse() {
        Ok(jid) => jid,
        Err(err) => {
            log.errorf(format_args!("Invalid JID: {err}"));
            return None;
        }
    };

    let message = proto::Message::text(text);
    match client.send_message(&to, &message).await {
        Ok(response) => {
            log.infof(format_args!(
                "Message sent; server timestamp: {}",
                response.timestamp
            ));
            Some(response)
        }
        Err(err) => {
            log.errorf(format_args!("Send message error: {err}"));
            None
        }
    }
}

/// Handle to the scheduled send task.
pub struct DelayedSend {
    handle: JoinHandle<Option<SendResponse>>,
    log: Arc<dyn Logger>,
}

impl DelayedSend {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the task to run to completion.
    pub async fn join(self) -> Option<SendResponse> {
        match self.handle.await {
            Ok(response) => response,
            Err(err) => {
                self.log
                    .errorf(format_args!("Scheduled send task failed: {err}"));
                None
            }
        }
    }

    /// Collect the result if the task is done, otherwise abort it with a warning.
    pub async fn finish(self) -> Option<SendResponse> {
        if self.handle.is_finished() {
            return self.join().await;
        }
        self.log.warnf(format_args!(
            "Shutting down before the scheduled message was sent, abandoning it"
        ));
        self.handle.abort();
        None
    }
}

pub struct Bot<C: ?Sized> {
    client: Arc<C>,
    config: BotConfig,
    log: Arc<dyn Logger>,
}

impl<C> Bot<C>
where
    C: MessagingClient + ?Sized + 'static,
{
    pub fn new(client: Arc<C>, config: BotConfig, log: Arc<dyn Logger>) -> Self {
        Self {
            client,
            config,
            log,
        }
    }

    /// Pair through the QR channel if the device has no identity, otherwise
    /// connect directly.
    pub async fn login<W: Write>(&self, out: &mut W) -> Result<LoginPath, BotError> {
        if let Some(id) = self.client.store_id() {
            self.log.debugf(format_args!("Resuming session as {id}"));
            self.client.connect().await.map_err(BotError::Connect)?;
            return Ok(LoginPath::Resumed);
        }

        let mut events = self.client.qr_channel().await.map_err(BotError::Connect)?;
        self.client.connect().await.map_err(BotError::Connect)?;

        writeln!(out, "Scan the QR code below:")?;
        let mut last = None;
        while let Some(event) = events.recv().await {
            match &event {
                QREvent::Code { code, .. } => {
                    writeln!(out, "QR Code: {code}")?;
                    if self.config.render_qr {
                        match qr::render_qr(code) {
                            Ok(rendered) => writeln!(out, "{rendered}")?,
                            Err(err) => self.log.warnf(format_args!("{err}")),
                        }
                    }
                }
                other => {
                    if let QREvent::Error(reason) = other {
                        self.log.errorf(format_args!("Pairing failed: {reason}"));
                    }
                    writeln!(out, "QR Event: {}", other.event())?;
                }
            }
            out.flush()?;
            last = Some(event);
        }

        if last == Some(QREvent::Success) {
            return Ok(LoginPath::Paired);
        }
        self.log
            .warnf(format_args!("QR channel closed without a successful pairing"));
        Ok(LoginPath::PairingFailed(last))
    }

    /// Start the delayed send on its own task.
    pub fn schedule_send(&self) -> DelayedSend {
        let client = Arc::clone(&self.client);
        let log = Arc::clone(&self.log);
        let recipient = self.config.recipient.clone();
        let text = self.config.message.clone();
        let delay = self.config.send_delay;

        let handle = tokio::spawn({
            let log = Arc::clone(&log);
            async move {
                tokio::time::sleep(delay).await;
                send_once(client.as_ref(), &recipient, &text, log.as_ref()).await
            }
        });
        DelayedSend { handle, log }
    }

    /// Register the echo handler, log in, schedule the send and stay up
    /// until `shutdown` completes.
    pub async fn run<W, F>(&self, out: &mut W, shutdown: F) -> Result<LoginPath, BotError>
    where
        W: Write,
        F: Future<Output = ()>,
    {
        self.client.add_event_handler(echo_handler());
        let path = self.login(out).await?;
        let send = self.schedule_send();

        shutdown.await;
        self.log.infof(format_args!("Shutting down"));
        send.finish().await;
        self.client.disconnect().await;
        Ok(path)
    }
}
