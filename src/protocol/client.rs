//! Gateway client.
//!
//! Owns the device, the socket and the event handlers. A background reader
//! task decodes incoming stanzas and dispatches events.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::logger::Logger;
use crate::proto;
use crate::protocol::qr::{self, QRChannel, QREvent};
use crate::protocol::stanza::{self, Stanza, FAILURE_CLIENT_OUTDATED, FAILURE_LOGGED_OUT};
use crate::protocol::traits::{ClientError, EventHandler, MessagingClient, SendResponse};
use crate::socket::{FrameReader, FrameSocket, FrameWriter, SocketError, DEFAULT_ENDPOINT};
use crate::store::{Container, Device};
use crate::types::{
    servers, Connected, DisconnectReason, Disconnected, Event, LoggedOut, Message, MessageID,
    MessageInfo, PairSuccess, StreamError, JID,
};

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket endpoint URL
    pub endpoint: String,
    pub user_agent: String,
    /// How long `send_message` waits for the server ack
    pub response_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            user_agent: concat!("wa-bot/", env!("CARGO_PKG_VERSION")).to_string(),
            response_timeout: Duration::from_secs(75),
        }
    }
}

/// Client bound to one device. Cheap to share behind an `Arc`.
pub struct Client {
    inner: Arc<Inner>,
}

struct QRState {
    tx: mpsc::Sender<QREvent>,
    rotation: Option<JoinHandle<()>>,
}

struct Inner {
    config: ClientConfig,
    container: Container,
    device: RwLock<Device>,
    log: Arc<dyn Logger>,
    handlers: RwLock<Vec<(u32, EventHandler)>>,
    next_handler_id: AtomicU32,
    writer: tokio::sync::Mutex<Option<FrameWriter>>,
    reader: Mutex<Option<JoinHandle<()>>>,
    qr: Mutex<Option<QRState>>,
    pending: Mutex<HashMap<MessageID, oneshot::Sender<SendResponse>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Client {
    pub fn new(device: Device, container: Container, config: ClientConfig, log: Arc<dyn Logger>) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                container,
                device: RwLock::new(device),
                log,
                handlers: RwLock::new(Vec::new()),
                next_handler_id: AtomicU32::new(1),
                writer: tokio::sync::Mutex::new(None),
                reader: Mutex::new(None),
                qr: Mutex::new(None),
                pending: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.inner.writer.lock().await.is_some()
    }
}

#[async_trait]
impl MessagingClient for Client {
    fn store_id(&self) -> Option<JID> {
        self.inner.device().id
    }

    fn add_event_handler(&self, handler: EventHandler) -> u32 {
        let id = self.inner.next_handler_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, handler));
        id
    }

    async fn qr_channel(&self) -> Result<QRChannel, ClientError> {
        if self.store_id().is_some() {
            return Err(ClientError::QRStoreContainsID);
        }
        if self.is_connected().await {
            return Err(ClientError::AlreadyConnected);
        }
        let (tx, rx) = mpsc::channel(8);
        *lock(&self.inner.qr) = Some(QRState { tx, rotation: None });
        Ok(rx)
    }

    async fn connect(&self) -> Result<(), ClientError> {
        let mut slot = self.inner.writer.lock().await;
        if slot.is_some() {
            return Err(ClientError::AlreadyConnected);
        }

        let endpoint = &self.inner.config.endpoint;
        self.inner
            .log
            .debugf(format_args!("Dialing {endpoint}"));
        let (mut writer, reader) = FrameSocket::connect(endpoint).await?.split();

        let hello = {
            let device = self.inner.device();
            Stanza::Hello {
                user_agent: self.inner.config.user_agent.clone(),
                jid: device.id.as_ref().map(JID::to_string),
                registration_id: device.registration_id,
                noise_key: B64.encode(device.noise_key.public),
            }
        };
        writer.send(&stanza::encode(&hello)?).await?;
        *slot = Some(writer);
        drop(slot);

        let handle = tokio::spawn(Arc::clone(&self.inner).read_loop(reader));
        *lock(&self.inner.reader) = Some(handle);
        self.inner
            .log
            .infof(format_args!("Connected to {endpoint}"));
        Ok(())
    }

    async fn send_message(
        &self,
        to: &JID,
        message: &proto::Message,
    ) -> Result<SendResponse, ClientError> {
        if !servers::MESSAGEABLE.contains(&to.server.as_str()) {
            return Err(ClientError::UnknownServer(to.server.clone()));
        }
        if self.store_id().is_none() {
            return Err(ClientError::NotLoggedIn);
        }

        let id = stanza::generate_message_id();
        let out = Stanza::Message {
            id: id.clone(),
            to: Some(to.to_string()),
            from: None,
            participant: None,
            push_name: None,
            timestamp: None,
            payload: stanza::encode_payload(message),
        };
        let data = stanza::encode(&out)?;

        let (ack_tx, ack_rx) = oneshot::channel();
        lock(&self.inner.pending).insert(id.clone(), ack_tx);

        let sent = match self.inner.writer.lock().await.as_mut() {
            Some(writer) => writer.send(&data).await.map_err(ClientError::from),
            None => Err(ClientError::NotConnected),
        };
        if let Err(err) = sent {
            lock(&self.inner.pending).remove(&id);
            return Err(err);
        }
        self.inner
            .log
            .debugf(format_args!("Sent message {id} to {to}"));

        match tokio::time::timeout(self.inner.config.response_timeout, ack_rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(ClientError::Disconnected),
            Err(_) => {
                lock(&self.inner.pending).remove(&id);
                Err(ClientError::Timeout(id))
            }
        }
    }

    async fn disconnect(&self) {
        self.inner.disconnect(DisconnectReason::Requested).await;
    }
}

impl Inner {
    fn device(&self) -> Device {
        self.device
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn own_id(&self) -> Option<JID> {
        self.device
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .id
            .clone()
    }

    fn dispatch(&self, event: Event) {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        for (_, handler) in handlers.iter() {
            handler(event.clone());
        }
    }

    fn take_qr(&self) -> Option<QRState> {
        lock(&self.qr).take()
    }

    /// Close the pairing session with a final event.
    async fn finish_qr(&self, event: QREvent) {
        if let Some(state) = self.take_qr() {
            if let Some(rotation) = state.rotation {
                rotation.abort();
            }
            let _ = state.tx.send(event).await;
        }
    }

    async fn read_loop(self: Arc<Self>, mut reader: FrameReader) {
        loop {
            match reader.recv().await {
                Ok(payload) => match stanza::decode(&payload) {
                    Ok(stanza) => self.handle_stanza(stanza).await,
                    Err(err) => self
                        .log
                        .warnf(format_args!("Dropping undecodable stanza: {err}")),
                },
                Err(SocketError::ConnectionClosed) => {
                    self.on_closed(DisconnectReason::ServerClosed).await;
                    return;
                }
                Err(err) => {
                    self.log.errorf(format_args!("Error reading from socket: {err}"));
                    self.on_closed(DisconnectReason::NetworkError(err.to_string()))
                        .await;
                    return;
                }
            }
        }
    }

    /// The connection went away on its own.
    async fn on_closed(&self, reason: DisconnectReason) {
        let was_connected = self.writer.lock().await.take().is_some();
        lock(&self.reader).take();
        lock(&self.pending).clear();
        self.finish_qr(QREvent::Error("connection closed during pairing".into()))
            .await;
        if was_connected {
            self.log
                .warnf(format_args!("Disconnected from server: {reason:?}"));
            self.dispatch(Event::Disconnected(Disconnected { reason }));
        }
    }

    async fn disconnect(&self, reason: DisconnectReason) {
        let reader = lock(&self.reader).take();
        if let Some(reader) = reader {
            reader.abort();
        }
        let writer = self.writer.lock().await.take();
        lock(&self.pending).clear();
        if let Some(state) = self.take_qr() {
            if let Some(rotation) = state.rotation {
                rotation.abort();
            }
        }
        if let Some(mut writer) = writer {
            if let Err(err) = writer.close().await {
                self.log
                    .debugf(format_args!("Error closing socket: {err}"));
            }
            self.dispatch(Event::Disconnected(Disconnected { reason }));
        }
    }

    async fn handle_stanza(self: &Arc<Self>, stanza: Stanza) {
        match stanza {
            Stanza::PairRefs { refs } => self.handle_pair_refs(refs),
            Stanza::PairSuccess {
                jid,
                platform,
                business_name,
            } => self.handle_pair_success(&jid, platform, business_name).await,
            Stanza::Success => {
                self.log.infof(format_args!("Successfully authenticated"));
                self.dispatch(Event::Connected(Connected));
            }
            Stanza::Message {
                id,
                from,
                participant,
                push_name,
                timestamp,
                payload,
                ..
            } => {
                self.handle_message(id, from, participant, push_name, timestamp, &payload)
                    .await
            }
            Stanza::Ack { id, timestamp } => {
                let waiter = lock(&self.pending).remove(&id);
                match waiter {
                    Some(waiter) => {
                        let timestamp = DateTime::from_timestamp(timestamp, 0).unwrap_or_else(Utc::now);
                        let _ = waiter.send(SendResponse { id, timestamp });
                    }
                    None => self
                        .log
                        .debugf(format_args!("Ignoring ack for unknown message {id}")),
                }
            }
            Stanza::Failure { reason, message } => self.handle_failure(reason, message).await,
            Stanza::StreamError { code } => {
                self.log.errorf(format_args!("Stream error: {code}"));
                self.dispatch(Event::StreamError(StreamError { code }));
            }
            Stanza::Hello { .. } => self
                .log
                .warnf(format_args!("Unexpected hello stanza from server")),
        }
    }

    fn handle_pair_refs(self: &Arc<Self>, refs: Vec<String>) {
        let mut qr = lock(&self.qr);
        let Some(state) = qr.as_mut() else {
            self.log
                .warnf(format_args!("Got pairing references without a QR channel"));
            return;
        };
        if let Some(previous) = state.rotation.take() {
            previous.abort();
        }

        let device = self.device();
        let codes: Vec<String> = refs.iter().map(|r| qr::make_qr_data(r, &device)).collect();
        let tx = state.tx.clone();
        let inner = Arc::clone(self);
        state.rotation = Some(tokio::spawn(async move {
            qr::rotate_codes(codes, tx).await;
            // Dropping the state closes the channel once our sender is gone.
            inner.take_qr();
            inner.disconnect(DisconnectReason::Requested).await;
        }));
    }

    async fn handle_pair_success(&self, jid: &str, platform: String, business_name: String) {
        let id: JID = match jid.parse() {
            Ok(id) => id,
            Err(err) => {
                self.log
                    .errorf(format_args!("Invalid JID in pair success: {err}"));
                self.finish_qr(QREvent::Error(err.to_string())).await;
                return;
            }
        };

        let device = {
            let mut device = self.device.write().unwrap_or_else(PoisonError::into_inner);
            device.id = Some(id.clone());
            device.platform = platform.clone();
            device.business_name = business_name.clone();
            device.clone()
        };

        if let Err(err) = self.container.put_device(&device).await {
            self.log
                .errorf(format_args!("Failed to save device after pairing: {err}"));
            self.finish_qr(QREvent::Error(err.to_string())).await;
            return;
        }

        self.log
            .infof(format_args!("Successfully paired as {id}"));
        self.dispatch(Event::PairSuccess(PairSuccess {
            id,
            platform,
            business_name,
        }));
        self.finish_qr(QREvent::Success).await;
    }

    async fn handle_message(
        &self,
        id: String,
        from: Option<String>,
        participant: Option<String>,
        push_name: Option<String>,
        timestamp: Option<i64>,
        payload: &str,
    ) {
        let Some(chat) = from.as_deref().and_then(|f| f.parse::<JID>().ok()) else {
            self.log
                .warnf(format_args!("Dropping message {id} with missing or invalid sender"));
            return;
        };
        let sender = participant
            .as_deref()
            .and_then(|p| p.parse::<JID>().ok())
            .unwrap_or_else(|| chat.clone());
        let message = match stanza::decode_payload(payload) {
            Ok(message) => message,
            Err(err) => {
                self.log
                    .warnf(format_args!("Failed to decode message {id}: {err}"));
                return;
            }
        };

        let own = self.own_id();
        if let (Some(own), Some(name)) = (own.as_ref(), push_name.as_deref()) {
            if let Err(err) = self.container.put_push_name(own, &sender, name).await {
                self.log
                    .warnf(format_args!("Failed to store push name of {sender}: {err}"));
            }
        }

        let info = MessageInfo {
            id,
            is_from_me: own.is_some_and(|own| own.user == sender.user),
            is_group: chat.is_group(),
            sender,
            chat,
            timestamp: timestamp
                .and_then(|t| DateTime::from_timestamp(t, 0))
                .unwrap_or_else(Utc::now),
            push_name,
        };
        self.dispatch(Event::Message(Message { info, message }));
    }

    async fn handle_failure(&self, reason: u16, message: Option<String>) {
        if reason == FAILURE_CLIENT_OUTDATED {
            self.log
                .errorf(format_args!("Client outdated, the gateway refused this version"));
            self.finish_qr(QREvent::ClientOutdated).await;
        }
        if reason != FAILURE_LOGGED_OUT {
            self.log
                .errorf(format_args!("Connect failure {reason}: {}", message.as_deref().unwrap_or("")));
            self.dispatch(Event::StreamError(StreamError {
                code: reason.to_string(),
            }));
            return;
        }

        self.log.warnf(format_args!("Got logged out"));
        let previous = self
            .device
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .id
            .take();
        if let Some(previous) = previous {
            if let Err(err) = self.container.delete_device(&previous).await {
                self.log
                    .errorf(format_args!("Failed to delete device data: {err}"));
            }
        }
        self.dispatch(Event::LoggedOut(LoggedOut { reason: message }));
    }
}
