use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use wa_bot::proto;
use wa_bot::protocol::{EventHandler, QRChannel};
use wa_bot::{
    Bot, BotConfig, BotError, ClientError, LoginPath, MessagingClient, PrefixLogger, QREvent,
    SendResponse, JID,
};

#[derive(Default)]
struct MockClient {
    id: Option<JID>,
    qr_events: Vec<QREvent>,
    refuse_connect: bool,
    calls: Mutex<Vec<&'static str>>,
    handlers: Mutex<usize>,
}

impl MockClient {
    fn paired() -> Self {
        Self {
            id: Some("447700900123:4@s.whatsapp.net".parse().unwrap()),
            ..Default::default()
        }
    }

    fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl MessagingClient for MockClient {
    fn store_id(&self) -> Option<JID> {
        self.id.clone()
    }

    fn add_event_handler(&self, _handler: EventHandler) -> u32 {
        let mut handlers = self.handlers.lock().unwrap();
        *handlers += 1;
        *handlers as u32
    }

    async fn qr_channel(&self) -> Result<QRChannel, ClientError> {
        self.record("qr_channel");
        let (tx, rx) = mpsc::channel(self.qr_events.len() + 1);
        for event in &self.qr_events {
            tx.try_send(event.clone()).unwrap();
        }
        Ok(rx)
    }

    async fn connect(&self) -> Result<(), ClientError> {
        self.record("connect");
        if self.refuse_connect {
            return Err(ClientError::NotConnected);
        }
        Ok(())
    }

    async fn send_message(
        &self,
        _to: &JID,
        _message: &proto::Message,
    ) -> Result<SendResponse, ClientError> {
        self.record("send_message");
        Err(ClientError::NotConnected)
    }

    async fn disconnect(&self) {
        self.record("disconnect");
    }
}

fn bot(client: &Arc<MockClient>) -> (Bot<MockClient>, PrefixLogger) {
    let log = PrefixLogger::capture();
    let config = BotConfig::default().with_render_qr(false);
    (
        Bot::new(Arc::clone(client), config, Arc::new(log.clone())),
        log,
    )
}

#[tokio::test]
async fn stored_identity_connects_without_pairing() {
    let client = Arc::new(MockClient::paired());
    let (bot, _log) = bot(&client);
    let mut out = Vec::new();

    let path = bot.login(&mut out).await.unwrap();

    assert_eq!(path, LoginPath::Resumed);
    assert_eq!(client.calls(), vec!["connect"]);
    assert!(out.is_empty());
}

#[tokio::test]
async fn missing_identity_pairs_and_prints_codes() {
    let client = Arc::new(MockClient {
        qr_events: vec![
            QREvent::Code {
                code: "2@ref,noise,identity,adv".into(),
                timeout: Duration::from_secs(60),
            },
            QREvent::Success,
        ],
        ..Default::default()
    });
    let (bot, _log) = bot(&client);
    let mut out = Vec::new();

    let path = bot.login(&mut out).await.unwrap();

    assert_eq!(path, LoginPath::Paired);
    assert_eq!(client.calls(), vec!["qr_channel", "connect"]);
    assert_eq!(
        String::from_utf8(out).unwrap(),
        "Scan the QR code below:\n\
         QR Code: 2@ref,noise,identity,adv\n\
         QR Event: success\n"
    );
}

#[tokio::test]
async fn pairing_timeout_ends_login() {
    let client = Arc::new(MockClient {
        qr_events: vec![QREvent::Timeout],
        ..Default::default()
    });
    let (bot, _log) = bot(&client);
    let mut out = Vec::new();

    assert_eq!(
        bot.login(&mut out).await.unwrap(),
        LoginPath::PairingFailed(Some(QREvent::Timeout))
    );
    assert!(String::from_utf8(out).unwrap().ends_with("QR Event: timeout\n"));
}

#[tokio::test]
async fn pairing_channel_closed_without_events_is_reported() {
    let client = Arc::new(MockClient::default());
    let (bot, log) = bot(&client);
    let mut out = Vec::new();

    assert_eq!(
        bot.login(&mut out).await.unwrap(),
        LoginPath::PairingFailed(None)
    );
    assert_eq!(String::from_utf8(out).unwrap(), "Scan the QR code below:\n");
    assert!(log
        .captured()
        .contains("[WARN] QR channel closed without a successful pairing"));
}

#[tokio::test]
async fn connect_failure_is_fatal() {
    let client = Arc::new(MockClient {
        refuse_connect: true,
        ..MockClient::paired()
    });
    let (bot, _log) = bot(&client);

    let err = bot.login(&mut Vec::new()).await.unwrap_err();

    assert!(matches!(err, BotError::Connect(_)));
    assert_eq!(err.to_string(), "Failed to connect: not connected");
}

#[tokio::test]
async fn run_registers_handler_and_disconnects_on_shutdown() {
    let client = Arc::new(MockClient::paired());
    let (bot, log) = bot(&client);

    let path = bot.run(&mut Vec::new(), async {}).await.unwrap();

    assert_eq!(path, LoginPath::Resumed);
    assert_eq!(*client.handlers.lock().unwrap(), 1);
    // the 5 second send never got a chance to run
    assert_eq!(client.calls(), vec!["connect", "disconnect"]);
    let out = log.captured();
    assert!(out.contains("[WARN] Shutting down before the scheduled message was sent"));
}
