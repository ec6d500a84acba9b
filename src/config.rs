use std::time::Duration;

use log::LevelFilter;

use crate::protocol::ClientConfig;
use crate::socket::DEFAULT_ENDPOINT;

/// Recipient of the scheduled message.
pub const DEFAULT_RECIPIENT: &str = "447808025786@s.whatsapp.net";
/// Body of the scheduled message.
pub const DEFAULT_MESSAGE: &str = "Hello from the updated WhatsMeow bot!";
/// Session database, created on first run.
pub const DEFAULT_DATABASE_URL: &str = "sqlite:session.db";
pub const DEFAULT_SEND_DELAY: Duration = Duration::from_secs(5);

/// Bot configuration. The defaults reproduce the fixed demo behaviour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotConfig {
    /// SQLite connection string for the session store.
    pub database_url: String,
    /// JID the scheduled message is addressed to, parsed when the delay elapses.
    pub recipient: String,
    /// Text of the scheduled message.
    pub message: String,
    /// Delay between login and the scheduled send.
    pub send_delay: Duration,
    /// Gateway WebSocket endpoint.
    pub endpoint: String,
    /// Identifier advertised in the hello stanza.
    pub user_agent: String,
    /// How long a send waits for the server acknowledgement.
    pub response_timeout: Duration,
    /// Render QR codes as terminal graphics under the raw code line.
    pub render_qr: bool,
    /// Level for records emitted by dependency crates through `log`.
    pub dependency_log_level: LevelFilter,
}

impl Default for BotConfig {
    fn default() -> Self {
        let client = ClientConfig::default();
        Self {
            database_url: DEFAULT_DATABASE_URL.into(),
            recipient: DEFAULT_RECIPIENT.into(),
            message: DEFAULT_MESSAGE.into(),
            send_delay: DEFAULT_SEND_DELAY,
            endpoint: DEFAULT_ENDPOINT.into(),
            user_agent: client.user_agent,
            response_timeout: client.response_timeout,
            render_qr: true,
            dependency_log_level: LevelFilter::Warn,
        }
    }
}

impl BotConfig {
    /// Override the session database.
    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = url.into();
        self
    }

    /// Override the scheduled message recipient.
    pub fn with_recipient(mut self, recipient: impl Into<String>) -> Self {
        self.recipient = recipient.into();
        self
    }

    /// Override the scheduled message text.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_send_delay(mut self, delay: Duration) -> Self {
        self.send_delay = delay;
        self
    }

    /// Override the gateway endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_render_qr(mut self, render: bool) -> Self {
        self.render_qr = render;
        self
    }

    pub fn with_dependency_log_level(mut self, level: LevelFilter) -> Self {
        self.dependency_log_level = level;
        self
    }

    /// Settings for the protocol client.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            endpoint: self.endpoint.clone(),
            user_agent: self.user_agent.clone(),
            response_timeout: self.response_timeout,
        }
    }
}
