use std::io;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use log::LevelFilter;
use wa_bot::config::{DEFAULT_DATABASE_URL, DEFAULT_MESSAGE, DEFAULT_RECIPIENT};
use wa_bot::socket::DEFAULT_ENDPOINT;
use wa_bot::bot::{load_device, open_store};
use wa_bot::{logger, Bot, BotConfig, BotError, Client, Logger, PrefixLogger};

/// Pair or resume a session, echo incoming texts and send one scheduled message.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// SQLite connection string of the session store.
    #[arg(long, default_value = DEFAULT_DATABASE_URL)]
    database: String,

    /// Recipient JID of the scheduled message.
    #[arg(long, default_value = DEFAULT_RECIPIENT)]
    recipient: String,

    /// Text of the scheduled message.
    #[arg(long, default_value = DEFAULT_MESSAGE)]
    message: String,

    /// Seconds to wait after login before sending.
    #[arg(long, default_value_t = 5)]
    delay_secs: u64,

    /// Gateway WebSocket endpoint.
    #[arg(long, default_value = DEFAULT_ENDPOINT)]
    endpoint: String,

    /// Override the user agent advertised by the client.
    #[arg(long)]
    user_agent: Option<String>,

    /// Print raw QR codes only, without terminal graphics.
    #[arg(long)]
    no_qr_render: bool,

    /// Log level for records from dependency crates.
    #[arg(long, default_value_t = LevelFilter::Warn)]
    dependency_log_level: LevelFilter,
}

impl Cli {
    fn into_config(self) -> BotConfig {
        let mut config = BotConfig::default()
            .with_database_url(self.database)
            .with_recipient(self.recipient)
            .with_message(self.message)
            .with_send_delay(Duration::from_secs(self.delay_secs))
            .with_endpoint(self.endpoint)
            .with_render_qr(!self.no_qr_render)
            .with_dependency_log_level(self.dependency_log_level);
        if let Some(agent) = self.user_agent {
            config = config.with_user_agent(agent);
        }
        config
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = Cli::parse().into_config();

    let console = PrefixLogger::stdout();
    if let Err(err) = logger::install(console.clone(), config.dependency_log_level) {
        eprintln!("Failed to install logger: {err}");
    }
    let log: Arc<dyn Logger> = Arc::new(console);

    match run(config, log).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: BotConfig, log: Arc<dyn Logger>) -> Result<(), BotError> {
    let container = open_store(&config.database_url, log.sub("Database")).await?;
    let device = load_device(&container).await?;

    let client = Arc::new(Client::new(
        device,
        container.clone(),
        config.client_config(),
        log.sub("Client"),
    ));
    let bot = Bot::new(client, config, log);

    let result = bot.run(&mut io::stdout(), shutdown_signal()).await;
    container.close().await;
    result.map(|_| ())
}

/// Resolves on Ctrl-C or SIGTERM. Never resolves if no signal can be watched.
async fn shutdown_signal() {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
