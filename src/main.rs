use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use teloxide::prelude::*;
use teloxide::update_listeners::polling_default;
use teloxide::utils::command::BotCommands;
use teloxide::{ApiError, RequestError};
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use totchat::chatbot::{Command, RelayService, RelaySettings, TelegramClient, UserRegistry};
use totchat::config::{Config, ConfigError};
use totchat::openrouter;
use totchat::telegram_log::TelegramLogLayer;

struct BotState {
    relay: RelayService,
    telegram: TelegramClient,
}

#[tokio::main]
async fn main() {
    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    let bot = Bot::new(&config.telegram_bot_token);
    let _log_guard = init_logging(&config, &bot);

    info!("🚀 TotChat bot starting...");
    info!("Cooldown: {:?}, placeholder: {}", config.cooldown, config.thinking_placeholder);

    let completions = match openrouter::Client::new(
        config.openrouter_api_key.clone(),
        config.model.clone(),
        config.api_url.clone(),
        config.request_timeout,
    ) {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to build HTTP client: {e}");
            std::process::exit(1);
        }
    };

    info!("Model: {}", completions.model());

    let registry = config.users_file.as_deref().map(UserRegistry::load_or_new);
    match registry {
        Some(ref r) => info!("User registry enabled ({} users)", r.len()),
        None => info!("User registry disabled (no users_file)"),
    }

    if !ensure_sole_poller(&bot).await {
        return;
    }

    if let Err(e) = bot.set_my_commands(Command::bot_commands()).await {
        warn!("Failed to register commands: {e}");
    }

    let state = Arc::new(BotState {
        relay: RelayService::new(RelaySettings::from_config(&config), completions, registry),
        telegram: TelegramClient::new(bot.clone()),
    });

    let handler = Update::filter_message()
        .branch(
            dptree::entry()
                .filter_command::<Command>()
                .endpoint(handle_command),
        )
        .branch(dptree::endpoint(handle_text));

    let mut dispatcher = Dispatcher::builder(bot.clone(), handler)
        .dependencies(dptree::deps![state.clone()])
        .enable_ctrlc_handler()
        .build();

    let shutdown = dispatcher.shutdown_token();
    let listener_errors = Arc::new(move |err: RequestError| {
        let shutdown = shutdown.clone();
        async move {
            if is_conflict(&err) {
                warn!("Another instance is polling this bot, shutting down");
                let _ = shutdown.shutdown();
            } else {
                error!("Polling error: {err}");
            }
        }
    });

    let listener = polling_default(bot).await;
    dispatcher.dispatch_with_listener(listener, listener_errors).await;

    let stats = state.relay.stats();
    info!(
        "Stopped ({} answered, {} rejected, {} failed)",
        stats.answered, stats.rejected, stats.failed
    );
}

/// Optional path argument; without it `totchat.json` is used when present.
fn load_config() -> Result<Config, ConfigError> {
    match std::env::args().nth(1) {
        Some(path) => Config::load(path),
        None if Path::new("totchat.json").exists() => Config::load("totchat.json"),
        None => Config::from_env(),
    }
}

fn init_logging(config: &Config, bot: &Bot) -> Option<WorkerGuard> {
    let log_dir = config.data_dir.join("logs");
    let log_file = std::fs::create_dir_all(&log_dir).and_then(|_| {
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_dir.join("totchat.log"))
    });

    let (file_writer, guard) = match log_file {
        Ok(file) => {
            let (writer, guard) = tracing_appender::non_blocking(file);
            (Some(writer), Some(guard))
        }
        Err(e) => {
            eprintln!("Failed to open log file in {}: {e}", log_dir.display());
            (None, None)
        }
    };

    let directives = std::env::var("RUST_LOG").ok();
    let filter = || log_filter(directives.as_deref());

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(filter()),
        )
        .with(file_writer.map(|writer| {
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(filter())
        }))
        .with(
            config
                .log_chat_id
                .map(|chat_id| TelegramLogLayer::new(bot.clone(), chat_id)),
        )
        .init();

    guard
}

/// `RUST_LOG` directives when set and valid, otherwise `info`.
fn log_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .filter(|d| !d.trim().is_empty())
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

fn is_conflict(err: &RequestError) -> bool {
    matches!(err, RequestError::Api(ApiError::TerminatedByOtherGetUpdates))
}

/// Returns false when another process is already polling with this token.
async fn ensure_sole_poller(bot: &Bot) -> bool {
    // Without an offset nothing is confirmed, so the dispatcher still sees these updates
    match bot.get_updates().limit(1).timeout(0).await {
        Ok(_) => true,
        Err(ref e) if is_conflict(e) => {
            warn!("Another instance is already polling this bot, exiting");
            false
        }
        Err(e) => {
            warn!("Startup polling check failed: {e}");
            true
        }
    }
}

async fn handle_command(msg: Message, cmd: Command, state: Arc<BotState>) -> ResponseResult<()> {
    let Some(ref user) = msg.from else {
        return Ok(());
    };

    state
        .relay
        .handle_command(&state.telegram, msg.chat.id.0, user.id.0, cmd)
        .await;
    Ok(())
}

async fn handle_text(msg: Message, state: Arc<BotState>) -> ResponseResult<()> {
    let Some(ref user) = msg.from else {
        return Ok(());
    };
    let Some(text) = msg.text() else {
        return Ok(());
    };

    // Unknown commands are not relayed
    if text.starts_with('/') {
        return Ok(());
    }

    state
        .relay
        .handle_text(&state.telegram, msg.chat.id.0, user.id.0, text, Utc::now())
        .await;
    Ok(())
}
