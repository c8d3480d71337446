//! Tracing layer that mirrors log lines into an admin Telegram chat.

use std::time::Duration;

use teloxide::prelude::*;
use teloxide::types::ChatId;
use tokio::sync::mpsc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

use crate::chatbot::message::{split_message, TELEGRAM_MAX_CHARS};

const FLUSH_INTERVAL: Duration = Duration::from_secs(5);
/// Flush early once this many INFO lines are queued.
const MAX_BATCH: usize = 50;

/// Log line with priority.
#[derive(Debug, PartialEq)]
enum LogLine {
    /// WARN/ERROR - sent right away
    Urgent(String),
    /// INFO - batched
    Info(String),
}

impl LogLine {
    fn from_event(level: Level, message: String) -> Option<Self> {
        match level {
            Level::ERROR => Some(LogLine::Urgent(format!("❌ {message}"))),
            Level::WARN => Some(LogLine::Urgent(format!("⚠️ {message}"))),
            Level::INFO => Some(LogLine::Info(message)),
            _ => None,
        }
    }
}

pub struct TelegramLogLayer {
    tx: mpsc::UnboundedSender<LogLine>,
}

impl TelegramLogLayer {
    /// Spawns the forwarding task; must be called inside a tokio runtime.
    pub fn new(bot: Bot, chat_id: ChatId) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<LogLine>();

        tokio::spawn(async move {
            let mut batch: Vec<String> = Vec::new();
            let mut interval = tokio::time::interval(FLUSH_INTERVAL);

            loop {
                tokio::select! {
                    line = rx.recv() => match line {
                        Some(LogLine::Urgent(text)) => post(&bot, chat_id, &text).await,
                        Some(LogLine::Info(text)) => {
                            batch.push(text);
                            if batch.len() >= MAX_BATCH {
                                flush(&bot, chat_id, &mut batch).await;
                            }
                        }
                        None => {
                            flush(&bot, chat_id, &mut batch).await;
                            break;
                        }
                    },
                    _ = interval.tick() => flush(&bot, chat_id, &mut batch).await,
                }
            }
        });

        Self { tx }
    }
}

async fn post(bot: &Bot, chat_id: ChatId, text: &str) {
    for chunk in split_message(text, TELEGRAM_MAX_CHARS) {
        // Logging from here would feed back into this layer
        if let Err(e) = bot.send_message(chat_id, chunk).await {
            eprintln!("Failed to send log to Telegram: {e}");
            return;
        }
    }
}

async fn flush(bot: &Bot, chat_id: ChatId, batch: &mut Vec<String>) {
    if batch.is_empty() {
        return;
    }
    let combined = batch.join("\n");
    batch.clear();
    post(bot, chat_id, &combined).await;
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.record_debug(field, &format_args!("{value}"));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else if self.message.is_empty() {
            self.message = format!("{} = {:?}", field.name(), value);
        } else {
            self.message.push_str(&format!(", {} = {:?}", field.name(), value));
        }
    }
}

impl<S: Subscriber> Layer<S> for TelegramLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        // Skip chatter from the HTTP stack
        if !meta.target().starts_with(env!("CARGO_CRATE_NAME")) {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        if let Some(line) = LogLine::from_event(*meta.level(), visitor.message)
            && self.tx.send(line).is_err()
        {
            eprintln!("Log channel closed, message dropped");
        }
    }
}
