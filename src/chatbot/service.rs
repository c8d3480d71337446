//! Relay service - forwards user text to the completion API and replies.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::chatbot::commands::{replies, Command};
use crate::chatbot::cooldown::CooldownGate;
use crate::chatbot::message::{preview, split_message, TELEGRAM_MAX_CHARS};
use crate::chatbot::registry::{Registration, UserRegistry};
use crate::chatbot::telegram::Outbox;
use crate::config::Config;
use crate::openrouter::{self, Message};

/// Relay behaviour knobs.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub system_prompt: String,
    pub cooldown: Duration,
    pub thinking_placeholder: bool,
    pub support_contact: String,
}

impl RelaySettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            system_prompt: config.system_prompt.clone(),
            cooldown: config.cooldown,
            thinking_placeholder: config.thinking_placeholder,
            support_contact: config.support_contact.clone(),
        }
    }
}

/// What happened to one inbound text.
#[derive(Debug)]
pub enum RelayOutcome {
    /// The model answered; holds the raw answer text.
    Answered(String),
    /// Rejected by the cooldown gate; no upstream call was made.
    CoolingDown(Duration),
    /// The upstream call failed; the user got the apology.
    Failed(openrouter::Error),
    /// The text was a menu button and was handled as a command.
    Command(Command),
}

/// Snapshot of the relay counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub answered: u64,
    pub rejected: u64,
    pub failed: u64,
}

#[derive(Default)]
struct Counters {
    answered: AtomicU64,
    rejected: AtomicU64,
    failed: AtomicU64,
}

/// All relay state, built once at startup.
pub struct RelayService {
    settings: RelaySettings,
    completions: openrouter::Client,
    cooldown: CooldownGate,
    registry: Option<Mutex<UserRegistry>>,
    counters: Counters,
}

impl RelayService {
    pub fn new(
        settings: RelaySettings,
        completions: openrouter::Client,
        registry: Option<UserRegistry>,
    ) -> Self {
        let cooldown = CooldownGate::new(settings.cooldown);
        Self {
            settings,
            completions,
            cooldown,
            registry: registry.map(Mutex::new),
            counters: Counters::default(),
        }
    }

    pub fn stats(&self) -> RelayStats {
        RelayStats {
            answered: self.counters.answered.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    pub async fn registered_users(&self) -> Option<usize> {
        match self.registry {
            Some(ref registry) => Some(registry.lock().await.len()),
            None => None,
        }
    }

    /// Cooldown check plus completion call, without any chat I/O.
    pub async fn relay(&self, user_id: u64, text: &str, now: DateTime<Utc>) -> RelayOutcome {
        if let Err(remaining) = self.admit(user_id, now).await {
            return RelayOutcome::CoolingDown(remaining);
        }
        self.complete(user_id, text).await
    }

    /// Handle an inbound text message end to end.
    pub async fn handle_text<O: Outbox>(
        &self,
        outbox: &O,
        chat_id: i64,
        user_id: u64,
        text: &str,
        now: DateTime<Utc>,
    ) -> RelayOutcome {
        if let Some(command) = Command::from_button(text) {
            self.handle_command(outbox, chat_id, user_id, command).await;
            return RelayOutcome::Command(command);
        }

        info!("User {} sent: \"{}\"", user_id, preview(text));

        if let Err(remaining) = self.admit(user_id, now).await {
            outbox.send_text(chat_id, &replies::cooldown(remaining)).await.ok();
            return RelayOutcome::CoolingDown(remaining);
        }

        let placeholder = if self.settings.thinking_placeholder {
            outbox.send_text(chat_id, replies::THINKING).await.ok()
        } else {
            None
        };

        let outcome = self.complete(user_id, text).await;
        let reply = match (&outcome, placeholder) {
            (RelayOutcome::Answered(answer), Some(_)) => format!("{}{}", replies::ANSWER_PREFIX, answer),
            (RelayOutcome::Answered(answer), None) => answer.clone(),
            _ => replies::APOLOGY.to_string(),
        };

        deliver(outbox, chat_id, placeholder, &reply).await;
        outcome
    }

    pub async fn handle_command<O: Outbox>(&self, outbox: &O, chat_id: i64, user_id: u64, command: Command) {
        info!("User {} ran {:?}", user_id, command);

        match command {
            Command::Start => {
                let total = self.register(user_id).await;
                outbox.send_menu(chat_id, &replies::welcome(total)).await.ok();
            }
            Command::Help => {
                outbox.send_text(chat_id, &replies::help()).await.ok();
            }
            Command::Tp => {
                outbox
                    .send_text(chat_id, &replies::support(&self.settings.support_contact))
                    .await
                    .ok();
            }
            Command::Tos => {
                outbox.send_text(chat_id, replies::TERMS).await.ok();
            }
        }
    }

    async fn admit(&self, user_id: u64, now: DateTime<Utc>) -> Result<(), Duration> {
        let result = self.cooldown.admit(user_id, now).await;
        if let Err(remaining) = result {
            let rejected = self.counters.rejected.fetch_add(1, Ordering::Relaxed) + 1;
            info!("⏳ User {} on cooldown ({:?} left, {} rejected total)", user_id, remaining, rejected);
        }
        result
    }

    async fn complete(&self, user_id: u64, text: &str) -> RelayOutcome {
        let messages = [
            Message::system(self.settings.system_prompt.as_str()),
            Message::user(text),
        ];

        match self.completions.complete(&messages).await {
            Ok(answer) => {
                let answered = self.counters.answered.fetch_add(1, Ordering::Relaxed) + 1;
                info!("✅ Answered user {} ({} chars, {} answered total)", user_id, answer.chars().count(), answered);
                RelayOutcome::Answered(answer)
            }
            Err(e) => {
                let failed = self.counters.failed.fetch_add(1, Ordering::Relaxed) + 1;
                error!("ERROR for user {}: {} ({} failed total)", user_id, e, failed);
                RelayOutcome::Failed(e)
            }
        }
    }

    /// Returns the user count, or `None` when the registry is off.
    async fn register(&self, user_id: u64) -> Option<usize> {
        let registry = self.registry.as_ref()?;
        let mut registry = registry.lock().await;

        match registry.register(user_id) {
            Ok(registration) => {
                if let Registration::New { total } = registration {
                    info!("🆕 New user {} ({} total)", user_id, total);
                }
                Some(registration.total())
            }
            Err(e) => {
                warn!("Failed to persist user {}: {e}", user_id);
                Some(registry.len())
            }
        }
    }
}

/// Put `text` in the placeholder if there is one, splitting past the Telegram limit.
async fn deliver<O: Outbox>(outbox: &O, chat_id: i64, placeholder: Option<i64>, text: &str) {
    let mut chunks = split_message(text, TELEGRAM_MAX_CHARS).into_iter();
    let Some(first) = chunks.next() else {
        return;
    };

    let edited = match placeholder {
        Some(message_id) => outbox.edit_text(chat_id, message_id, &first).await.is_ok(),
        None => false,
    };
    if !edited {
        outbox.send_text(chat_id, &first).await.ok();
    }

    for chunk in chunks {
        outbox.send_text(chat_id, &chunk).await.ok();
    }
}
