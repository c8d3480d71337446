//! Telegram client using teloxide.

use teloxide::prelude::*;
use teloxide::types::MessageId;
use tracing::warn;

use crate::chatbot::commands::main_menu;

/// Where the relay sends its replies.
#[allow(async_fn_in_trait)]
pub trait Outbox {
    /// Send a plain message, returning its message ID.
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<i64, String>;

    /// Send a message with the main reply keyboard attached.
    async fn send_menu(&self, chat_id: i64, text: &str) -> Result<i64, String>;

    /// Replace the text of a message sent earlier.
    async fn edit_text(&self, chat_id: i64, message_id: i64, text: &str) -> Result<(), String>;
}

/// Telegram API client.
#[derive(Clone)]
pub struct TelegramClient {
    bot: Bot,
}

impl TelegramClient {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

impl Outbox for TelegramClient {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<i64, String> {
        self.bot
            .send_message(ChatId(chat_id), text)
            .await
            .map(|msg| msg.id.0 as i64)
            .map_err(|e| {
                let msg = format!("Failed to send: {e}");
                warn!("{}", msg);
                msg
            })
    }

    async fn send_menu(&self, chat_id: i64, text: &str) -> Result<i64, String> {
        self.bot
            .send_message(ChatId(chat_id), text)
            .reply_markup(main_menu())
            .await
            .map(|msg| msg.id.0 as i64)
            .map_err(|e| {
                let msg = format!("Failed to send menu: {e}");
                warn!("{}", msg);
                msg
            })
    }

    async fn edit_text(&self, chat_id: i64, message_id: i64, text: &str) -> Result<(), String> {
        self.bot
            .edit_message_text(ChatId(chat_id), MessageId(message_id as i32), text)
            .await
            .map(|_| ())
            .map_err(|e| {
                let msg = format!("Failed to edit message {message_id}: {e}");
                warn!("{}", msg);
                msg
            })
    }
}
