//! Chatbot module - relays Telegram messages to the completion API.

pub mod commands;
pub mod cooldown;
pub mod message;
pub mod registry;
pub mod service;
pub mod telegram;


pub use commands::Command;
pub use registry::UserRegistry;
pub use service::{RelayOutcome, RelayService, RelaySettings, RelayStats};
pub use telegram::{Outbox, TelegramClient};
