pub mod chatbot;
pub mod config;
pub mod openrouter;
pub mod telegram_log;
