//! Slash commands, reply keyboard, and fixed reply texts.

use std::time::Duration;

use teloxide::types::{KeyboardButton, KeyboardMarkup};
use teloxide::utils::command::BotCommands;

#[derive(BotCommands, Clone, Copy, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Команды TotChat:")]
pub enum Command {
    #[command(description = "начать и показать меню")]
    Start,
    #[command(description = "как пользоваться ботом")]
    Help,
    #[command(description = "техподдержка")]
    Tp,
    #[command(description = "условия использования")]
    Tos,
}

pub const BUTTON_HELP: &str = "❓ Помощь";
pub const BUTTON_SUPPORT: &str = "🛠 Поддержка";
pub const BUTTON_TERMS: &str = "📜 Условия";

impl Command {
    /// Map a reply-keyboard button label to its command.
    pub fn from_button(text: &str) -> Option<Self> {
        match text.trim() {
            BUTTON_HELP => Some(Command::Help),
            BUTTON_SUPPORT => Some(Command::Tp),
            BUTTON_TERMS => Some(Command::Tos),
            _ => None,
        }
    }
}

pub fn main_menu() -> KeyboardMarkup {
    KeyboardMarkup::new(vec![
        vec![KeyboardButton::new(BUTTON_HELP)],
        vec![KeyboardButton::new(BUTTON_SUPPORT), KeyboardButton::new(BUTTON_TERMS)],
    ])
    .resize_keyboard()
}

pub mod replies {
    use super::*;

    pub const THINKING: &str = "🤔 Думаю...";
    pub const ANSWER_PREFIX: &str = "💡 ";
    pub const APOLOGY: &str = "⚠️ Произошла временная ошибка. Попробуй чуть позже.";

    pub const TERMS: &str = "📜 Условия использования TotChat\n\n\
        1. Ответы генерирует нейросеть и могут содержать ошибки. Проверяй важную информацию.\n\
        2. Не отправляй пароли, номера карт и другие личные данные.\n\
        3. Запрещено использовать бота для незаконных целей.\n\
        4. Сообщения передаются стороннему сервису для генерации ответа.\n\
        5. Сервис предоставляется «как есть», без гарантий доступности.";

    pub fn cooldown(remaining: Duration) -> String {
        // Whole seconds, rounded up, never zero
        let secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
        format!("⏳ Не так быстро! Подожди {} сек. перед следующим сообщением.", secs.max(1))
    }

    pub fn welcome(total_users: Option<usize>) -> String {
        let mut text = String::from(
            "👋 Привет! Я TotChat — умный ИИ-помощник.\n\
             Просто напиши вопрос, и я постараюсь помочь.",
        );
        if let Some(total) = total_users {
            text.push_str(&format!("\n\n👥 Нас уже {total}!"));
        }
        text
    }

    pub fn help() -> String {
        format!(
            "ℹ️ Напиши любой вопрос обычным сообщением — я отвечу.\n\
             Между сообщениями нужна небольшая пауза.\n\n{}",
            Command::descriptions()
        )
    }

    pub fn support(contact: &str) -> String {
        format!("🛠 Техподдержка: {contact}\nОпиши проблему, и тебе помогут.")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("/start", "totchat_bot").unwrap(), Command::Start);
        assert_eq!(Command::parse("/help", "totchat_bot").unwrap(), Command::Help);
        assert_eq!(Command::parse("/tp", "totchat_bot").unwrap(), Command::Tp);
        assert_eq!(Command::parse("/tos@totchat_bot", "totchat_bot").unwrap(), Command::Tos);
        assert!(Command::parse("/unknown", "totchat_bot").is_err());
        assert!(Command::parse("hello", "totchat_bot").is_err());
    }

    #[test]
    fn test_buttons_map_to_commands() {
        assert_eq!(Command::from_button(BUTTON_HELP), Some(Command::Help));
        assert_eq!(Command::from_button(BUTTON_SUPPORT), Some(Command::Tp));
        assert_eq!(Command::from_button(BUTTON_TERMS), Some(Command::Tos));
        assert_eq!(Command::from_button("Помощь"), None);
    }

    #[test]
    fn test_menu_has_all_buttons() {
        let menu = main_menu();
        let labels: Vec<&str> = menu
            .keyboard
            .iter()
            .flatten()
            .map(|b| b.text.as_str())
            .collect();
        assert_eq!(labels, vec![BUTTON_HELP, BUTTON_SUPPORT, BUTTON_TERMS]);
        assert!(menu.resize_keyboard);
    }

    #[test]
    fn test_cooldown_rounds_up() {
        assert!(replies::cooldown(Duration::from_millis(1500)).contains("2 сек"));
        assert!(replies::cooldown(Duration::from_secs(3)).contains("3 сек"));
        assert!(replies::cooldown(Duration::from_millis(10)).contains("1 сек"));
    }

    #[test]
    fn test_welcome_with_count() {
        assert!(replies::welcome(Some(12)).contains("12"));
        assert!(!replies::welcome(None).contains("👥"));
    }

    #[test]
    fn test_help_lists_commands() {
        let help = replies::help();
        for cmd in ["/start", "/help", "/tp", "/tos"] {
            assert!(help.contains(cmd), "missing {cmd}");
        }
    }
}
