use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use teloxide::types::ChatId;

pub const DEFAULT_MODEL: &str = "google/gemma-2-9b-it";
pub const DEFAULT_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "Ты TotChat — умный ИИ-помощник. Отвечай логично, понятно и полезно.";

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the config file.
    ReadFile { path: PathBuf, source: std::io::Error },
    /// Failed to parse JSON.
    ParseJson { path: PathBuf, source: serde_json::Error },
    /// Validation error.
    Validation(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFile { path, source } => {
                write!(f, "failed to read config file '{}': {}", path.display(), source)
            }
            Self::ParseJson { path, source } => {
                write!(f, "failed to parse config file '{}': {}", path.display(), source)
            }
            Self::Validation(msg) => write!(f, "config validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ReadFile { source, .. } => Some(source),
            Self::ParseJson { source, .. } => Some(source),
            Self::Validation(_) => None,
        }
    }
}

#[derive(Deserialize, Default)]
struct ConfigFile {
    /// Overridden by BOT_TOKEN
    #[serde(default)]
    telegram_bot_token: String,
    /// Overridden by OPENROUTER_API_KEY
    #[serde(default)]
    openrouter_api_key: String,
    model: Option<String>,
    api_url: Option<String>,
    system_prompt: Option<String>,
    request_timeout_secs: Option<u64>,
    cooldown_secs: Option<u64>,
    thinking_placeholder: Option<bool>,
    /// JSON array of user IDs; registry is off when unset.
    users_file: Option<String>,
    support_contact: Option<String>,
    /// Directory for state files (logs). Defaults to current directory.
    data_dir: Option<String>,
    log_chat_id: Option<i64>,
}

pub struct Config {
    pub telegram_bot_token: String,
    pub openrouter_api_key: String,
    pub model: String,
    pub api_url: String,
    pub system_prompt: String,
    /// Deadline for a single completion request.
    pub request_timeout: Duration,
    /// Minimum gap between two accepted messages from one user.
    pub cooldown: Duration,
    /// Send "thinking" first, then edit it with the answer.
    pub thinking_placeholder: bool,
    pub users_file: Option<PathBuf>,
    pub support_contact: String,
    pub data_dir: PathBuf,
    pub log_chat_id: Option<ChatId>,
}

impl Config {
    /// Load from a JSON file, with environment variables taking precedence.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::load_with_env(path, |key| std::env::var(key).ok())
    }

    /// Build from environment variables and defaults only.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::resolve(ConfigFile::default(), |key| std::env::var(key).ok())
    }

    fn load_with_env<P, F>(path: P, env: F) -> Result<Self, ConfigError>
    where
        P: AsRef<Path>,
        F: Fn(&str) -> Option<String>,
    {
        let config_path = path.as_ref().to_path_buf();
        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| ConfigError::ReadFile { path: config_path.clone(), source: e })?;
        let file: ConfigFile = serde_json::from_str(&content)
            .map_err(|e| ConfigError::ParseJson { path: config_path, source: e })?;
        Self::resolve(file, env)
    }

    fn resolve<F>(file: ConfigFile, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let telegram_bot_token = non_empty("BOT_TOKEN").unwrap_or(file.telegram_bot_token);
        let openrouter_api_key = non_empty("OPENROUTER_API_KEY").unwrap_or(file.openrouter_api_key);

        if telegram_bot_token.is_empty() {
            return Err(ConfigError::Validation(
                "telegram_bot_token is required (set BOT_TOKEN)".into(),
            ));
        }
        // Telegram tokens are formatted as {bot_id}:{secret} where bot_id is numeric
        let token_parts: Vec<&str> = telegram_bot_token.split(':').collect();
        if token_parts.len() != 2 || token_parts[0].parse::<u64>().is_err() || token_parts[1].is_empty() {
            return Err(ConfigError::Validation(
                "telegram_bot_token appears invalid (expected format: 123456789:ABCdefGHI...)".into(),
            ));
        }
        if openrouter_api_key.is_empty() {
            return Err(ConfigError::Validation(
                "openrouter_api_key is required (set OPENROUTER_API_KEY)".into(),
            ));
        }

        let request_timeout_secs = file.request_timeout_secs.unwrap_or(30);
        if request_timeout_secs == 0 {
            return Err(ConfigError::Validation("request_timeout_secs must be positive".into()));
        }

        let model = non_empty("TOTCHAT_MODEL")
            .or(file.model)
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let users_file = non_empty("TOTCHAT_USERS_FILE")
            .or(file.users_file)
            .map(PathBuf::from);

        Ok(Self {
            telegram_bot_token,
            openrouter_api_key,
            model,
            api_url: file.api_url.unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            system_prompt: file
                .system_prompt
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            request_timeout: Duration::from_secs(request_timeout_secs),
            cooldown: Duration::from_secs(file.cooldown_secs.unwrap_or(5)),
            thinking_placeholder: file.thinking_placeholder.unwrap_or(true),
            users_file,
            support_contact: file
                .support_contact
                .unwrap_or_else(|| "@totchat_support".to_string()),
            data_dir: file.data_dir.map(PathBuf::from).unwrap_or_else(|| PathBuf::from(".")),
            log_chat_id: file.log_chat_id.map(ChatId),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn assert_err<T>(result: Result<T, ConfigError>) -> ConfigError {
        match result {
            Ok(_) => panic!("expected error, got Ok"),
            Err(e) => e,
        }
    }

    #[test]
    fn test_valid_config_with_defaults() {
        let file = write_config(r#"{
            "telegram_bot_token": "123456789:ABCdefGHIjklMNOpqrsTUVwxyz",
            "openrouter_api_key": "sk-or-test"
        }"#);
        let config = Config::load_with_env(file.path(), no_env).expect("should load valid config");
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.system_prompt, DEFAULT_SYSTEM_PROMPT);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.cooldown, Duration::from_secs(5));
        assert!(config.thinking_placeholder);
        assert!(config.users_file.is_none());
        assert!(config.log_chat_id.is_none());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let file = write_config(r#"{
            "telegram_bot_token": "123456789:ABCdef",
            "openrouter_api_key": "sk-or-test",
            "model": "meta-llama/llama-3-8b-instruct",
            "cooldown_secs": 12,
            "thinking_placeholder": false,
            "users_file": "data/users.json",
            "log_chat_id": -100123
        }"#);
        let config = Config::load_with_env(file.path(), no_env).unwrap();
        assert_eq!(config.model, "meta-llama/llama-3-8b-instruct");
        assert_eq!(config.cooldown, Duration::from_secs(12));
        assert!(!config.thinking_placeholder);
        assert_eq!(config.users_file, Some(PathBuf::from("data/users.json")));
        assert_eq!(config.log_chat_id, Some(ChatId(-100123)));
    }

    #[test]
    fn test_env_overrides_file() {
        let file = write_config(r#"{
            "telegram_bot_token": "123456789:FROMFILE",
            "openrouter_api_key": "file-key",
            "model": "file/model"
        }"#);
        let env = env_of(&[
            ("BOT_TOKEN", "987654321:FROMENV"),
            ("OPENROUTER_API_KEY", "env-key"),
            ("TOTCHAT_MODEL", "env/model"),
        ]);
        let config = Config::load_with_env(file.path(), env).unwrap();
        assert_eq!(config.telegram_bot_token, "987654321:FROMENV");
        assert_eq!(config.openrouter_api_key, "env-key");
        assert_eq!(config.model, "env/model");
    }

    #[test]
    fn test_blank_env_does_not_override() {
        let file = write_config(r#"{
            "telegram_bot_token": "123456789:FROMFILE",
            "openrouter_api_key": "file-key"
        }"#);
        let env = env_of(&[("BOT_TOKEN", "  ")]);
        let config = Config::load_with_env(file.path(), env).unwrap();
        assert_eq!(config.telegram_bot_token, "123456789:FROMFILE");
    }

    #[test]
    fn test_env_only() {
        let env = env_of(&[("BOT_TOKEN", "123:abc"), ("OPENROUTER_API_KEY", "k")]);
        let config = Config::resolve(ConfigFile::default(), env).unwrap();
        assert_eq!(config.telegram_bot_token, "123:abc");
        assert_eq!(config.data_dir, PathBuf::from("."));
    }

    #[test]
    fn test_missing_token() {
        let env = env_of(&[("OPENROUTER_API_KEY", "k")]);
        let err = assert_err(Config::resolve(ConfigFile::default(), env));
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("telegram_bot_token"));
    }

    #[test]
    fn test_missing_api_key() {
        let env = env_of(&[("BOT_TOKEN", "123:abc")]);
        let err = assert_err(Config::resolve(ConfigFile::default(), env));
        assert!(err.to_string().contains("openrouter_api_key"));
    }

    #[test]
    fn test_invalid_token_format_no_colon() {
        let env = env_of(&[("BOT_TOKEN", "invalid_token_no_colon"), ("OPENROUTER_API_KEY", "k")]);
        let err = assert_err(Config::resolve(ConfigFile::default(), env));
        assert!(err.to_string().contains("invalid"));
    }

    #[test]
    fn test_invalid_token_format_non_numeric_id() {
        let env = env_of(&[("BOT_TOKEN", "notanumber:ABCdef"), ("OPENROUTER_API_KEY", "k")]);
        let err = assert_err(Config::resolve(ConfigFile::default(), env));
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_invalid_token_format_empty_secret() {
        let env = env_of(&[("BOT_TOKEN", "123456789:"), ("OPENROUTER_API_KEY", "k")]);
        let err = assert_err(Config::resolve(ConfigFile::default(), env));
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let file = write_config(r#"{
            "telegram_bot_token": "123456789:ABCdef",
            "openrouter_api_key": "k",
            "request_timeout_secs": 0
        }"#);
        let err = assert_err(Config::load_with_env(file.path(), no_env));
        assert!(err.to_string().contains("request_timeout_secs"));
    }

    #[test]
    fn test_file_not_found() {
        let err = assert_err(Config::load_with_env("/nonexistent/path/config.json", no_env));
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn test_invalid_json() {
        let file = write_config("{ invalid json }");
        let err = assert_err(Config::load_with_env(file.path(), no_env));
        assert!(matches!(err, ConfigError::ParseJson { .. }));
    }
}
