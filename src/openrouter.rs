//! OpenRouter chat-completions client.

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub struct Client {
    api_key: String,
    model: String,
    endpoint: String,
    http: reqwest::Client,
}

#[derive(Debug, Clone)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
}

impl Role {
    fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
        }
    }
}

#[derive(Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage<'a>>,
}

#[derive(Serialize)]
struct ApiMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ApiResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl Client {
    pub fn new(
        api_key: String,
        model: String,
        endpoint: String,
        timeout: Duration,
    ) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;

        Ok(Self { api_key, model, endpoint, http })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request<'a>(&'a self, messages: &'a [Message]) -> ApiRequest<'a> {
        ApiRequest {
            model: &self.model,
            messages: messages
                .iter()
                .map(|m| ApiMessage {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
        }
    }

    /// Send a conversation and return the first choice's text.
    pub async fn complete(&self, messages: &[Message]) -> Result<String, Error> {
        let request = self.build_request(messages);

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        if !status.is_success() {
            return Err(Error::Api { status: status.as_u16(), body });
        }

        parse_reply(&body)
    }
}

fn parse_reply(body: &str) -> Result<String, Error> {
    let parsed: ApiResponse =
        serde_json::from_str(body).map_err(|e| Error::Parse(e.to_string()))?;

    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|text| !text.trim().is_empty())
        .ok_or(Error::Empty)
}

#[derive(Debug)]
pub enum Error {
    Http(String),
    Api { status: u16, body: String },
    Parse(String),
    Empty,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Http(e) => write!(f, "HTTP error: {e}"),
            Error::Api { status, body } => write!(f, "API error: {status}: {body}"),
            Error::Parse(e) => write!(f, "Parse error: {e}"),
            Error::Empty => write!(f, "Empty response"),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reply_extracts_first_choice() {
        let body = r#"{"choices":[{"message":{"content":"X"}},{"message":{"content":"Y"}}]}"#;
        assert_eq!(parse_reply(body).unwrap(), "X");
    }

    #[test]
    fn test_parse_reply_ignores_extra_fields() {
        let body = r#"{
            "id": "gen-1",
            "model": "google/gemma-2-9b-it",
            "choices": [{"index": 0, "finish_reason": "stop",
                         "message": {"role": "assistant", "content": "Привет!"}}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 3}
        }"#;
        assert_eq!(parse_reply(body).unwrap(), "Привет!");
    }

    #[test]
    fn test_parse_reply_empty_choices() {
        assert!(matches!(parse_reply(r#"{"choices":[]}"#), Err(Error::Empty)));
        assert!(matches!(parse_reply(r#"{}"#), Err(Error::Empty)));
    }

    #[test]
    fn test_parse_reply_null_or_blank_content() {
        let null = r#"{"choices":[{"message":{"content":null}}]}"#;
        assert!(matches!(parse_reply(null), Err(Error::Empty)));
        let blank = r#"{"choices":[{"message":{"content":"  \n"}}]}"#;
        assert!(matches!(parse_reply(blank), Err(Error::Empty)));
    }

    #[test]
    fn test_parse_reply_malformed() {
        assert!(matches!(parse_reply("<html>502</html>"), Err(Error::Parse(_))));
        let wrong_shape = r#"{"choices":[{"text":"X"}]}"#;
        assert!(matches!(parse_reply(wrong_shape), Err(Error::Parse(_))));
    }

    #[test]
    fn test_request_shape() {
        let client = Client::new(
            "k".to_string(),
            "m".to_string(),
            "http://localhost/api/v1/chat/completions".to_string(),
            Duration::from_secs(1),
        )
        .unwrap();
        let messages = [Message::system("be nice"), Message::user("hi")];
        let json = serde_json::to_value(client.build_request(&messages)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "model": "m",
                "messages": [
                    {"role": "system", "content": "be nice"},
                    {"role": "user", "content": "hi"}
                ]
            })
        );
    }
}
