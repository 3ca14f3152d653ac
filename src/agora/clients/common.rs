use crate::client_wrapper::{ClientError, Message, TokenUsage};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use tokio::sync::Mutex;

/// Error raised by the chat-completion helpers. Carries the HTTP status when there was one.
#[derive(Debug, Clone)]
pub struct BackendError {
    pub status: Option<u16>,
    pub message: String,
}

impl BackendError {
    fn malformed(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: format!("malformed response body: {}", message.into()),
        }
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "HTTP {}: {}", status, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl Error for BackendError {}

/// One entry of the `messages` array of a chat-completion request.
#[derive(Debug, Serialize)]
pub struct WireMessage {
    pub role: &'static str,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Body of `POST <base>/chat/completions`.
#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    pub stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<WireUsage>,
    /// Some gateways flatten the reply to a top-level `content` field.
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: usize,
    #[serde(default)]
    completion_tokens: usize,
    #[serde(default)]
    total_tokens: usize,
}

/// Participant names must match `^[a-zA-Z0-9_-]{1,64}$` on OpenAI-compatible APIs.
pub fn sanitize_name(name: &str) -> String {
    let safe: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(64)
        .collect();
    if safe.is_empty() {
        "_".to_string()
    } else {
        safe
    }
}

/// Convert our messages into the wire format expected by the REST API.
pub fn to_wire_messages(messages: &[Message]) -> Vec<WireMessage> {
    messages
        .iter()
        .map(|msg| WireMessage {
            role: msg.role.as_str(),
            content: msg.content.to_string(),
            name: msg.name.as_deref().map(sanitize_name),
        })
        .collect()
}

/// Send a chat request, record its usage, and return the assistant's content.
///
/// Non-2xx responses and bodies without any reply content are errors; nothing is retried here.
pub async fn send_chat_completion(
    http: &reqwest::Client,
    base_url: &str,
    api_key: &str,
    model: &str,
    messages: &[Message],
    temperature: Option<f32>,
    usage_slot: &Mutex<Option<TokenUsage>>,
) -> Result<String, ClientError> {
    let url = format!("{}/chat/completions", base_url.trim_end_matches('/'));
    let request = ChatCompletionRequest {
        model,
        messages: to_wire_messages(messages),
        temperature,
        stream: false,
    };

    let response = http
        .post(&url)
        .bearer_auth(api_key)
        .json(&request)
        .send()
        .await
        .map_err(|err| {
            log::error!(
                "agora::clients::common::send_chat_completion(...): request to {} failed: {}",
                url,
                err
            );
            err
        })?;

    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        log::error!(
            "agora::clients::common::send_chat_completion(...): {} returned {}",
            url,
            status
        );
        return Err(Box::new(BackendError {
            status: Some(status.as_u16()),
            message: truncate(&body, 512),
        }));
    }

    let parsed: ChatCompletionResponse =
        serde_json::from_str(&body).map_err(|err| BackendError::malformed(err.to_string()))?;

    if let Some(usage) = &parsed.usage {
        *usage_slot.lock().await = Some(TokenUsage {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        });
    }

    let content = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .or(parsed.content);

    match content {
        Some(content) => Ok(content),
        None => Err(Box::new(BackendError::malformed("no reply content"))),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let head: String = text.chars().take(max_chars).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client_wrapper::Role;

    #[test]
    fn names_are_sanitized_for_the_wire() {
        assert_eq!(sanitize_name("Code Reviewer"), "Code_Reviewer");
        assert_eq!(sanitize_name("agent-1_ok"), "agent-1_ok");
        assert_eq!(sanitize_name(""), "_");
        assert_eq!(sanitize_name(&"x".repeat(100)).len(), 64);
    }

    #[test]
    fn wire_messages_keep_order_and_skip_missing_names() {
        let msgs = vec![
            Message::new(Role::System, "You are A"),
            Message::new(Role::User, "hi").with_name("User"),
        ];
        let wire = to_wire_messages(&msgs);
        assert_eq!(wire[0].role, "system");
        assert!(wire[0].name.is_none());
        assert_eq!(wire[1].name.as_deref(), Some("User"));

        let json = serde_json::to_value(&wire[0]).unwrap();
        assert!(json.get("name").is_none());
    }
}
