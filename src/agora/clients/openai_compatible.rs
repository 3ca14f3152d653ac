//! The `OpenAICompatibleClient` implements [`ClientWrapper`] for any endpoint that speaks the
//! OpenAI Chat Completions protocol (`POST <base>/chat/completions`).
//!
//! The API key and base URL are passed in at construction time; nothing is read from the
//! environment here. The latest [`TokenUsage`] is kept in an internal slot.
//!
//! ```rust,no_run
//! use agora::clients::openai_compatible::OpenAICompatibleClient;
//! use agora::client_wrapper::{ClientWrapper, Message, Role};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! let base_url = "https://api.deepseek.com";
//! let client = OpenAICompatibleClient::new("sk-...", "deepseek-chat", base_url)?;
//! let reply = client
//!     .send_message(&[Message::new(Role::User, "Hello!")], Some(0.7))
//!     .await?;
//! println!("{}", reply.content);
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::client_wrapper::{ClientError, ClientWrapper, Message, Role, TokenUsage};
use crate::clients::common::send_chat_completion;
use crate::clients::http_pool::get_http_client;
use crate::error::ChatError;

/// Client for OpenAI-compatible chat-completion endpoints.
pub struct OpenAICompatibleClient {
    /// Shared pooled HTTP client for `base_url`.
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    token_usage: Mutex<Option<TokenUsage>>,
}

impl OpenAICompatibleClient {
    /// Fails with [`ChatError::Configuration`] when the key, model or base URL is empty.
    pub fn new(api_key: &str, model_name: &str, base_url: &str) -> Result<Self, ChatError> {
        if api_key.trim().is_empty() {
            return Err(ChatError::Configuration("API key is missing".to_string()));
        }
        if model_name.trim().is_empty() {
            return Err(ChatError::Configuration("model name is missing".to_string()));
        }
        if base_url.trim().is_empty() {
            return Err(ChatError::Configuration("base URL is missing".to_string()));
        }

        Ok(OpenAICompatibleClient {
            http: get_http_client(base_url),
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model_name.to_string(),
            token_usage: Mutex::new(None),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ClientWrapper for OpenAICompatibleClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn send_message(
        &self,
        messages: &[Message],
        temperature: Option<f32>,
    ) -> Result<Message, ClientError> {
        let content = send_chat_completion(
            &self.http,
            &self.base_url,
            &self.api_key,
            &self.model,
            messages,
            temperature,
            &self.token_usage,
        )
        .await;

        match content {
            Ok(content) => Ok(Message::new(Role::Assistant, content)),
            Err(err) => {
                if log::log_enabled!(log::Level::Error) {
                    log::error!(
                        "OpenAICompatibleClient::send_message(...): {} ({}): {}",
                        self.base_url,
                        self.model,
                        err
                    );
                }
                Err(err)
            }
        }
    }

    fn usage_slot(&self) -> Option<&Mutex<Option<TokenUsage>>> {
        Some(&self.token_usage)
    }
}
