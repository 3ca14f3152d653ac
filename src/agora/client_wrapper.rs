//! A ClientWrapper is a thin wrapper around a chat-completion backend.
//!
//! It provides a common interface for sending a list of messages with a sampling temperature
//! and getting the assistant's reply back. It does not keep track of the conversation; the
//! [`GroupCoordinator`](crate::coordinator::GroupCoordinator) owns the transcript and builds
//! the message list for every turn.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Represents the possible roles for a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Set by the developer to steer the model's responses.
    System,
    /// A message sent by a human user (or the user proxy).
    User,
    /// Content generated by an agent.
    Assistant,
}

impl Role {
    /// Wire name used by OpenAI-compatible APIs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// How many tokens were spent on prompt vs. completion.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub total_tokens: usize,
}

/// Represents a generic message to be sent to an LLM.
#[derive(Clone, Debug)]
pub struct Message {
    /// The role associated with the message.
    pub role: Role,
    /// The actual content of the message.
    pub content: Arc<str>,
    /// Optional participant name, used to tell speakers apart in a group chat.
    pub name: Option<String>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<Arc<str>>) -> Self {
        Self {
            role,
            content: content.into(),
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Boxed error returned by backends. `Send + Sync` so it can cross the worker boundary.
pub type ClientError = Box<dyn Error + Send + Sync>;

/// Trait defining the interface to interact with chat-completion services.
#[async_trait]
pub trait ClientWrapper: Send + Sync {
    /// Model identifier injected into each request.
    fn model_name(&self) -> &str;

    /// Send a message list to the LLM and get the assistant's reply.
    /// - `messages`: the full context, system prompt first.
    /// - `temperature`: sampling temperature, already clamped by the caller.
    async fn send_message(
        &self,
        messages: &[Message],
        temperature: Option<f32>,
    ) -> Result<Message, ClientError>;

    /// Usage from the *last* `send_message()` call.
    /// Default impl reads [`usage_slot`](ClientWrapper::usage_slot).
    async fn get_last_usage(&self) -> Option<TokenUsage> {
        match self.usage_slot() {
            Some(slot) => slot.lock().await.clone(),
            None => None,
        }
    }

    /// Implementations that track token usage return their slot here.
    fn usage_slot(&self) -> Option<&Mutex<Option<TokenUsage>>> {
        None
    }
}
