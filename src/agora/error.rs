//! Error taxonomy shared by every stage of a group chat.
//!
//! Bootstrap failures surface immediately as [`ChatError::Configuration`]. Everything that
//! goes wrong once the coordinator is running is converted into a terminal relay item by the
//! worker, so the consumer sees a single `{error: ...}` frame followed by `[DONE]`.
//!
//! ```
//! use agora::error::ChatError;
//!
//! let err = ChatError::Configuration("at least one agent is required".into());
//! assert_eq!(err.to_string(), "Configuration error: at least one agent is required");
//! ```

use std::error::Error;
use std::fmt;
use std::time::Duration;

/// Errors produced while bootstrapping, running or streaming a session.
#[derive(Debug, Clone)]
pub enum ChatError {
    /// Missing or invalid input to the bootstrap (no agents, empty prompt, bad history,
    /// missing API key). No session is created.
    Configuration(String),

    /// The LLM backend failed: network error, non-2xx status or a malformed body.
    /// Aborts the current round and terminates the session.
    Upstream(String),

    /// The stream consumer waited longer than the relay timeout without receiving anything.
    Timeout(Duration),

    /// The persistence sink rejected a message. Logged and swallowed by the stream.
    Persistence(String),

    /// The session was cancelled, normally because the consumer went away.
    Cancelled,
}

impl ChatError {
    /// `true` for failures worth another attempt under a
    /// [`RetryPolicy`](crate::llm_adapter::RetryPolicy).
    pub fn is_retryable(&self) -> bool {
        matches!(self, ChatError::Upstream(_))
    }
}

impl fmt::Display for ChatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatError::Configuration(msg) => write!(f, "Configuration error: {}", msg),
            ChatError::Upstream(msg) => write!(f, "Upstream error: {}", msg),
            ChatError::Timeout(waited) => write!(
                f,
                "Timeout waiting for agent response after {}s. Please try again.",
                waited.as_secs()
            ),
            ChatError::Persistence(msg) => write!(f, "Persistence error: {}", msg),
            ChatError::Cancelled => write!(f, "Session cancelled"),
        }
    }
}

impl Error for ChatError {}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        ChatError::Upstream(err.to_string())
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(err: serde_json::Error) -> Self {
        ChatError::Upstream(format!("malformed response body: {}", err))
    }
}

impl From<std::io::Error> for ChatError {
    fn from(err: std::io::Error) -> Self {
        ChatError::Persistence(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_message_mentions_seconds() {
        let err = ChatError::Timeout(Duration::from_secs(600));
        assert!(err.to_string().contains("600s"));
    }

    #[test]
    fn only_upstream_failures_are_retryable() {
        assert!(ChatError::Upstream("503".into()).is_retryable());
        assert!(!ChatError::Configuration("x".into()).is_retryable());
        assert!(!ChatError::Cancelled.is_retryable());
        assert!(!ChatError::Timeout(Duration::from_secs(1)).is_retryable());
    }
}
