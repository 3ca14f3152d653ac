//! The LLM client adapter: one call per agent turn.
//!
//! [`LlmAdapter::complete`] takes the speaking agent's system prompt, the transcript as
//! messages and the agent's temperature, and returns the reply text. Whatever the caller
//! passes, the temperature forwarded upstream is clamped into `[floor, 1.0]`.
//!
//! Any backend failure becomes [`ChatError::Upstream`]. By default nothing is retried; a
//! [`RetryPolicy`] with `max_retries > 0` enables bounded retry with exponential backoff.
//!
//! ```
//! use agora::llm_adapter::clamp_temperature;
//!
//! assert_eq!(clamp_temperature(1.3, 0.0), 1.0);
//! assert_eq!(clamp_temperature(-0.5, 0.1), 0.1);
//! assert_eq!(clamp_temperature(0.4, 0.0), 0.4);
//! ```

use crate::client_wrapper::{ClientWrapper, Message, Role, TokenUsage};
use crate::error::ChatError;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Clamp `temperature` into `[floor, 1.0]`. The floor itself is kept inside `[0, 1]` and NaN
/// maps to the floor.
pub fn clamp_temperature(temperature: f32, floor: f32) -> f32 {
    let floor = if floor.is_nan() { 0.0 } else { floor.clamp(0.0, 1.0) };
    if temperature.is_nan() {
        return floor;
    }
    temperature.min(1.0).max(floor)
}

/// Bounded retry for adapter calls.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one. `0` disables retry.
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// No retry at all.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    fn next_backoff(&self, current: Duration) -> Duration {
        Duration::from_secs_f64(
            (current.as_secs_f64() * self.multiplier).min(self.max_backoff.as_secs_f64()),
        )
    }
}

/// Wraps a [`ClientWrapper`] with temperature clamping, error mapping, retry and cancellation.
#[derive(Clone)]
pub struct LlmAdapter {
    client: Arc<dyn ClientWrapper>,
    temperature_floor: f32,
    retry: RetryPolicy,
}

impl LlmAdapter {
    pub fn new(client: Arc<dyn ClientWrapper>, temperature_floor: f32) -> Self {
        Self {
            client,
            temperature_floor,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn client(&self) -> &Arc<dyn ClientWrapper> {
        &self.client
    }

    pub fn temperature_floor(&self) -> f32 {
        self.temperature_floor
    }

    /// Usage reported by the backend for the most recent call, if it tracks any.
    pub async fn last_usage(&self) -> Option<TokenUsage> {
        self.client.get_last_usage().await
    }

    /// Generate one reply. See [`complete_cancellable`](Self::complete_cancellable).
    pub async fn complete(
        &self,
        system_prompt: &str,
        context: &[Message],
        temperature: f32,
    ) -> Result<String, ChatError> {
        self.complete_cancellable(system_prompt, context, temperature, &CancellationToken::new())
            .await
    }

    /// Generate one reply, giving up as soon as `cancel` fires.
    ///
    /// The system prompt goes first, followed by `context` in order. On cancellation the
    /// in-flight request future is dropped and [`ChatError::Cancelled`] is returned.
    pub async fn complete_cancellable(
        &self,
        system_prompt: &str,
        context: &[Message],
        temperature: f32,
        cancel: &CancellationToken,
    ) -> Result<String, ChatError> {
        let temperature = clamp_temperature(temperature, self.temperature_floor);

        let mut messages = Vec::with_capacity(context.len() + 1);
        messages.push(Message::new(Role::System, system_prompt));
        messages.extend_from_slice(context);

        let mut backoff = self.retry.initial_backoff;
        let mut attempt: u32 = 0;
        loop {
            let result = tokio::select! {
                _ = cancel.cancelled() => return Err(ChatError::Cancelled),
                result = self.client.send_message(&messages, Some(temperature)) => result,
            };

            let err = match result {
                Ok(reply) => return Ok(reply.content.to_string()),
                Err(err) => ChatError::Upstream(err.to_string()),
            };

            if !err.is_retryable() || attempt >= self.retry.max_retries {
                return Err(err);
            }
            attempt += 1;
            log::warn!(
                "LlmAdapter::complete(...): attempt {}/{} against {} failed, retrying in {:?}: {}",
                attempt,
                self.retry.max_retries + 1,
                self.client.model_name(),
                backoff,
                err
            );

            tokio::select! {
                _ = cancel.cancelled() => return Err(ChatError::Cancelled),
                _ = tokio::time::sleep(backoff) => {}
            }
            backoff = self.retry.next_backoff(backoff);
        }
    }
}
