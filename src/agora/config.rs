//! Configuration for agora.
//!
//! [`AgoraConfig`] is a plain struct: construct it by hand, start from
//! [`AgoraConfig::default`], or load it with [`AgoraConfig::from_env`]. The API key and base
//! URL are handed to the backend client when it is built and never stored globally.
//!
//! ```rust
//! use agora::AgoraConfig;
//! use std::time::Duration;
//!
//! let config = AgoraConfig {
//!     api_key: "sk-test".into(),
//!     relay_timeout: Duration::from_secs(30),
//!     ..AgoraConfig::default()
//! };
//! assert_eq!(config.stream_max_round, 10);
//! assert_eq!(config.batch_max_round, 20);
//! ```

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ChatError;
use crate::llm_adapter::RetryPolicy;
use crate::selector::SpeakerSelection;

pub const DEFAULT_BASE_URL: &str = "https://api.deepseek.com";
pub const DEFAULT_MODEL: &str = "deepseek-chat";

/// Process- or harness-scoped settings for every session.
#[derive(Debug, Clone)]
pub struct AgoraConfig {
    /// Secret for the chat-completion backend (`DEEPSEEK_API_KEY`).
    pub api_key: String,
    /// Backend base URL, without the `/chat/completions` suffix.
    pub base_url: String,
    /// Model identifier sent with every request.
    pub model: String,
    /// Temperature used when an agent does not configure one.
    pub default_temperature: f32,
    /// Lowest temperature ever forwarded upstream.
    pub temperature_floor: f32,
    /// Per-agent reply budget when `max_consecutive_auto_reply` is absent.
    pub default_max_auto_replies: usize,
    /// Round limit for streamed chats.
    pub stream_max_round: usize,
    /// Round limit for batch chats.
    pub batch_max_round: usize,
    /// Bound of the relay between coordinator and consumer.
    pub relay_capacity: usize,
    /// How long the consumer waits for the next relay item.
    pub relay_timeout: Duration,
    /// Retry policy for adapter calls. Zero retries by default.
    pub retry: RetryPolicy,
    /// How the coordinator picks the next speaker.
    pub speaker_selection: SpeakerSelection,
    /// An agent reply ending with this keyword ends the chat.
    pub termination_keyword: Option<String>,
    /// Name of the user proxy pseudo-agent.
    pub user_proxy_name: String,
}

impl Default for AgoraConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            default_temperature: 0.7,
            temperature_floor: 0.0,
            default_max_auto_replies: 10,
            stream_max_round: 10,
            batch_max_round: 20,
            relay_capacity: 64,
            relay_timeout: Duration::from_secs(600),
            retry: RetryPolicy::default(),
            speaker_selection: SpeakerSelection::RoundRobin,
            termination_keyword: Some("TERMINATE".to_string()),
            user_proxy_name: "User".to_string(),
        }
    }
}

impl AgoraConfig {
    /// Build a config from the process environment, loading `.env` first if present.
    ///
    /// `DEEPSEEK_API_KEY` is required. Optional overrides: `DEEPSEEK_BASE_URL`, `AGORA_MODEL`,
    /// `AGORA_STREAM_MAX_ROUND`, `AGORA_BATCH_MAX_ROUND`, `AGORA_RELAY_TIMEOUT_SECS`,
    /// `AGORA_RELAY_CAPACITY`, `AGORA_MAX_RETRIES`.
    pub fn from_env() -> Result<Self, ChatError> {
        if let Err(err) = dotenvy::dotenv() {
            if !err.not_found() {
                log::warn!("AgoraConfig::from_env(): ignoring unreadable .env file: {}", err);
            }
        }
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reading from an arbitrary lookup, which keeps
    /// tests away from the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ChatError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup("DEEPSEEK_API_KEY")
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ChatError::Configuration("DEEPSEEK_API_KEY not found".to_string()))?;

        let mut config = AgoraConfig {
            api_key,
            ..AgoraConfig::default()
        };

        if let Some(base_url) = lookup("DEEPSEEK_BASE_URL") {
            config.base_url = base_url;
        }
        if let Some(model) = lookup("AGORA_MODEL") {
            config.model = model;
        }
        if let Some(rounds) = parse_var::<usize, _>(&lookup, "AGORA_STREAM_MAX_ROUND")? {
            config.stream_max_round = rounds;
        }
        if let Some(rounds) = parse_var::<usize, _>(&lookup, "AGORA_BATCH_MAX_ROUND")? {
            config.batch_max_round = rounds;
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "AGORA_RELAY_TIMEOUT_SECS")? {
            config.relay_timeout = Duration::from_secs(secs);
        }
        if let Some(capacity) = parse_var::<usize, _>(&lookup, "AGORA_RELAY_CAPACITY")? {
            config.relay_capacity = capacity;
        }
        if let Some(retries) = parse_var::<u32, _>(&lookup, "AGORA_MAX_RETRIES")? {
            config.retry.max_retries = retries;
        }

        Ok(config)
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ChatError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
            ChatError::Configuration(format!("{} has an invalid value: {:?}", key, raw))
        }),
    }
}
