//! Session bootstrap: request in, ready-to-run [`Session`] out.
//!
//! The bootstrap validates a [`SessionRequest`], merges each agent's free-form config with
//! the process defaults and converts prior history into seed entries. Temperatures are
//! clamped here, so every descriptor that reaches the coordinator is already in range.
//!
//! ```
//! use agora::bootstrap::{SessionBootstrap, SessionRequest};
//! use agora::AgoraConfig;
//!
//! let request: SessionRequest = serde_json::from_str(r#"{
//!     "agents": [{"name": "A", "system_message": "You are A", "config": {"temperature": 1.3}}],
//!     "message": "hi"
//! }"#).unwrap();
//!
//! let session = SessionBootstrap::new(&AgoraConfig::default()).build(request, 3).unwrap();
//! assert_eq!(session.agents[0].sampling.temperature, 1.0);
//! assert_eq!(session.opening_message.as_deref(), Some("hi"));
//! ```

use crate::agent::{AgentDescriptor, HumanInputMode};
use crate::client_wrapper::Role;
use crate::config::AgoraConfig;
use crate::error::ChatError;
use crate::llm_adapter::clamp_temperature;
use crate::transcript::TranscriptEntry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{HashMap, HashSet};

/// Opening line used when the caller resumes a conversation without saying anything new.
pub const CONTINUE_PROMPT: &str = "Please continue the discussion.";

/// Inbound chat request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRequest {
    pub agents: Vec<AgentConfig>,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<Vec<HistoryEntry>>,
    /// Reuse an existing conversation id instead of minting one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub name: String,
    pub system_message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub config: AgentOptions,
}

/// The free-form per-agent config map. Unknown keys are kept in `extra` and ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentOptions {
    #[serde(deserialize_with = "lenient_f32", skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub human_input_mode: Option<HumanInputMode>,
    #[serde(deserialize_with = "lenient_usize", skip_serializing_if = "Option::is_none")]
    pub max_consecutive_auto_reply: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// Role of a prior message. Anything other than `user` or `assistant` (e.g. `tool`) is
/// accepted and left out of the seed, like `system`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryRole {
    System,
    User,
    Assistant,
    #[serde(other)]
    Other,
}

impl HistoryRole {
    /// The transcript role, for entries that are seeded.
    pub fn seeded_role(self) -> Option<Role> {
        match self {
            HistoryRole::User => Some(Role::User),
            HistoryRole::Assistant => Some(Role::Assistant),
            HistoryRole::System | HistoryRole::Other => None,
        }
    }
}

/// One prior message. `name` defaults to the role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: HistoryRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Everything the coordinator needs for one chat.
#[derive(Debug, Clone)]
pub struct Session {
    pub conversation_id: String,
    /// Assistants, in the order given by the request.
    pub agents: Vec<AgentDescriptor>,
    pub user_proxy: AgentDescriptor,
    /// Prior history, already filtered. Never relayed.
    pub seed: Vec<TranscriptEntry>,
    /// Appended as the user proxy's turn before the first round.
    pub opening_message: Option<String>,
    pub max_round: usize,
}

impl Session {
    pub fn new(
        agents: Vec<AgentDescriptor>,
        user_proxy: AgentDescriptor,
        seed: Vec<TranscriptEntry>,
        opening_message: Option<String>,
        max_round: usize,
    ) -> Self {
        Self {
            conversation_id: uuid::Uuid::new_v4().to_string(),
            agents,
            user_proxy,
            seed,
            opening_message,
            max_round,
        }
    }

    pub fn with_conversation_id(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = conversation_id.into();
        self
    }
}

pub struct SessionBootstrap<'a> {
    config: &'a AgoraConfig,
}

impl<'a> SessionBootstrap<'a> {
    pub fn new(config: &'a AgoraConfig) -> Self {
        Self { config }
    }

    /// Validate `request` and build a session capped at `max_round` agent turns.
    ///
    /// Fails with [`ChatError::Configuration`] when there are no agents, when an agent name is
    /// blank or repeated (the user proxy's name included), or when the message is empty and
    /// there is no history to continue from.
    pub fn build(&self, request: SessionRequest, max_round: usize) -> Result<Session, ChatError> {
        if request.agents.is_empty() {
            return Err(ChatError::Configuration(
                "No agents selected or found".to_string(),
            ));
        }

        let seed = self.seed_history(request.history.as_deref().unwrap_or_default());
        let message = request.message.trim();
        let opening_message = if !message.is_empty() {
            Some(request.message.clone())
        } else if seed.is_empty() {
            return Err(ChatError::Configuration("Message is required".to_string()));
        } else {
            Some(CONTINUE_PROMPT.to_string())
        };

        let user_proxy = AgentDescriptor::user_proxy(self.config.user_proxy_name.as_str());
        let mut names = HashSet::new();
        names.insert(user_proxy.name.clone());

        let mut agents = Vec::with_capacity(request.agents.len());
        for agent in request.agents {
            let descriptor = self.descriptor(agent)?;
            if !names.insert(descriptor.name.clone()) {
                return Err(ChatError::Configuration(format!(
                    "Duplicate agent name '{}'",
                    descriptor.name
                )));
            }
            agents.push(descriptor);
        }

        let session = Session::new(agents, user_proxy, seed, opening_message, max_round);
        Ok(match request.conversation_id {
            Some(id) if !id.trim().is_empty() => session.with_conversation_id(id),
            _ => session,
        })
    }

    fn descriptor(&self, agent: AgentConfig) -> Result<AgentDescriptor, ChatError> {
        let name = agent.name.trim();
        if name.is_empty() {
            return Err(ChatError::Configuration(
                "Agent name must not be empty".to_string(),
            ));
        }

        let options = agent.config;
        let temperature = clamp_temperature(
            options.temperature.unwrap_or(self.config.default_temperature),
            self.config.temperature_floor,
        );
        let max_auto_replies = options
            .max_consecutive_auto_reply
            .unwrap_or(self.config.default_max_auto_replies);

        let mut descriptor = AgentDescriptor::assistant(name, agent.system_message)
            .with_temperature(temperature)
            .with_max_auto_replies(max_auto_replies)
            .with_human_input_mode(options.human_input_mode.unwrap_or_default());
        if let Some(description) = agent.description.or(options.description) {
            descriptor = descriptor.with_description(description);
        }
        Ok(descriptor)
    }

    /// Prior history as seed entries, `system` and unknown roles dropped. Entries without a
    /// timestamp get the Unix epoch so replaying the same history always yields the same
    /// transcript.
    pub fn seed_history(&self, history: &[HistoryEntry]) -> Vec<TranscriptEntry> {
        history
            .iter()
            .filter_map(|entry| {
                let role = entry.role.seeded_role()?;
                let name = entry
                    .name
                    .clone()
                    .unwrap_or_else(|| role.as_str().to_string());
                Some(
                    TranscriptEntry::new(role, name, entry.content.as_str())
                        .with_created_at(entry.timestamp.unwrap_or(DateTime::<Utc>::UNIX_EPOCH)),
                )
            })
            .collect()
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Numbers arrive either as JSON numbers or as numeric strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum Lenient {
    Number(f64),
    Text(String),
}

fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Lenient>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Lenient::Number(n)) => Ok(Some(n)),
        Some(Lenient::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(Lenient::Text(s)) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("expected a number, got {:?}", s))),
    }
}

fn lenient_f32<'de, D>(deserializer: D) -> Result<Option<f32>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_number(deserializer)?.map(|n| n as f32))
}

fn lenient_usize<'de, D>(deserializer: D) -> Result<Option<usize>, D::Error>
where
    D: Deserializer<'de>,
{
    match lenient_number(deserializer)? {
        None => Ok(None),
        Some(n) if n.is_finite() && n >= 0.0 => Ok(Some(n as usize)),
        Some(n) => Err(serde::de::Error::custom(format!(
            "expected a non-negative count, got {}",
            n
        ))),
    }
}
