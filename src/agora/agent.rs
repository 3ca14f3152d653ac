//! Agent descriptors: the immutable persona data a session is built from.
//!
//! An agent is data only. The coordinator never subclasses or calls into it; speaker selection
//! switches on [`AgentRole`] and reads the [`SamplingConfig`].
//!
//! ```
//! use agora::agent::{AgentDescriptor, AgentRole};
//!
//! let critic = AgentDescriptor::assistant("Critic", "You find flaws.")
//!     .with_description("Reviews proposals")
//!     .with_temperature(0.2)
//!     .with_max_auto_replies(3);
//! assert_eq!(critic.role, AgentRole::Assistant);
//! assert!(critic.can_generate());
//!
//! let user = AgentDescriptor::user_proxy("User");
//! assert!(!user.can_generate());
//! ```

use serde::{Deserialize, Serialize};

/// Whether a participant generates turns or only holds the human/opening turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentRole {
    /// Stands in for the human. Never initiates generation.
    UserProxy,
    /// An LLM-backed persona.
    Assistant,
}

/// Whether a participant asks a human before replying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HumanInputMode {
    Always,
    #[default]
    Never,
}

/// Per-agent sampling settings.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingConfig {
    /// Already clamped into `[floor, 1.0]` by the bootstrap.
    pub temperature: f32,
    /// Maximum number of turns this agent may take in one session.
    pub max_auto_replies: usize,
    pub human_input_mode: HumanInputMode,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_auto_replies: 10,
            human_input_mode: HumanInputMode::Never,
        }
    }
}

/// A configured persona. `name` is unique within a session.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentDescriptor {
    pub name: String,
    pub system_prompt: String,
    /// Used by LLM-assisted speaker selection.
    pub description: Option<String>,
    pub sampling: SamplingConfig,
    pub role: AgentRole,
}

impl AgentDescriptor {
    pub fn assistant(name: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            system_prompt: system_prompt.into(),
            description: None,
            sampling: SamplingConfig::default(),
            role: AgentRole::Assistant,
        }
    }

    /// The pseudo-agent holding the human's turns. It has no reply budget.
    pub fn user_proxy(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            system_prompt: "A human admin.".to_string(),
            description: None,
            sampling: SamplingConfig {
                temperature: 0.0,
                max_auto_replies: 0,
                human_input_mode: HumanInputMode::Never,
            },
            role: AgentRole::UserProxy,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.sampling.temperature = temperature;
        self
    }

    pub fn with_max_auto_replies(mut self, max_auto_replies: usize) -> Self {
        self.sampling.max_auto_replies = max_auto_replies;
        self
    }

    pub fn with_human_input_mode(mut self, mode: HumanInputMode) -> Self {
        self.sampling.human_input_mode = mode;
        self
    }

    /// `true` if this participant can ever be selected to produce a turn.
    pub fn can_generate(&self) -> bool {
        self.role == AgentRole::Assistant && self.sampling.max_auto_replies > 0
    }

    /// Short line used when listing roles to a selection manager.
    pub fn role_summary(&self) -> String {
        let about = self
            .description
            .as_deref()
            .unwrap_or(self.system_prompt.as_str());
        format!("{}: {}", self.name, about)
    }
}
