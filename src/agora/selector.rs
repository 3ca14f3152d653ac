//! Turn selection: who speaks next.
//!
//! A selector only ever picks an *eligible* agent: an assistant (never the user proxy) that
//! has not yet used up its `max_auto_replies`. When nobody is eligible it returns `None` and
//! the coordinator stops.
//!
//! - [`RoundRobinSelector`] cycles through agents starting after the last speaker.
//! - [`AutoSelector`] asks a manager LLM to name the next role from the agents' descriptions
//!   and falls back to round-robin when the answer names no eligible agent or the call fails.

use crate::agent::{AgentDescriptor, AgentRole};
use crate::client_wrapper::{Message, Role};
use crate::llm_adapter::LlmAdapter;
use crate::transcript::Transcript;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

/// Strategy used by the coordinator to choose speakers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpeakerSelection {
    #[default]
    RoundRobin,
    /// LLM-assisted choice with round-robin fallback.
    Auto,
}

/// Everything a selector may look at. Indices refer to `agents`.
pub struct SelectionContext<'a> {
    pub agents: &'a [AgentDescriptor],
    pub transcript: &'a Transcript,
    pub reply_counts: &'a HashMap<String, usize>,
    pub last_speaker: Option<&'a str>,
    pub cancel: &'a CancellationToken,
}

impl SelectionContext<'_> {
    /// An assistant still under its reply budget.
    pub fn is_eligible(&self, index: usize) -> bool {
        match self.agents.get(index) {
            Some(agent) => {
                agent.role == AgentRole::Assistant
                    && self.reply_counts.get(&agent.name).copied().unwrap_or(0)
                        < agent.sampling.max_auto_replies
            }
            None => false,
        }
    }

    pub fn eligible(&self) -> Vec<usize> {
        (0..self.agents.len()).filter(|&i| self.is_eligible(i)).collect()
    }
}

#[async_trait]
pub trait SpeakerSelector: Send + Sync {
    /// Index of the next speaker, or `None` when every agent is exhausted.
    async fn select_speaker(&mut self, ctx: &SelectionContext<'_>) -> Option<usize>;

    fn strategy_name(&self) -> &'static str;
}

/// Plain round-robin over eligible agents.
#[derive(Debug, Default, Clone)]
pub struct RoundRobinSelector;

impl RoundRobinSelector {
    pub fn new() -> Self {
        Self
    }

    pub fn pick(ctx: &SelectionContext<'_>) -> Option<usize> {
        let count = ctx.agents.len();
        if count == 0 {
            return None;
        }
        let start = ctx
            .last_speaker
            .and_then(|last| ctx.agents.iter().position(|a| a.name == last))
            .map(|pos| pos + 1)
            .unwrap_or(0);

        (0..count)
            .map(|offset| (start + offset) % count)
            .find(|&index| ctx.is_eligible(index))
    }
}

#[async_trait]
impl SpeakerSelector for RoundRobinSelector {
    async fn select_speaker(&mut self, ctx: &SelectionContext<'_>) -> Option<usize> {
        Self::pick(ctx)
    }

    fn strategy_name(&self) -> &'static str {
        "round_robin"
    }
}

/// Lets a manager LLM choose the next role, the way a free-form group chat does.
pub struct AutoSelector {
    manager: LlmAdapter,
    temperature: f32,
}

impl AutoSelector {
    pub fn new(manager: LlmAdapter, temperature: f32) -> Self {
        Self {
            manager,
            temperature,
        }
    }

    fn selection_prompt(ctx: &SelectionContext<'_>, eligible: &[usize]) -> (String, String) {
        let roles = eligible
            .iter()
            .map(|&i| ctx.agents[i].role_summary())
            .collect::<Vec<_>>()
            .join("\n");
        let names = eligible
            .iter()
            .map(|&i| ctx.agents[i].name.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        let system = format!(
            "You are in a role play game. The following roles are available:\n{}.\n\n\
             Read the following conversation.\nThen select the next role from [{}] to play. \
             Only return the role.",
            roles, names
        );
        let instruction = format!(
            "Read the above conversation. Then select the next role from [{}] to play. \
             Only return the role.",
            names
        );
        (system, instruction)
    }

    /// Resolve the manager's answer to exactly one eligible agent.
    pub fn match_reply(
        agents: &[AgentDescriptor],
        eligible: &[usize],
        reply: &str,
    ) -> Option<usize> {
        let reply = reply.trim();
        if let Some(&exact) = eligible.iter().find(|&&i| agents[i].name == reply) {
            return Some(exact);
        }

        let mentioned: Vec<usize> = eligible
            .iter()
            .copied()
            .filter(|&i| mentions(reply, &agents[i].name))
            .collect();
        match mentioned.as_slice() {
            [single] => Some(*single),
            _ => None,
        }
    }
}

#[async_trait]
impl SpeakerSelector for AutoSelector {
    async fn select_speaker(&mut self, ctx: &SelectionContext<'_>) -> Option<usize> {
        let eligible = ctx.eligible();
        match eligible.as_slice() {
            [] => return None,
            [only] => return Some(*only),
            _ => {}
        }

        let (system, instruction) = Self::selection_prompt(ctx, &eligible);
        let mut context = ctx.transcript.to_messages();
        context.push(Message::new(Role::User, instruction));

        match self
            .manager
            .complete_cancellable(&system, &context, self.temperature, ctx.cancel)
            .await
        {
            Ok(reply) => match Self::match_reply(ctx.agents, &eligible, &reply) {
                Some(index) => Some(index),
                None => {
                    log::debug!(
                        "AutoSelector::select_speaker(...): {:?} names no single eligible agent, using round-robin",
                        reply
                    );
                    RoundRobinSelector::pick(ctx)
                }
            },
            Err(err) => {
                log::warn!(
                    "AutoSelector::select_speaker(...): manager call failed, using round-robin: {}",
                    err
                );
                RoundRobinSelector::pick(ctx)
            }
        }
    }

    fn strategy_name(&self) -> &'static str {
        "auto"
    }
}

/// Build the selector for `selection`. `manager` is only used by [`SpeakerSelection::Auto`].
pub fn build_selector(
    selection: SpeakerSelection,
    manager: &LlmAdapter,
    temperature: f32,
) -> Box<dyn SpeakerSelector> {
    match selection {
        SpeakerSelection::RoundRobin => Box::new(RoundRobinSelector::new()),
        SpeakerSelection::Auto => Box::new(AutoSelector::new(manager.clone(), temperature)),
    }
}

/// Case-insensitive whole-word search for `name` in `text`.
fn mentions(text: &str, name: &str) -> bool {
    if name.is_empty() {
        return false;
    }
    let text = text.to_lowercase();
    let name = name.to_lowercase();
    text.match_indices(&name).any(|(start, found)| {
        let before = text[..start].chars().next_back();
        let after = text[start + found.len()..].chars().next();
        !before.map_or(false, char::is_alphanumeric) && !after.map_or(false, char::is_alphanumeric)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agents(names: &[&str]) -> Vec<AgentDescriptor> {
        names
            .iter()
            .map(|n| {
                AgentDescriptor::assistant(*n, format!("You are {}", n)).with_max_auto_replies(2)
            })
            .collect()
    }

    #[test]
    fn round_robin_starts_after_last_speaker_and_skips_exhausted() {
        let agents = agents(&["A", "B", "C"]);
        let transcript = Transcript::new();
        let cancel = CancellationToken::new();
        let mut counts = HashMap::new();
        counts.insert("C".to_string(), 2);

        let ctx = SelectionContext {
            agents: &agents,
            transcript: &transcript,
            reply_counts: &counts,
            last_speaker: Some("B"),
            cancel: &cancel,
        };
        assert_eq!(RoundRobinSelector::pick(&ctx), Some(0));

        let ctx = SelectionContext {
            last_speaker: Some("User"),
            ..ctx
        };
        assert_eq!(RoundRobinSelector::pick(&ctx), Some(0));
    }

    #[test]
    fn round_robin_returns_none_when_everyone_is_exhausted() {
        let agents = agents(&["A", "B"]);
        let transcript = Transcript::new();
        let cancel = CancellationToken::new();
        let counts: HashMap<String, usize> =
            [("A".to_string(), 2), ("B".to_string(), 5)].into_iter().collect();
        let ctx = SelectionContext {
            agents: &agents,
            transcript: &transcript,
            reply_counts: &counts,
            last_speaker: None,
            cancel: &cancel,
        };
        assert_eq!(RoundRobinSelector::pick(&ctx), None);
    }

    #[test]
    fn user_proxy_is_never_eligible() {
        let agents = vec![AgentDescriptor::user_proxy("User")];
        let transcript = Transcript::new();
        let cancel = CancellationToken::new();
        let counts = HashMap::new();
        let ctx = SelectionContext {
            agents: &agents,
            transcript: &transcript,
            reply_counts: &counts,
            last_speaker: None,
            cancel: &cancel,
        };
        assert!(ctx.eligible().is_empty());
    }

    #[test]
    fn manager_reply_matching() {
        let agents = agents(&["Planner", "Critic", "Coder"]);
        let eligible = vec![0, 1, 2];
        assert_eq!(AutoSelector::match_reply(&agents, &eligible, "Critic"), Some(1));
        assert_eq!(AutoSelector::match_reply(&agents, &eligible, " the coder should go"), Some(2));
        assert_eq!(AutoSelector::match_reply(&agents, &eligible, "Planner or Critic"), None);
        assert_eq!(AutoSelector::match_reply(&agents, &eligible, "Coders"), None);
        assert_eq!(AutoSelector::match_reply(&agents, &[0, 1], "Coder"), None);
    }
}
