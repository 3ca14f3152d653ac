//! The group coordinator: the round loop of a multi-agent chat.
//!
//! Each round walks `SELECT_SPEAKER → INVOKE → APPEND → CHECK_TERMINATION`:
//!
//! ```text
//! opening user entry (if any) ── appended once, before round 1
//! round 1..=max_round
//!   ├─ selector picks an eligible assistant   (none left → RepliesExhausted)
//!   ├─ LlmAdapter::complete_cancellable(...)  (error → abort with ChatError)
//!   ├─ Transcript::append(assistant entry)    (relay closed → Cancelled)
//!   └─ reply ends with the termination keyword → TerminationRequested
//! ```
//!
//! The coordinator owns its [`Transcript`] outright. When a relay is attached, every append
//! is streamed to the consumer as it happens.
//!
//! # Example
//!
//! ```rust,no_run
//! use agora::agent::AgentDescriptor;
//! use agora::bootstrap::Session;
//! use agora::coordinator::GroupCoordinator;
//! use agora::llm_adapter::LlmAdapter;
//! use agora::selector::RoundRobinSelector;
//! use agora::clients::deepseek::DeepSeekClient;
//! use std::sync::Arc;
//!
//! # async {
//! let client = DeepSeekClient::new_with_model_str("sk-...", "deepseek-chat").unwrap();
//! let adapter = LlmAdapter::new(Arc::new(client), 0.0);
//! let session = Session::new(
//!     vec![AgentDescriptor::assistant("A", "You are A")],
//!     AgentDescriptor::user_proxy("User"),
//!     Vec::new(),
//!     Some("hi".to_string()),
//!     3,
//! );
//! let selector = Box::new(RoundRobinSelector::new());
//! let mut coordinator = GroupCoordinator::new(session, adapter, selector);
//! let outcome = coordinator.run().await.unwrap();
//! println!("stopped after {} rounds: {:?}", outcome.rounds, outcome.stop_reason);
//! # };
//! ```

use crate::agent::{AgentDescriptor, HumanInputMode};
use crate::bootstrap::Session;
use crate::config::AgoraConfig;
use crate::error::ChatError;
use crate::event::{CoordinatorEvent, EventHandler};
use crate::llm_adapter::LlmAdapter;
use crate::relay::RelaySender;
use crate::selector::{build_selector, SelectionContext, SpeakerSelector};
use crate::transcript::{Transcript, TranscriptEntry};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Why a run ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// `max_round` agent turns were taken.
    MaxRound,
    /// Every assistant used up its reply budget.
    RepliesExhausted,
    /// An agent ended its reply with the termination keyword.
    TerminationRequested,
    /// The consumer went away or the cancellation token fired.
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorOutcome {
    /// Agent turns taken in this run.
    pub rounds: usize,
    pub stop_reason: StopReason,
}

pub struct GroupCoordinator {
    conversation_id: String,
    agents: Vec<AgentDescriptor>,
    user_proxy: AgentDescriptor,
    transcript: Transcript,
    opening_message: Option<String>,
    adapter: LlmAdapter,
    selector: Box<dyn SpeakerSelector>,
    max_round: usize,
    reply_counts: HashMap<String, usize>,
    termination_keyword: Option<String>,
    cancel: CancellationToken,
    event_handler: Option<Arc<dyn EventHandler>>,
}

impl GroupCoordinator {
    pub fn new(session: Session, adapter: LlmAdapter, selector: Box<dyn SpeakerSelector>) -> Self {
        Self {
            conversation_id: session.conversation_id,
            agents: session.agents,
            user_proxy: session.user_proxy,
            transcript: Transcript::seeded(session.seed),
            opening_message: session.opening_message,
            adapter,
            selector,
            max_round: session.max_round,
            reply_counts: HashMap::new(),
            termination_keyword: None,
            cancel: CancellationToken::new(),
            event_handler: None,
        }
    }

    /// Selector and termination keyword taken from `config`. The manager LLM used by
    /// [`SpeakerSelection::Auto`](crate::selector::SpeakerSelection::Auto) shares `adapter`.
    pub fn from_config(session: Session, adapter: LlmAdapter, config: &AgoraConfig) -> Self {
        let selector = build_selector(
            config.speaker_selection,
            &adapter,
            config.default_temperature,
        );
        Self::new(session, adapter, selector)
            .with_termination_keyword(config.termination_keyword.clone())
    }

    /// Stop early when `cancel` fires. An in-flight adapter call is abandoned.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    /// End the chat as soon as an agent's reply ends with `keyword`.
    pub fn with_termination_keyword(mut self, keyword: Option<String>) -> Self {
        self.termination_keyword = keyword.filter(|k| !k.trim().is_empty());
        self
    }

    /// Stream every entry appended from now on.
    pub fn attach_relay(&mut self, relay: RelaySender) {
        self.transcript.attach_relay(relay);
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn into_transcript(self) -> Transcript {
        self.transcript
    }

    async fn emit(&self, event: CoordinatorEvent) {
        if let Some(handler) = &self.event_handler {
            handler.on_coordinator_event(&event).await;
        }
    }

    fn is_termination(&self, reply: &str) -> bool {
        match &self.termination_keyword {
            Some(keyword) => reply.trim_end().ends_with(keyword.as_str()),
            None => false,
        }
    }

    /// Drive the chat until a stop condition or an adapter failure.
    ///
    /// Adapter failures abort the loop and are returned as-is; everything else ends in a
    /// [`CoordinatorOutcome`]. Reply budgets count turns taken in this run only.
    pub async fn run(&mut self) -> Result<CoordinatorOutcome, ChatError> {
        self.emit(CoordinatorEvent::RunStarted {
            conversation_id: self.conversation_id.clone(),
            agent_count: self.agents.len(),
            max_round: self.max_round,
            seeded_entries: self.transcript.len(),
        })
        .await;

        for agent in &self.agents {
            if agent.sampling.human_input_mode == HumanInputMode::Always {
                log::warn!(
                    "GroupCoordinator::run(): agent '{}' asks for human input; no human channel exists, replying automatically",
                    agent.name
                );
            }
        }

        let outcome = self.round_loop().await?;

        log::info!(
            "GroupCoordinator::run(): conversation {} stopped after {} rounds ({:?})",
            self.conversation_id,
            outcome.rounds,
            outcome.stop_reason
        );
        self.emit(CoordinatorEvent::RunCompleted {
            conversation_id: self.conversation_id.clone(),
            rounds: outcome.rounds,
            stop_reason: outcome.stop_reason,
        })
        .await;
        Ok(outcome)
    }

    async fn round_loop(&mut self) -> Result<CoordinatorOutcome, ChatError> {
        let cancelled = |rounds| CoordinatorOutcome {
            rounds,
            stop_reason: StopReason::Cancelled,
        };

        if let Some(opening) = self.opening_message.take() {
            let entry = TranscriptEntry::user(self.user_proxy.name.as_str(), opening);
            if let Err(ChatError::Cancelled) = self.transcript.append(entry).await {
                return Ok(cancelled(0));
            }
        }

        let mut rounds = 0;
        while rounds < self.max_round {
            if self.cancel.is_cancelled() {
                return Ok(cancelled(rounds));
            }

            let selected = {
                let ctx = SelectionContext {
                    agents: &self.agents,
                    transcript: &self.transcript,
                    reply_counts: &self.reply_counts,
                    last_speaker: self.transcript.last().map(|e| e.speaker_name.as_str()),
                    cancel: &self.cancel,
                };
                self.selector.select_speaker(&ctx).await
            };
            let Some(index) = selected else {
                return Ok(CoordinatorOutcome {
                    rounds,
                    stop_reason: StopReason::RepliesExhausted,
                });
            };
            if self.cancel.is_cancelled() {
                return Ok(cancelled(rounds));
            }

            let round = rounds + 1;
            let speaker = self.agents[index].clone();
            self.emit(CoordinatorEvent::SpeakerSelected {
                conversation_id: self.conversation_id.clone(),
                round,
                speaker: speaker.name.clone(),
                strategy: self.selector.strategy_name(),
            })
            .await;
            log::debug!(
                "GroupCoordinator::round_loop(): round {}/{} -> '{}'",
                round,
                self.max_round,
                speaker.name
            );

            let context = self.transcript.to_messages();
            let reply = match self
                .adapter
                .complete_cancellable(
                    &speaker.system_prompt,
                    &context,
                    speaker.sampling.temperature,
                    &self.cancel,
                )
                .await
            {
                Ok(reply) => reply,
                Err(ChatError::Cancelled) => return Ok(cancelled(rounds)),
                Err(err) => {
                    log::error!(
                        "GroupCoordinator::round_loop(): agent '{}' failed in round {}: {}",
                        speaker.name,
                        round,
                        err
                    );
                    self.emit(CoordinatorEvent::TurnFailed {
                        conversation_id: self.conversation_id.clone(),
                        round,
                        speaker: speaker.name.clone(),
                        error: err.to_string(),
                    })
                    .await;
                    return Err(err);
                }
            };

            let terminate = self.is_termination(&reply);
            let response_length = reply.chars().count();
            let appended = self
                .transcript
                .append(TranscriptEntry::assistant(speaker.name.as_str(), reply))
                .await;
            rounds = round;
            match appended {
                Ok(()) => {}
                Err(ChatError::Cancelled) => return Ok(cancelled(rounds)),
                Err(err) => return Err(err),
            }
            *self.reply_counts.entry(speaker.name.clone()).or_insert(0) += 1;

            let tokens_used = self.adapter.last_usage().await;
            self.emit(CoordinatorEvent::TurnCompleted {
                conversation_id: self.conversation_id.clone(),
                round,
                speaker: speaker.name,
                tokens_used,
                response_length,
            })
            .await;

            if terminate {
                return Ok(CoordinatorOutcome {
                    rounds,
                    stop_reason: StopReason::TerminationRequested,
                });
            }
        }

        Ok(CoordinatorOutcome {
            rounds,
            stop_reason: StopReason::MaxRound,
        })
    }
}
