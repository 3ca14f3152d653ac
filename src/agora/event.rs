//! Coordinator event system.
//!
//! Implement [`EventHandler`] to receive real-time notifications while a group chat runs:
//! run start/end, speaker selection, each agent turn and failures. The single method has a
//! default no-op implementation. The handler is wrapped in `Arc<dyn EventHandler>` and
//! attached with
//! [`GroupCoordinator::with_event_handler`](crate::coordinator::GroupCoordinator::with_event_handler)
//! or [`StreamingSession::with_event_handler`](crate::streaming::StreamingSession::with_event_handler).
//!
//! # Example
//!
//! ```rust,no_run
//! use agora::event::{CoordinatorEvent, EventHandler};
//! use async_trait::async_trait;
//!
//! struct Printer;
//!
//! #[async_trait]
//! impl EventHandler for Printer {
//!     async fn on_coordinator_event(&self, event: &CoordinatorEvent) {
//!         if let CoordinatorEvent::TurnCompleted { speaker, round, .. } = event {
//!             println!("round {}: {} spoke", round, speaker);
//!         }
//!     }
//! }
//! ```

use crate::client_wrapper::TokenUsage;
use crate::coordinator::StopReason;
use async_trait::async_trait;

/// Events emitted by a [`GroupCoordinator`](crate::coordinator::GroupCoordinator).
///
/// ```text
/// RunStarted
///   └─ per round: SpeakerSelected → TurnCompleted (or TurnFailed)
/// RunCompleted (not emitted after TurnFailed)
/// ```
#[derive(Debug, Clone)]
pub enum CoordinatorEvent {
    /// The round loop is about to start.
    RunStarted {
        conversation_id: String,
        agent_count: usize,
        max_round: usize,
        /// Number of seeded history entries.
        seeded_entries: usize,
    },

    /// A speaker was chosen for `round` (1-based).
    SpeakerSelected {
        conversation_id: String,
        round: usize,
        speaker: String,
        /// Selection strategy that made the choice.
        strategy: &'static str,
    },

    /// The speaker's reply was appended to the transcript.
    TurnCompleted {
        conversation_id: String,
        round: usize,
        speaker: String,
        /// Token usage reported by the backend, if it tracks any.
        tokens_used: Option<TokenUsage>,
        /// Character length of the reply.
        response_length: usize,
    },

    /// The adapter call for `speaker` failed; the run aborts.
    TurnFailed {
        conversation_id: String,
        round: usize,
        speaker: String,
        error: String,
    },

    /// The round loop stopped without error.
    RunCompleted {
        conversation_id: String,
        rounds: usize,
        stop_reason: StopReason,
    },
}

/// Receives coordinator events. Implementations must be cheap; they run inline with the loop.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn on_coordinator_event(&self, _event: &CoordinatorEvent) {}
}

/// Forwards every event to the `log` facade at debug level (info for run boundaries).
pub struct LoggingEventHandler;

#[async_trait]
impl EventHandler for LoggingEventHandler {
    async fn on_coordinator_event(&self, event: &CoordinatorEvent) {
        match event {
            CoordinatorEvent::RunStarted { .. } | CoordinatorEvent::RunCompleted { .. } => {
                log::info!("{:?}", event)
            }
            CoordinatorEvent::TurnFailed { .. } => log::warn!("{:?}", event),
            _ => log::debug!("{:?}", event),
        }
    }
}
