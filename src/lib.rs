//! # agora
//!
//! agora runs group chats between several LLM-backed personas and streams every turn to the
//! caller as it is produced.
//!
//! The crate is layered leaves first:
//!
//! * **Agent descriptors**: [`agent::AgentDescriptor`] holds a persona's name, system prompt
//!   and sampling settings. Data only.
//! * **LLM client adapter**: [`llm_adapter::LlmAdapter`] wraps any [`ClientWrapper`] and
//!   turns `(system prompt, transcript, temperature)` into one reply, clamping the temperature
//!   into `[floor, 1.0]`.
//! * **Group coordinator**: [`coordinator::GroupCoordinator`] picks the next speaker with a
//!   [`selector::SpeakerSelector`], calls the adapter and appends the reply to its
//!   [`transcript::Transcript`] until a round limit, an exhausted reply budget or a
//!   termination keyword stops it.
//! * **Streaming session**: [`streaming::StreamingSession`] runs the coordinator on a Tokio
//!   task and relays each appended entry through a bounded [`relay`] to a
//!   [`streaming::FrameStream`], which emits server-sent event [`frame`]s.
//! * **Persistence sink**: [`persistence::PersistenceSink`] receives every streamed message.
//! * **Session bootstrap**: [`bootstrap::SessionBootstrap`] validates a chat request, merges
//!   per-agent config and seeds prior history.
//!
//! [`service::ChatService`] ties these together behind two calls, `stream_chat` and
//! `run_chat`.
//!
//! ## Getting Started
//!
//! ```rust,no_run
//! use agora::bootstrap::SessionRequest;
//! use agora::{AgoraConfig, ChatService};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     agora::init_logger();
//!
//!     let service = ChatService::from_config(AgoraConfig::from_env()?)?;
//!     let request: SessionRequest = serde_json::from_str(r#"{
//!         "agents": [
//!             {"name": "Planner", "system_message": "You plan the work."},
//!             {"name": "Critic", "system_message": "You find flaws.", "config": {"temperature": 0.2}}
//!         ],
//!         "message": "How should we migrate the billing database?"
//!     }"#)?;
//!
//!     let mut frames = service.stream_chat(request);
//!     while let Some(frame) = frames.next_frame().await {
//!         print!("{}", frame.to_sse());
//!     }
//!     Ok(())
//! }
//! ```

use std::sync::Once;

static INIT_LOGGER: Once = Once::new();

/// Initialise the global [`env_logger`] subscriber exactly once.
///
/// Applications embedding agora can opt in to `RUST_LOG` driven diagnostics without picking
/// a logging backend upfront.
///
/// ```rust
/// agora::init_logger();
/// log::info!("Logger is ready");
/// ```
pub fn init_logger() {
    INIT_LOGGER.call_once(|| {
        env_logger::init();
    });
}

// Import the top-level `agora` module.
pub mod agora;

// Re-exporting key items for easier external access.
pub use agora::agent;
pub use agora::agent::{AgentDescriptor, AgentRole, HumanInputMode, SamplingConfig};
pub use agora::bootstrap;
pub use agora::bootstrap::{Session, SessionBootstrap, SessionRequest};
pub use agora::client_wrapper;
pub use agora::client_wrapper::{ClientWrapper, Message, Role, TokenUsage};
pub use agora::clients;
pub use agora::config;
pub use agora::config::AgoraConfig;
pub use agora::coordinator;
pub use agora::coordinator::{CoordinatorOutcome, GroupCoordinator, StopReason};
pub use agora::error;
pub use agora::error::ChatError;
pub use agora::event;
pub use agora::event::{CoordinatorEvent, EventHandler};
pub use agora::frame;
pub use agora::frame::StreamFrame;
pub use agora::llm_adapter;
pub use agora::llm_adapter::{LlmAdapter, RetryPolicy};
pub use agora::persistence;
pub use agora::persistence::PersistenceSink;
pub use agora::relay;
pub use agora::selector;
pub use agora::service;
pub use agora::service::ChatService;
pub use agora::streaming;
pub use agora::streaming::{FrameStream, StreamingSession};
pub use agora::transcript;
pub use agora::transcript::{Transcript, TranscriptEntry};
