//! The chat entry points an HTTP layer calls into.
//!
//! [`ChatService`] bundles one backend client, one persistence sink and the process config.
//! [`stream_chat`](ChatService::stream_chat) streams a request turn by turn (round limit
//! `stream_max_round`); [`run_chat`](ChatService::run_chat) runs it to completion and returns
//! the full transcript (round limit `batch_max_round`).

use crate::bootstrap::{SessionBootstrap, SessionRequest};
use crate::client_wrapper::ClientWrapper;
use crate::clients::deepseek::DeepSeekClient;
use crate::config::AgoraConfig;
use crate::coordinator::GroupCoordinator;
use crate::error::ChatError;
use crate::event::EventHandler;
use crate::llm_adapter::LlmAdapter;
use crate::persistence::{NoopSink, PersistenceSink};
use crate::streaming::{FrameStream, StreamingSession};
use crate::transcript::TranscriptEntry;
use std::sync::Arc;

pub struct ChatService {
    adapter: LlmAdapter,
    sink: Arc<dyn PersistenceSink>,
    config: AgoraConfig,
    event_handler: Option<Arc<dyn EventHandler>>,
}

impl ChatService {
    pub fn new(
        client: Arc<dyn ClientWrapper>,
        sink: Arc<dyn PersistenceSink>,
        config: AgoraConfig,
    ) -> Self {
        let adapter = LlmAdapter::new(client, config.temperature_floor)
            .with_retry_policy(config.retry.clone());
        Self {
            adapter,
            sink,
            config,
            event_handler: None,
        }
    }

    /// DeepSeek client built from `config`, nothing persisted.
    pub fn from_config(config: AgoraConfig) -> Result<Self, ChatError> {
        let client = DeepSeekClient::from_config(&config)?;
        Ok(Self::new(Arc::new(client), Arc::new(NoopSink), config))
    }

    /// Build the DeepSeek client and stream `request` in one step. A client that cannot be
    /// built (a missing API key, say) comes back as a single error frame followed by done.
    pub fn stream_from_config(
        config: AgoraConfig,
        sink: Arc<dyn PersistenceSink>,
        request: SessionRequest,
    ) -> FrameStream {
        match Self::from_config(config) {
            Ok(service) => service.with_sink(sink).stream_chat(request),
            Err(err) => {
                log::error!("ChatService::stream_from_config(...): {}", err);
                FrameStream::failed(request.conversation_id.unwrap_or_default(), &err)
            }
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn PersistenceSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    pub fn config(&self) -> &AgoraConfig {
        &self.config
    }

    /// Start a streamed chat. Bootstrap failures come back as a stream holding a single error
    /// frame followed by done.
    pub fn stream_chat(&self, request: SessionRequest) -> FrameStream {
        let requested_id = request.conversation_id.clone().unwrap_or_default();
        let session = match SessionBootstrap::new(&self.config)
            .build(request, self.config.stream_max_round)
        {
            Ok(session) => session,
            Err(err) => {
                log::warn!("ChatService::stream_chat(...): rejected request: {}", err);
                return FrameStream::failed(requested_id, &err);
            }
        };

        let mut streaming =
            StreamingSession::new(self.adapter.clone(), self.sink.clone(), &self.config);
        if let Some(handler) = &self.event_handler {
            streaming = streaming.with_event_handler(handler.clone());
        }
        streaming.start(session)
    }

    /// Run a chat to completion and return every entry, seeded history included.
    pub async fn run_chat(
        &self,
        request: SessionRequest,
    ) -> Result<Vec<TranscriptEntry>, ChatError> {
        let session =
            SessionBootstrap::new(&self.config).build(request, self.config.batch_max_round)?;
        let mut coordinator =
            GroupCoordinator::from_config(session, self.adapter.clone(), &self.config);
        if let Some(handler) = &self.event_handler {
            coordinator = coordinator.with_event_handler(handler.clone());
        }

        coordinator.run().await?;
        Ok(coordinator.into_transcript().into_entries())
    }
}
