//! Streaming sessions: a coordinator on a background task, frames on the consumer side.
//!
//! ```text
//! tokio task                          relay (bounded FIFO)          FrameStream
//! GroupCoordinator::run()  ──Entry──▶  ┌───────────────┐  ──pull──▶ next_frame()
//!   Transcript::append() ─copy──────▶  │ Entry … Error │              ├─ drop opening user echo
//! on exit: Error (if failed), Done ─▶  └───────────────┘              ├─ PersistenceSink::save()
//!                                                                     └─ StreamFrame (SSE)
//! ```
//!
//! The consumer waits at most `relay_timeout` for each item; an expired wait cancels the run
//! and ends the stream with an error frame. Dropping the [`FrameStream`] cancels the run too:
//! the coordinator's in-flight LLM call is abandoned and the worker exits quietly.
//!
//! # Example
//!
//! ```rust,no_run
//! use agora::bootstrap::{SessionBootstrap, SessionRequest};
//! use agora::clients::deepseek::DeepSeekClient;
//! use agora::llm_adapter::LlmAdapter;
//! use agora::persistence::NoopSink;
//! use agora::streaming::StreamingSession;
//! use agora::AgoraConfig;
//! use std::sync::Arc;
//!
//! # async {
//! let config = AgoraConfig::from_env().unwrap();
//! let adapter = LlmAdapter::new(Arc::new(DeepSeekClient::from_config(&config).unwrap()), 0.0);
//! let request: SessionRequest = serde_json::from_str(
//!     r#"{"agents": [{"name": "A", "system_message": "You are A"}], "message": "hi"}"#,
//! ).unwrap();
//! let session = SessionBootstrap::new(&config).build(request, config.stream_max_round).unwrap();
//!
//! let mut frames = StreamingSession::new(adapter, Arc::new(NoopSink), &config).start(session);
//! while let Some(frame) = frames.next_frame().await {
//!     print!("{}", frame.to_sse());
//! }
//! # };
//! ```

use crate::bootstrap::Session;
use crate::client_wrapper::Role;
use crate::config::AgoraConfig;
use crate::coordinator::{CoordinatorOutcome, GroupCoordinator};
use crate::error::ChatError;
use crate::event::EventHandler;
use crate::frame::StreamFrame;
use crate::llm_adapter::LlmAdapter;
use crate::persistence::{NoopSink, PersistenceSink};
use crate::relay::{relay, RelayItem, RelayReceiver};
use crate::transcript::TranscriptEntry;
use futures_util::stream::{self, Stream};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};

/// Result of the background coordinator task.
pub type WorkerHandle = JoinHandle<Result<CoordinatorOutcome, ChatError>>;

/// Launches coordinators on background tasks and hands back their frame streams.
pub struct StreamingSession {
    adapter: LlmAdapter,
    sink: Arc<dyn PersistenceSink>,
    config: AgoraConfig,
    event_handler: Option<Arc<dyn EventHandler>>,
}

impl StreamingSession {
    pub fn new(
        adapter: LlmAdapter,
        sink: Arc<dyn PersistenceSink>,
        config: &AgoraConfig,
    ) -> Self {
        Self {
            adapter,
            sink,
            config: config.clone(),
            event_handler: None,
        }
    }

    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    /// Spawn the coordinator for `session` and return the consumer side.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self, session: Session) -> FrameStream {
        let cancel = CancellationToken::new();
        let (tx, rx) = relay(self.config.relay_capacity);
        let tx = tx.with_cancellation(cancel.clone());

        let mut coordinator =
            GroupCoordinator::from_config(session, self.adapter.clone(), &self.config)
                .with_cancellation(cancel.clone());
        if let Some(handler) = &self.event_handler {
            coordinator = coordinator.with_event_handler(handler.clone());
        }
        coordinator.attach_relay(tx.clone());
        let conversation_id = coordinator.conversation_id().to_string();

        log::debug!(
            "StreamingSession::start(): spawning coordinator for conversation {}",
            conversation_id
        );
        let worker = tokio::spawn(async move {
            let result = coordinator.run().await;
            match &result {
                Ok(_) | Err(ChatError::Cancelled) => {}
                Err(err) => {
                    if tx.send_error(err.to_string()).await.is_err() {
                        log::debug!(
                            "StreamingSession worker: consumer gone before error: {}",
                            err
                        );
                    }
                }
            }
            if let Err(err) = tx.finish().await {
                log::debug!(
                    "StreamingSession worker: consumer gone before done marker: {}",
                    err
                );
            }
            result
        });

        FrameStream {
            rx: Some(rx),
            sink: self.sink.clone(),
            conversation_id,
            timeout: self.config.relay_timeout,
            first: true,
            pending: VecDeque::new(),
            finished: false,
            cancel: cancel.clone(),
            _cancel_on_drop: Some(cancel.drop_guard()),
            worker: Some(worker),
        }
    }
}

/// Consumer side of a streaming session. Yields frames in append order and always ends with
/// [`StreamFrame::Done`].
pub struct FrameStream {
    rx: Option<RelayReceiver>,
    sink: Arc<dyn PersistenceSink>,
    conversation_id: String,
    timeout: Duration,
    first: bool,
    pending: VecDeque<StreamFrame>,
    finished: bool,
    cancel: CancellationToken,
    _cancel_on_drop: Option<DropGuard>,
    worker: Option<WorkerHandle>,
}

impl FrameStream {
    /// A stream that never started: one error frame, then done.
    pub fn failed(conversation_id: impl Into<String>, error: &ChatError) -> Self {
        Self {
            rx: None,
            sink: Arc::new(NoopSink),
            conversation_id: conversation_id.into(),
            timeout: Duration::ZERO,
            first: false,
            pending: VecDeque::from([
                StreamFrame::error(error.to_string()),
                StreamFrame::Done,
            ]),
            finished: false,
            cancel: CancellationToken::new(),
            _cancel_on_drop: None,
            worker: None,
        }
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// Take the background task's handle, e.g. to await its outcome after the stream ends.
    pub fn take_worker(&mut self) -> Option<WorkerHandle> {
        self.worker.take()
    }

    /// Stop the coordinator, even one blocked on a full relay. Frames already relayed are
    /// still delivered, followed by done.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Next frame, or `None` once [`StreamFrame::Done`] has been returned.
    pub async fn next_frame(&mut self) -> Option<StreamFrame> {
        if let Some(frame) = self.pending.pop_front() {
            if frame == StreamFrame::Done {
                self.finished = true;
            }
            return Some(frame);
        }
        if self.finished {
            return None;
        }

        loop {
            let Some(rx) = self.rx.as_mut() else {
                self.finished = true;
                return Some(StreamFrame::Done);
            };

            match rx.recv_timeout(self.timeout).await {
                Ok(Some(RelayItem::Entry(entry))) => {
                    let first = std::mem::replace(&mut self.first, false);
                    if first && entry.role == Role::User {
                        continue;
                    }
                    self.persist(&entry).await;
                    return Some(StreamFrame::entry(&entry));
                }
                Ok(Some(RelayItem::Error(message))) => {
                    return Some(self.terminate(StreamFrame::error(message)));
                }
                Ok(Some(RelayItem::Done)) => {
                    self.close();
                    self.finished = true;
                    return Some(StreamFrame::Done);
                }
                Ok(None) if self.cancel.is_cancelled() => {
                    self.close();
                    self.finished = true;
                    return Some(StreamFrame::Done);
                }
                Ok(None) => {
                    log::warn!(
                        "FrameStream::next_frame(): worker for conversation {} exited early",
                        self.conversation_id
                    );
                    let frame = StreamFrame::error("Conversation ended unexpectedly");
                    return Some(self.terminate(frame));
                }
                Err(err) => {
                    log::warn!(
                        "FrameStream::next_frame(): conversation {}: {}",
                        self.conversation_id,
                        err
                    );
                    self.cancel.cancel();
                    return Some(self.terminate(StreamFrame::error(err.to_string())));
                }
            }
        }
    }

    /// Drain the stream into a vector, `Done` included.
    pub async fn collect_frames(mut self) -> Vec<StreamFrame> {
        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame().await {
            frames.push(frame);
        }
        frames
    }

    pub fn into_stream(self) -> impl Stream<Item = StreamFrame> + Send {
        stream::unfold(self, |mut frames| async move {
            frames.next_frame().await.map(|frame| (frame, frames))
        })
    }

    /// SSE text blocks, ready to write to an HTTP response.
    pub fn into_sse_stream(self) -> impl Stream<Item = String> + Send {
        stream::unfold(self, |mut frames| async move {
            frames.next_frame().await.map(|frame| (frame.to_sse(), frames))
        })
    }

    async fn persist(&self, entry: &TranscriptEntry) {
        if let Err(err) = self
            .sink
            .save(
                &self.conversation_id,
                entry.role,
                &entry.speaker_name,
                &entry.content,
            )
            .await
        {
            log::warn!(
                "FrameStream::persist(): could not save message from '{}' in conversation {}: {}",
                entry.speaker_name,
                self.conversation_id,
                err
            );
        }
    }

    /// Emit `frame`, queue the done marker and stop pulling.
    fn terminate(&mut self, frame: StreamFrame) -> StreamFrame {
        self.close();
        self.pending.push_back(StreamFrame::Done);
        frame
    }

    fn close(&mut self) {
        if let Some(mut rx) = self.rx.take() {
            rx.close();
        }
    }
}
