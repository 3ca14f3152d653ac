//! The bounded FIFO hand-off between the coordinator worker and the stream consumer.
//!
//! The coordinator is the only producer; a full relay makes it wait, which is the
//! backpressure the consumer applies. The consumer pulls with a wall-clock bound and treats
//! an expired wait as a fatal timeout for the session.

use crate::error::ChatError;
use crate::transcript::TranscriptEntry;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// What travels over the relay.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayItem {
    /// A copy of an appended transcript entry.
    Entry(TranscriptEntry),
    /// The coordinator stopped on a failure.
    Error(String),
    /// Sentinel: the coordinator loop is over, nothing else follows.
    Done,
}

/// Producer half, held by the transcript and the worker.
#[derive(Debug, Clone)]
pub struct RelaySender {
    tx: mpsc::Sender<RelayItem>,
    cancel: Option<CancellationToken>,
}

/// Consumer half, held by the frame stream.
#[derive(Debug)]
pub struct RelayReceiver {
    rx: mpsc::Receiver<RelayItem>,
}

/// Create a relay holding at most `capacity` undelivered items (at least one).
pub fn relay(capacity: usize) -> (RelaySender, RelayReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (RelaySender { tx, cancel: None }, RelayReceiver { rx })
}

impl RelaySender {
    /// A send blocked on a full relay gives up with [`ChatError::Cancelled`] once `cancel`
    /// fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub async fn send_entry(&self, entry: TranscriptEntry) -> Result<(), ChatError> {
        self.send(RelayItem::Entry(entry)).await
    }

    pub async fn send_error(&self, message: impl Into<String>) -> Result<(), ChatError> {
        self.send(RelayItem::Error(message.into())).await
    }

    /// Push the end-of-loop sentinel.
    ///
    /// After cancellation the sentinel is only queued if there is room for it.
    pub async fn finish(&self) -> Result<(), ChatError> {
        match self.send(RelayItem::Done).await {
            Err(ChatError::Cancelled) => self
                .tx
                .try_send(RelayItem::Done)
                .map_err(|_| ChatError::Cancelled),
            sent => sent,
        }
    }

    /// `true` once the consumer has dropped its half.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn send(&self, item: RelayItem) -> Result<(), ChatError> {
        let Some(cancel) = &self.cancel else {
            return self.tx.send(item).await.map_err(|_| ChatError::Cancelled);
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ChatError::Cancelled),
            sent = self.tx.send(item) => sent.map_err(|_| ChatError::Cancelled),
        }
    }
}

impl RelayReceiver {
    /// Wait up to `timeout` for the next item.
    ///
    /// `Ok(None)` means every sender is gone without a [`RelayItem::Done`].
    pub async fn recv_timeout(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<RelayItem>, ChatError> {
        tokio::time::timeout(timeout, self.rx.recv())
            .await
            .map_err(|_| ChatError::Timeout(timeout))
    }

    /// Stop accepting items; pending sends fail with [`ChatError::Cancelled`].
    pub fn close(&mut self) {
        self.rx.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn items_come_out_in_push_order() {
        let (tx, mut rx) = relay(4);
        tx.send_entry(TranscriptEntry::assistant("A", "one")).await.unwrap();
        tx.send_error("boom").await.unwrap();
        tx.finish().await.unwrap();

        let wait = Duration::from_millis(100);
        assert!(matches!(rx.recv_timeout(wait).await, Ok(Some(RelayItem::Entry(_)))));
        assert_eq!(rx.recv_timeout(wait).await.unwrap(), Some(RelayItem::Error("boom".into())));
        assert_eq!(rx.recv_timeout(wait).await.unwrap(), Some(RelayItem::Done));
    }

    #[tokio::test]
    async fn empty_relay_times_out() {
        let (_tx, mut rx) = relay(1);
        let err = rx.recv_timeout(Duration::from_millis(10)).await.unwrap_err();
        assert!(matches!(err, ChatError::Timeout(_)));
    }

    #[tokio::test]
    async fn full_relay_applies_backpressure() {
        let (tx, mut rx) = relay(1);
        tx.send_error("first").await.unwrap();

        let blocked =
            tokio::time::timeout(Duration::from_millis(20), tx.send_error("second")).await;
        assert!(blocked.is_err(), "second send should wait for the consumer");

        rx.recv_timeout(Duration::from_millis(100)).await.unwrap();
        tx.send_error("second").await.unwrap();
    }

    #[tokio::test]
    async fn dropped_consumer_cancels_the_producer() {
        let (tx, rx) = relay(2);
        drop(rx);
        assert!(tx.is_closed());
        assert!(matches!(tx.finish().await, Err(ChatError::Cancelled)));
    }

    #[tokio::test]
    async fn cancellation_releases_a_blocked_send() {
        let cancel = CancellationToken::new();
        let (tx, _rx) = relay(1);
        let tx = tx.with_cancellation(cancel.clone());
        tx.send_error("fills the relay").await.unwrap();

        let blocked = tokio::spawn({
            let tx = tx.clone();
            async move { tx.send_error("never delivered").await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        let result = tokio::time::timeout(Duration::from_secs(1), blocked)
            .await
            .expect("send should give up once cancelled")
            .unwrap();
        assert!(matches!(result, Err(ChatError::Cancelled)));
        assert!(matches!(tx.finish().await, Err(ChatError::Cancelled)));
    }

    #[tokio::test]
    async fn finish_after_cancellation_still_queues_done_when_there_is_room() {
        let cancel = CancellationToken::new();
        let (tx, mut rx) = relay(2);
        let tx = tx.with_cancellation(cancel.clone());
        cancel.cancel();

        tx.finish().await.unwrap();
        assert_eq!(
            rx.recv_timeout(Duration::from_millis(100)).await.unwrap(),
            Some(RelayItem::Done)
        );
    }
}
