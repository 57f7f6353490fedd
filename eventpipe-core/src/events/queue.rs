//! Bounded event queue factory and handles.

use eventpipe_sdk::Event;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Default capacity of a branch queue.
///
/// Large enough to absorb webhook bursts while keeping memory bounded.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// What a producer experiences when a branch queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FullQueuePolicy {
    /// Wait until the consumer frees a slot.
    #[default]
    Block,
    /// Fail immediately with [`QueueError::Full`].
    Reject,
}

/// Capacity and full-queue policy of a branch queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueConfig {
    pub capacity: usize,
    pub full_policy: FullQueuePolicy,
}

impl QueueConfig {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            full_policy: FullQueuePolicy::Block,
        }
    }

    pub fn with_policy(mut self, full_policy: FullQueuePolicy) -> Self {
        self.full_policy = full_policy;
        self
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

/// Errors returned by queue operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("queue is full")]
    Full,
    #[error("queue is closed")]
    Closed,
    #[error("queue capacity must be greater than zero")]
    ZeroCapacity,
}

/// Receiver handle for a branch queue.
pub type EventReceiver = mpsc::Receiver<Event>;

/// Sender handle for a branch queue, applying the configured full-queue policy.
#[derive(Debug, Clone)]
pub struct EventSender {
    inner: mpsc::Sender<Event>,
    full_policy: FullQueuePolicy,
}

impl EventSender {
    /// Enqueue an event.
    pub async fn send(&self, event: Event) -> Result<(), QueueError> {
        match self.full_policy {
            FullQueuePolicy::Block => self
                .inner
                .send(event)
                .await
                .map_err(|_| QueueError::Closed),
            FullQueuePolicy::Reject => self.inner.try_send(event).map_err(|e| match e {
                TrySendError::Full(_) => QueueError::Full,
                TrySendError::Closed(_) => QueueError::Closed,
            }),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Free slots left in the queue.
    pub fn available(&self) -> usize {
        self.inner.capacity()
    }

    pub fn full_policy(&self) -> FullQueuePolicy {
        self.full_policy
    }
}

/// Create a new branch queue.
///
/// Returns a (sender, receiver) pair. The sender can be cloned freely; the
/// receiver belongs to the branch worker.
pub fn event_queue(config: QueueConfig) -> Result<(EventSender, EventReceiver), QueueError> {
    if config.capacity == 0 {
        return Err(QueueError::ZeroCapacity);
    }
    let (tx, rx) = mpsc::channel(config.capacity);
    Ok((
        EventSender {
            inner: tx,
            full_policy: config.full_policy,
        },
        rx,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use eventpipe_sdk::Operation;
    use std::time::Duration;

    fn event(id: &str) -> Event {
        Event::builder("{}").id(id).operation(Operation::Write).build()
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        assert_eq!(
            event_queue(QueueConfig::new(0)).unwrap_err(),
            QueueError::ZeroCapacity
        );
    }

    #[tokio::test]
    async fn test_reject_policy_fails_when_full() {
        let (tx, _rx) =
            event_queue(QueueConfig::new(1).with_policy(FullQueuePolicy::Reject)).unwrap();
        tx.send(event("1")).await.unwrap();
        assert_eq!(tx.send(event("2")).await, Err(QueueError::Full));
    }

    #[tokio::test]
    async fn test_block_policy_waits_for_room() {
        let (tx, mut rx) = event_queue(QueueConfig::new(1)).unwrap();
        tx.send(event("1")).await.unwrap();

        let blocked = tokio::time::timeout(Duration::from_millis(20), tx.send(event("2"))).await;
        assert!(blocked.is_err(), "send should wait while the queue is full");

        let producer = {
            let tx = tx.clone();
            tokio::spawn(async move { tx.send(event("3")).await })
        };
        assert_eq!(rx.recv().await.unwrap().id(), Some("1"));
        producer.await.unwrap().unwrap();
        assert_eq!(rx.recv().await.unwrap().id(), Some("3"));
    }

    #[tokio::test]
    async fn test_send_after_receiver_closed() {
        let (tx, mut rx) = event_queue(QueueConfig::default()).unwrap();
        rx.close();
        assert!(tx.is_closed());
        assert_eq!(tx.send(event("1")).await, Err(QueueError::Closed));
    }
}
