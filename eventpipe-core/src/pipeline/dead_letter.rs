//! Dead letters: events that failed processing or delivery.
//!
//! A pipeline hands failed events to an optional [`DeadLetterSink`].
//! Discarded events are never dead-lettered. Without a dead-letter sink a
//! failed event is logged and dropped.

use crate::sinks::{Sink, SinkError};
use async_trait::async_trait;
use eventpipe_sdk::{Event, Operation};
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use tokio::sync::Mutex;
use tracing::warn;

/// Default number of entries kept by [`MemoryDeadLetter`].
pub const DEFAULT_MEMORY_CAPACITY: usize = 10_000;

/// Where in the pipeline the event failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    Processing,
    Delivery,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureStage::Processing => f.write_str("processing"),
            FailureStage::Delivery => f.write_str("delivery"),
        }
    }
}

/// A failed event together with why and where it failed.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    /// Name of the pipeline branch the event failed in
    pub pipeline: String,
    /// The event as it entered the failing stage
    pub event: Event,
    pub stage: FailureStage,
    /// Error message from the last failed attempt
    pub error: String,
    /// Number of attempts made at the failing stage
    pub attempts: u32,
    pub failed_at: time::OffsetDateTime,
}

impl DeadLetter {
    /// JSON description of the failure, including the original payload.
    pub fn to_record(&self) -> Value {
        let event = &self.event;
        let data = if event.has_data() {
            event.data().ok().map(|data| data.into_owned())
        } else {
            None
        };
        json!({
            "pipeline": self.pipeline,
            "stage": self.stage.to_string(),
            "error": self.error,
            "attempts": self.attempts,
            "failedAt": self.failed_at.format(&Rfc3339).ok(),
            "event": {
                "id": event.id(),
                "eventType": event.event_type(),
                "operation": event.operation().to_string(),
                "primaryKeys": event.primary_keys().to_object(),
                "payload": String::from_utf8_lossy(event.original_raw()),
                "data": data,
            },
        })
    }

    /// A write event carrying [`to_record`](Self::to_record).
    ///
    /// The failed event keeps its id and primary keys, but is always
    /// forwarded as a write, so a failed delete is recorded rather than
    /// replayed against the dead-letter destination.
    pub fn to_event(&self) -> Event {
        let record = self.to_record();
        let mut builder = Event::builder(record.to_string())
            .primary_keys(self.event.primary_keys().clone())
            .operation(Operation::Write)
            .data(record);
        if let Some(id) = self.event.id() {
            builder = builder.id(id);
        }
        if let Some(event_type) = self.event.event_type() {
            builder = builder.event_type(event_type);
        }
        builder.build()
    }
}

#[derive(Debug, Error)]
pub enum DeadLetterError {
    #[error("dead letter sink error: {0}")]
    Sink(#[from] SinkError),
}

/// Destination for dead letters.
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn store(&self, letter: DeadLetter) -> Result<(), DeadLetterError>;
}

/// Logs dead letters at warn level.
#[derive(Debug, Default)]
pub struct LogDeadLetter;

#[async_trait]
impl DeadLetterSink for LogDeadLetter {
    async fn store(&self, letter: DeadLetter) -> Result<(), DeadLetterError> {
        warn!(
            pipeline = %letter.pipeline,
            stage = %letter.stage,
            event_id = ?letter.event.id(),
            event_type = ?letter.event.event_type(),
            primary_keys = %letter.event.primary_keys(),
            attempts = letter.attempts,
            error = %letter.error,
            payload = %String::from_utf8_lossy(letter.event.original_raw()),
            "Event moved to dead letter log"
        );
        Ok(())
    }
}

/// Keeps the most recent dead letters in memory; the oldest are evicted.
#[derive(Debug)]
pub struct MemoryDeadLetter {
    capacity: usize,
    entries: Mutex<VecDeque<DeadLetter>>,
}

impl MemoryDeadLetter {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(VecDeque::new()),
        }
    }

    /// Snapshot of stored dead letters, oldest first.
    pub async fn entries(&self) -> Vec<DeadLetter> {
        self.entries.lock().await.iter().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

impl Default for MemoryDeadLetter {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_CAPACITY)
    }
}

#[async_trait]
impl DeadLetterSink for MemoryDeadLetter {
    async fn store(&self, letter: DeadLetter) -> Result<(), DeadLetterError> {
        let mut entries = self.entries.lock().await;
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(letter);
        Ok(())
    }
}

/// Writes each dead letter to another sink as a [`DeadLetter::to_event`] record.
pub struct SinkDeadLetter {
    sink: Arc<dyn Sink>,
}

impl SinkDeadLetter {
    pub fn new(sink: Arc<dyn Sink>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl DeadLetterSink for SinkDeadLetter {
    async fn store(&self, letter: DeadLetter) -> Result<(), DeadLetterError> {
        self.sink.write_data(&letter.to_event()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RecordingSink;

    fn letter(id: &str) -> DeadLetter {
        DeadLetter {
            pipeline: "catalog".into(),
            event: Event::builder("{}").id(id).build(),
            stage: FailureStage::Delivery,
            error: "boom".into(),
            attempts: 1,
            failed_at: time::OffsetDateTime::now_utc(),
        }
    }

    #[tokio::test]
    async fn test_memory_dead_letter_evicts_oldest() {
        let dlq = MemoryDeadLetter::new(2);
        for id in ["1", "2", "3"] {
            dlq.store(letter(id)).await.unwrap();
        }
        let ids: Vec<_> = dlq
            .entries()
            .await
            .iter()
            .map(|l| l.event.id().map(str::to_owned))
            .collect();
        assert_eq!(ids, vec![Some("2".to_owned()), Some("3".to_owned())]);
    }

    #[tokio::test]
    async fn test_sink_dead_letter_forwards_event() {
        let sink = RecordingSink::new();
        let dlq = SinkDeadLetter::new(sink.clone());
        dlq.store(letter("7")).await.unwrap();
        let written = sink.events().await;
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].id(), Some("7"));
        assert_eq!(written[0].operation(), Operation::Write);
    }

    #[tokio::test]
    async fn test_sink_dead_letter_records_failed_delete_as_write() {
        let sink = RecordingSink::new();
        let dlq = SinkDeadLetter::new(sink.clone());
        let failed = DeadLetter {
            pipeline: "search".into(),
            event: Event::builder(r#"{"sku":"a-1"}"#)
                .id("a-1")
                .primary_key("sku", "a-1")
                .operation(Operation::Delete)
                .event_type("product.deleted")
                .build(),
            stage: FailureStage::Delivery,
            error: "upstream returned 500".into(),
            attempts: 3,
            failed_at: time::OffsetDateTime::UNIX_EPOCH,
        };
        dlq.store(failed).await.unwrap();

        let written = sink.events().await;
        assert_eq!(written.len(), 1);
        let record = &written[0];
        assert_eq!(record.operation(), Operation::Write);
        assert_eq!(record.id(), Some("a-1"));
        assert_eq!(record.primary_keys().get("sku"), Some("a-1"));

        let data = record.data().unwrap().into_owned();
        assert_eq!(data["pipeline"], "search");
        assert_eq!(data["stage"], "delivery");
        assert_eq!(data["error"], "upstream returned 500");
        assert_eq!(data["attempts"], 3);
        assert_eq!(data["failedAt"], "1970-01-01T00:00:00Z");
        assert_eq!(data["event"]["operation"], "delete");
        assert_eq!(data["event"]["eventType"], "product.deleted");
        assert_eq!(data["event"]["primaryKeys"], serde_json::json!({"sku": "a-1"}));
        assert_eq!(data["event"]["payload"], r#"{"sku":"a-1"}"#);
    }

    #[tokio::test]
    async fn test_sink_dead_letter_surfaces_sink_errors() {
        let sink = RecordingSink::new();
        sink.fail_next(1);
        let dlq = SinkDeadLetter::new(sink);
        assert!(matches!(
            dlq.store(letter("7")).await,
            Err(DeadLetterError::Sink(_))
        ));
    }

    #[tokio::test]
    async fn test_log_dead_letter_never_fails() {
        assert!(LogDeadLetter.store(letter("1")).await.is_ok());
    }
}
