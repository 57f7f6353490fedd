use super::{Sink, SinkError};
use async_trait::async_trait;
use eventpipe_sdk::{Event, Operation};
use tracing::info;

/// Logs every event it receives. Never fails on a readable payload.
pub struct LogSink {
    name: String,
}

impl LogSink {
    pub fn new() -> Self {
        Self::named("log")
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Sink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write_data(&self, event: &Event) -> Result<(), SinkError> {
        let data = event.data()?;
        match event.operation() {
            Operation::Write => info!(
                sink = %self.name,
                event_id = ?event.id(),
                event_type = ?event.event_type(),
                primary_keys = %event.primary_keys(),
                data = %data,
                "Upserting record"
            ),
            Operation::Delete => info!(
                sink = %self.name,
                event_id = ?event.id(),
                event_type = ?event.event_type(),
                primary_keys = %event.primary_keys(),
                "Removing record"
            ),
        }
        Ok(())
    }
}
