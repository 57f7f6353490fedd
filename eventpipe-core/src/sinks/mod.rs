//! Sinks write processed events to their destination.
//!
//! - [`LogSink`]: structured log line per event, useful for debugging
//! - [`HttpSink`]: JSON over HTTP to an external service
//!
//! A sink routes on [`Operation`]: `Write` upserts, `Delete` removes. A sink
//! that cannot remove records returns [`SinkError::UnsupportedOperation`]
//! instead of ignoring the request.

pub mod http;
pub mod log;

pub use http::{HttpSink, HttpSinkConfig};
pub use log::LogSink;

use async_trait::async_trait;
use eventpipe_sdk::{Event, EventError, Operation};
use thiserror::Error;

/// Errors that can occur while writing to a sink.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The sink does not implement this operation
    #[error("operation {0} is not supported by this sink")]
    UnsupportedOperation(Operation),

    /// The event payload could not be read
    #[error("invalid payload: {0}")]
    Payload(#[from] EventError),

    /// HTTP request error
    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),

    /// Destination answered with a non-success status
    #[error("delivery failed with status {status}: {body}")]
    Status { status: u16, body: String },

    /// The sink was closed before the write
    #[error("sink is closed")]
    Closed,

    /// Generic sink failure
    #[error("sink failed: {0}")]
    Failed(String),
}

impl SinkError {
    /// Whether repeating the same write could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SinkError::UnsupportedOperation(_) | SinkError::Payload(_) | SinkError::Closed => false,
            SinkError::Status { status, .. } => *status >= 500 || *status == 429,
            SinkError::Request(_) | SinkError::Failed(_) => true,
        }
    }
}

/// A destination for processed events.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    async fn write_data(&self, event: &Event) -> Result<(), SinkError>;

    /// Flush and release the destination.
    async fn close(&self) -> Result<(), SinkError> {
        Ok(())
    }
}
