//! Processors transform or filter events before they reach a sink.
//!
//! - [`ProcessorChain`]: runs an ordered list of processors as one
//! - [`FieldMapper`]: renders a JSON template against the event payload
//! - [`Filter`]: discards events that do not match a [`Condition`]
//!
//! A processor signals "drop this event, nothing went wrong" by returning
//! [`ProcessError::Discard`]. Every other error is a processing failure.

pub mod chain;
pub mod filter;
pub mod mapper;

pub use chain::ProcessorChain;
pub use filter::{Condition, Filter};
pub use mapper::FieldMapper;

use async_trait::async_trait;
use eventpipe_sdk::{Event, EventError};
use serde_json::Value;
use thiserror::Error;

/// Errors a processor can return.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The event was filtered out on purpose.
    #[error("event discarded")]
    Discard,

    /// The event payload could not be read.
    #[error("invalid payload: {0}")]
    Payload(#[from] EventError),

    /// A processor changed the id, primary keys or operation of the event.
    #[error("processor changed the event addressing")]
    AddressingChanged,

    /// Generic processor failure
    #[error("{processor} failed: {reason}")]
    Failed { processor: String, reason: String },
}

impl ProcessError {
    pub fn failed(processor: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Failed {
            processor: processor.into(),
            reason: reason.to_string(),
        }
    }

    pub fn is_discard(&self) -> bool {
        matches!(self, ProcessError::Discard)
    }
}

/// A transform or filter step.
///
/// Processors must not change the addressing of an event; only its
/// payload.
#[async_trait]
pub trait Processor: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    async fn process(&self, event: Event) -> Result<Event, ProcessError>;

    /// Release resources held by the processor.
    async fn close(&self) -> Result<(), ProcessError> {
        Ok(())
    }
}

/// Result of running an event through processors, with the discard
/// decision split out from real failures.
#[derive(Debug)]
pub enum Outcome {
    Ok(Event),
    Discard,
    Failed(ProcessError),
}

impl From<Result<Event, ProcessError>> for Outcome {
    fn from(result: Result<Event, ProcessError>) -> Self {
        match result {
            Ok(event) => Outcome::Ok(event),
            Err(ProcessError::Discard) => Outcome::Discard,
            Err(e) => Outcome::Failed(e),
        }
    }
}

/// Look up a dotted path (`issue.fields.0.name`) inside a JSON value.
///
/// Numeric segments index into arrays. `.` alone returns the value itself.
pub fn lookup_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let path = path.trim();
    if path.is_empty() || path == "." {
        return Some(value);
    }
    path.trim_start_matches('.')
        .split('.')
        .try_fold(value, |current, segment| match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_outcome_from_result() {
        let event = Event::new(eventpipe_sdk::Operation::Write, "{}");
        assert!(matches!(Outcome::from(Ok(event)), Outcome::Ok(_)));
        assert!(matches!(
            Outcome::from(Err(ProcessError::Discard)),
            Outcome::Discard
        ));
        assert!(matches!(
            Outcome::from(Err(ProcessError::failed("mapper", "boom"))),
            Outcome::Failed(ProcessError::Failed { .. })
        ));
    }

    #[test]
    fn test_lookup_path() {
        let value = json!({"issue": {"labels": ["a", "b"], "key": "OPS-1"}});
        assert_eq!(lookup_path(&value, "issue.key"), Some(&json!("OPS-1")));
        assert_eq!(lookup_path(&value, "issue.labels.1"), Some(&json!("b")));
        assert_eq!(lookup_path(&value, "."), Some(&value));
        assert_eq!(lookup_path(&value, "issue.missing"), None);
        assert_eq!(lookup_path(&value, "issue.key.deeper"), None);
    }
}
