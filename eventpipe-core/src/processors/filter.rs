//! Condition-based event filtering.

use super::{ProcessError, Processor, lookup_path};
use async_trait::async_trait;
use eventpipe_sdk::{Event, Operation};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A predicate over an event and its current payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Condition {
    /// Value at `path` equals `value`.
    Equals { path: String, value: Value },
    /// `path` is present and not `null`.
    Exists { path: String },
    /// Event type is one of `types`.
    EventType { types: Vec<String> },
    Operation { operation: Operation },
    Not { condition: Box<Condition> },
    /// Every condition holds. An empty list holds.
    All { conditions: Vec<Condition> },
    /// At least one condition holds. An empty list does not hold.
    Any { conditions: Vec<Condition> },
}

impl Condition {
    pub fn matches(&self, event: &Event, data: &Value) -> bool {
        match self {
            Condition::Equals { path, value } => lookup_path(data, path) == Some(value),
            Condition::Exists { path } => {
                lookup_path(data, path).is_some_and(|v| !v.is_null())
            }
            Condition::EventType { types } => event
                .event_type()
                .is_some_and(|t| types.iter().any(|candidate| candidate == t)),
            Condition::Operation { operation } => event.operation() == *operation,
            Condition::Not { condition } => !condition.matches(event, data),
            Condition::All { conditions } => conditions.iter().all(|c| c.matches(event, data)),
            Condition::Any { conditions } => conditions.iter().any(|c| c.matches(event, data)),
        }
    }
}

/// Keeps events matching its condition and discards the rest.
pub struct Filter {
    name: String,
    condition: Condition,
}

impl Filter {
    pub fn new(condition: Condition) -> Self {
        Self::named("filter", condition)
    }

    pub fn named(name: impl Into<String>, condition: Condition) -> Self {
        Self {
            name: name.into(),
            condition,
        }
    }
}

#[async_trait]
impl Processor for Filter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, event: Event) -> Result<Event, ProcessError> {
        let data = event.data()?;
        let keep = self.condition.matches(&event, data.as_ref());
        drop(data);
        if keep {
            Ok(event)
        } else {
            Err(ProcessError::Discard)
        }
    }
}
