//! The unit of work flowing through a pipeline.
//!
//! An [`Event`] is built once by a source adapter. Its addressing (id,
//! primary keys, operation) and the raw bytes it was built from never
//! change afterwards; processors only replace the current payload.
//!
//! Cloning an event is a deep copy of the payload, so every fan-out branch
//! can mutate its own copy freely.

use super::operation::Operation;
use super::primary_keys::PrimaryKeys;
use bytes::Bytes;
use serde_json::Value;
use std::borrow::Cow;

/// Errors produced when reading an event payload.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// A change event addressed to a record.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    id: Option<String>,
    primary_keys: PrimaryKeys,
    original_raw: Bytes,
    data: Option<Value>,
    operation: Operation,
    event_type: Option<String>,
}

impl Event {
    /// Create an event with no identity and no event type.
    pub fn new(operation: Operation, original_raw: impl Into<Bytes>) -> Self {
        Self::builder(original_raw).operation(operation).build()
    }

    pub fn builder(original_raw: impl Into<Bytes>) -> EventBuilder {
        EventBuilder {
            event: Event {
                id: None,
                primary_keys: PrimaryKeys::new(),
                original_raw: original_raw.into(),
                data: None,
                operation: Operation::Write,
                event_type: None,
            },
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn primary_keys(&self) -> &PrimaryKeys {
        &self.primary_keys
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn event_type(&self) -> Option<&str> {
        self.event_type.as_deref()
    }

    /// The bytes exactly as received at the boundary.
    pub fn original_raw(&self) -> &Bytes {
        &self.original_raw
    }

    /// Whether a payload has been set explicitly (by the adapter or a processor).
    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }

    /// Current payload.
    ///
    /// Falls back to parsing [`original_raw`](Self::original_raw) when no
    /// payload has been set yet.
    pub fn data(&self) -> Result<Cow<'_, Value>, EventError> {
        match &self.data {
            Some(data) => Ok(Cow::Borrowed(data)),
            None => Ok(Cow::Owned(serde_json::from_slice(&self.original_raw)?)),
        }
    }

    /// Replace the current payload.
    pub fn set_data(&mut self, data: Value) {
        self.data = Some(data);
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.set_data(data);
        self
    }

    /// Snapshot of the fields that decide where a sink writes this event.
    pub fn addressing(&self) -> Addressing {
        Addressing {
            id: self.id.clone(),
            primary_keys: self.primary_keys.clone(),
            operation: self.operation,
        }
    }
}

/// Owned copy of an event's id, primary keys and operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Addressing {
    pub id: Option<String>,
    pub primary_keys: PrimaryKeys,
    pub operation: Operation,
}

impl Addressing {
    /// True when `event` still addresses the same record with the same operation.
    pub fn matches(&self, event: &Event) -> bool {
        self.operation == event.operation
            && self.id == event.id
            && self.primary_keys == event.primary_keys
    }
}

/// Builder for [`Event`]; the only place addressing can be set.
#[derive(Debug)]
pub struct EventBuilder {
    event: Event,
}

impl EventBuilder {
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.event.id = Some(id.into());
        self
    }

    pub fn primary_key(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.event.primary_keys.push(key, value);
        self
    }

    pub fn primary_keys(mut self, keys: PrimaryKeys) -> Self {
        self.event.primary_keys = keys;
        self
    }

    pub fn operation(mut self, operation: Operation) -> Self {
        self.event.operation = operation;
        self
    }

    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event.event_type = Some(event_type.into());
        self
    }

    /// Initial payload, for adapters that already parsed the raw bytes.
    pub fn data(mut self, data: Value) -> Self {
        self.event.data = Some(data);
        self
    }

    pub fn build(self) -> Event {
        self.event
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_data_falls_back_to_raw() {
        let event = Event::new(Operation::Write, "{}");
        assert!(!event.has_data());
        assert_eq!(event.data().unwrap().into_owned(), json!({}));
    }

    #[test]
    fn test_invalid_raw_is_reported() {
        let event = Event::new(Operation::Write, "not json");
        assert!(matches!(event.data(), Err(EventError::InvalidJson(_))));
    }

    #[test]
    fn test_clone_then_with_data_leaves_original_untouched() {
        let original = Event::builder(r#"{"id":"123"}"#)
            .id("123")
            .data(json!({"id": "123"}))
            .build();

        let clone = original.clone().with_data(json!({"field": "some"}));

        assert_eq!(original.data().unwrap().into_owned(), json!({"id": "123"}));
        assert_eq!(clone.data().unwrap().into_owned(), json!({"field": "some"}));
        assert_eq!(original.original_raw(), clone.original_raw());
    }

    #[test]
    fn test_nested_mutation_does_not_leak_between_clones() {
        let original = Event::builder("{}")
            .data(json!({"nested": {"list": [1, 2]}}))
            .build();
        let mut a = original.clone();
        let mut payload = a.data().unwrap().into_owned();
        payload["nested"]["list"][0] = json!(99);
        a.set_data(payload);

        assert_eq!(
            original.data().unwrap().into_owned(),
            json!({"nested": {"list": [1, 2]}})
        );
    }

    #[test]
    fn test_builder_sets_addressing() {
        let event = Event::builder("{}")
            .id("fake event")
            .primary_key("project", "OPS")
            .primary_key("issue", "7")
            .operation(Operation::Delete)
            .event_type("jira:issue_deleted")
            .build();

        assert_eq!(event.id(), Some("fake event"));
        assert_eq!(event.operation(), Operation::Delete);
        assert_eq!(event.event_type(), Some("jira:issue_deleted"));
        assert_eq!(event.primary_keys().to_string(), "project=OPS,issue=7");
    }

    #[test]
    fn test_addressing_ignores_payload() {
        let a = Event::builder("{}").id("1").build();
        let addressing = a.addressing();
        let b = a.clone().with_data(json!({"x": 1}));
        let c = Event::builder("{}").id("2").build();
        let d = Event::builder("{}").id("1").operation(Operation::Delete).build();
        assert!(addressing.matches(&b));
        assert!(!addressing.matches(&c));
        assert!(!addressing.matches(&d));
    }
}
