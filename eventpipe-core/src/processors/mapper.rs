//! Template-based field mapping.
//!
//! A [`FieldMapper`] holds a JSON template. Rendering walks the template and
//! replaces every string of the exact form `{{ path }}` with the value found
//! at `path` in the current payload. Anything else is copied as is.
//!
//! ```text
//! template: {"key": "{{ issue.key }}", "source": "jira", "raw": "{{ . }}"}
//! payload:  {"issue": {"key": "OPS-1"}}
//! output:   {"key": "OPS-1", "source": "jira", "raw": {"issue": {"key": "OPS-1"}}}
//! ```

use super::{ProcessError, Processor, lookup_path};
use async_trait::async_trait;
use eventpipe_sdk::Event;
use serde_json::{Map, Value};

pub struct FieldMapper {
    name: String,
    template: Value,
}

impl FieldMapper {
    pub fn new(template: Value) -> Self {
        Self::named("mapper", template)
    }

    pub fn named(name: impl Into<String>, template: Value) -> Self {
        Self {
            name: name.into(),
            template,
        }
    }

    /// Render the template against `data`. Missing paths render as `null`.
    pub fn render(&self, data: &Value) -> Value {
        render_value(&self.template, data)
    }
}

fn render_value(template: &Value, data: &Value) -> Value {
    match template {
        Value::String(s) => match placeholder(s) {
            Some(path) => lookup_path(data, path).cloned().unwrap_or(Value::Null),
            None => template.clone(),
        },
        Value::Array(items) => Value::Array(items.iter().map(|v| render_value(v, data)).collect()),
        Value::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), render_value(v, data)))
                .collect::<Map<String, Value>>(),
        ),
        other => other.clone(),
    }
}

fn placeholder(s: &str) -> Option<&str> {
    let inner = s.trim().strip_prefix("{{")?.strip_suffix("}}")?;
    let inner = inner.trim();
    if inner.is_empty() || inner.contains("{{") || inner.contains("}}") {
        return None;
    }
    Some(inner)
}

#[async_trait]
impl Processor for FieldMapper {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, event: Event) -> Result<Event, ProcessError> {
        let data = event.data()?;
        let rendered = self.render(data.as_ref());
        drop(data);
        Ok(event.with_data(rendered))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eventpipe_sdk::Operation;
    use serde_json::json;

    #[test]
    fn test_render_placeholders_and_literals() {
        let mapper = FieldMapper::new(json!({
            "key": "{{ issue.key }}",
            "source": "jira",
            "labels": ["{{issue.labels.0}}", 7],
            "missing": "{{ issue.nope }}",
            "whole": "{{ . }}"
        }));
        let data = json!({"issue": {"key": "OPS-1", "labels": ["infra"]}});

        assert_eq!(
            mapper.render(&data),
            json!({
                "key": "OPS-1",
                "source": "jira",
                "labels": ["infra", 7],
                "missing": null,
                "whole": {"issue": {"key": "OPS-1", "labels": ["infra"]}}
            })
        );
    }

    #[test]
    fn test_partial_braces_are_literal() {
        let mapper = FieldMapper::new(json!({"a": "prefix {{ x }}", "b": "{{}}"}));
        assert_eq!(
            mapper.render(&json!({"x": 1})),
            json!({"a": "prefix {{ x }}", "b": "{{}}"})
        );
    }

    #[tokio::test]
    async fn test_process_reads_raw_when_no_data_set() {
        let mapper = FieldMapper::new(json!({"id": "{{ id }}"}));
        let event = Event::new(Operation::Write, r#"{"id":"123"}"#);
        let out = mapper.process(event).await.unwrap();
        assert_eq!(out.data().unwrap().into_owned(), json!({"id": "123"}));
    }

    #[tokio::test]
    async fn test_invalid_payload_fails() {
        let mapper = FieldMapper::new(json!({}));
        let event = Event::new(Operation::Write, "nope");
        assert!(matches!(
            mapper.process(event).await,
            Err(ProcessError::Payload(_))
        ));
    }
}
