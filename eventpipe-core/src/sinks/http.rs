//! HTTP sink.
//!
//! - `Write`: `POST {url}` with the current payload as JSON body
//! - `Delete`: `POST {delete_url}` with `{"id": ..., "primaryKeys": {...}}`
//!
//! Without a `delete_url` the sink refuses deletes with
//! [`SinkError::UnsupportedOperation`].

use super::{Sink, SinkError};
use async_trait::async_trait;
use eventpipe_sdk::{Event, Operation};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Header carrying the event type, when known.
pub const EVENT_TYPE_HEADER: &str = "X-Event-Type";
/// Header carrying the event id, when known.
pub const EVENT_ID_HEADER: &str = "X-Event-Id";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct HttpSinkConfig {
    pub url: Url,
    pub delete_url: Option<Url>,
    pub timeout: Duration,
}

impl HttpSinkConfig {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            delete_url: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

pub struct HttpSink {
    name: String,
    config: HttpSinkConfig,
    http_client: reqwest::Client,
    closed: AtomicBool,
}

impl HttpSink {
    pub fn new(name: impl Into<String>, config: HttpSinkConfig) -> Self {
        Self {
            name: name.into(),
            http_client: reqwest::Client::builder()
                .timeout(config.timeout)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            config,
            closed: AtomicBool::new(false),
        }
    }

    async fn post(&self, url: &Url, event: &Event, body: &Value) -> Result<(), SinkError> {
        let mut request = self.http_client.post(url.clone()).json(body);
        if let Some(event_type) = event.event_type() {
            request = request.header(EVENT_TYPE_HEADER, event_type);
        }
        if let Some(id) = event.id() {
            request = request.header(EVENT_ID_HEADER, id);
        }

        let response = request.send().await?;
        let status = response.status();

        if status.is_success() {
            debug!(sink = %self.name, %url, status = status.as_u16(), "Delivered event");
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(SinkError::Status {
                status: status.as_u16(),
                body,
            })
        }
    }
}

#[async_trait]
impl Sink for HttpSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write_data(&self, event: &Event) -> Result<(), SinkError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SinkError::Closed);
        }
        match event.operation() {
            Operation::Write => {
                let data = event.data()?;
                self.post(&self.config.url, event, &data).await
            }
            Operation::Delete => {
                let Some(delete_url) = &self.config.delete_url else {
                    return Err(SinkError::UnsupportedOperation(Operation::Delete));
                };
                let body = json!({
                    "id": event.id(),
                    "primaryKeys": event.primary_keys().to_object(),
                });
                self.post(delete_url, event, &body).await
            }
        }
    }

    async fn close(&self) -> Result<(), SinkError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
