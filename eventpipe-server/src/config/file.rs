//! TOML file configuration structures.
//!
//! These structs directly map to the `eventpipe.toml` file format.

use eventpipe_core::events::{DEFAULT_QUEUE_CAPACITY, FullQueuePolicy};
use eventpipe_core::processors::Condition;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use url::Url;

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub integrations: Vec<IntegrationConfig>,
}

/// Server configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The address and port to listen on (e.g., "0.0.0.0:8080").
    #[serde(default = "default_listen_addr")]
    pub listen: SocketAddr,
    /// How long pipelines may take to drain on shutdown before they are cancelled.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen_addr(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_shutdown_timeout() -> u64 {
    30
}

/// One webhook source and the pipelines its events fan out to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationConfig {
    /// Route segment: events are posted to `/integrations/{name}/events`.
    pub name: String,
    /// Shared secret for `Eventpipe-Signature`. Unsigned requests are
    /// accepted when unset.
    #[serde(default)]
    pub secret: Option<String>,
    /// Dotted path of the event type in the body, used when the
    /// `X-Event-Type` header is absent.
    #[serde(default)]
    pub event_type_path: Option<String>,
    /// Event types that map to a delete operation.
    #[serde(default)]
    pub delete_event_types: Vec<String>,
    #[serde(default)]
    pub primary_keys: Vec<PrimaryKeyConfig>,
    #[serde(default)]
    pub pipelines: Vec<PipelineConfig>,
}

/// A primary key field and where to find its value in the body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryKeyConfig {
    pub key: String,
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub name: String,
    #[serde(default)]
    pub queue: QueueSection,
    #[serde(default)]
    pub retry: Option<RetrySection>,
    #[serde(default)]
    pub dead_letter: Option<DeadLetterConfig>,
    #[serde(default)]
    pub processors: Vec<ProcessorConfig>,
    pub sink: SinkConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QueueSection {
    #[serde(default = "default_queue_capacity")]
    pub capacity: usize,
    #[serde(default)]
    pub full_policy: FullQueuePolicy,
}

impl Default for QueueSection {
    fn default() -> Self {
        Self {
            capacity: default_queue_capacity(),
            full_policy: FullQueuePolicy::default(),
        }
    }
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetrySection {
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_base_delay_ms() -> u64 {
    200
}

fn default_max_delay_ms() -> u64 {
    10_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeadLetterConfig {
    /// Warn-level log line per failed event.
    Log,
    /// POST a JSON failure record per failed event.
    Http {
        url: Url,
        #[serde(default = "default_sink_timeout")]
        timeout_secs: u64,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProcessorConfig {
    Filter {
        #[serde(default)]
        name: Option<String>,
        condition: Condition,
    },
    Mapper {
        #[serde(default)]
        name: Option<String>,
        template: serde_json::Value,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SinkConfig {
    Log,
    Http {
        url: Url,
        #[serde(default)]
        delete_url: Option<Url>,
        #[serde(default = "default_sink_timeout")]
        timeout_secs: u64,
    },
}

fn default_sink_timeout() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_CONFIG: &str = r#"
[server]
listen = "127.0.0.1:3000"
shutdown_timeout_secs = 5

[[integrations]]
name = "jira"
secret = "s3cret"
event_type_path = "webhookEvent"
delete_event_types = ["jira:issue_deleted"]
primary_keys = [{ key = "issue.id", path = "issue.id" }]

[[integrations.pipelines]]
name = "catalog"
queue = { capacity = 16, full_policy = "reject" }
retry = { max_retries = 3, base_delay_ms = 100 }
dead_letter = { type = "http", url = "http://dlq.internal/failed" }

[[integrations.pipelines.processors]]
type = "filter"
condition = { op = "equals", path = "issue.fields.project.key", value = "OPS" }

[[integrations.pipelines.processors]]
type = "mapper"
template = { key = "{{ issue.key }}", source = "jira" }

[integrations.pipelines.sink]
type = "http"
url = "https://catalog.internal/items"
delete_url = "https://catalog.internal/items/delete"

[[integrations.pipelines]]
name = "audit"

[integrations.pipelines.sink]
type = "log"
"#;

    #[test]
    fn test_full_config_parsing() {
        let config: FileConfig = toml::from_str(FULL_CONFIG).unwrap();
        assert_eq!(config.server.listen.port(), 3000);
        assert_eq!(config.server.shutdown_timeout_secs, 5);
        assert_eq!(config.integrations.len(), 1);

        let jira = &config.integrations[0];
        assert_eq!(jira.secret.as_deref(), Some("s3cret"));
        assert_eq!(jira.delete_event_types, vec!["jira:issue_deleted"]);
        assert_eq!(
            jira.primary_keys,
            vec![PrimaryKeyConfig {
                key: "issue.id".into(),
                path: "issue.id".into()
            }]
        );
        assert_eq!(jira.pipelines.len(), 2);

        let catalog = &jira.pipelines[0];
        assert_eq!(catalog.queue.capacity, 16);
        assert_eq!(catalog.queue.full_policy, FullQueuePolicy::Reject);
        let retry = catalog.retry.unwrap();
        assert_eq!(retry.max_retries, 3);
        assert_eq!(retry.base_delay_ms, 100);
        assert_eq!(retry.max_delay_ms, 10_000);
        assert!(matches!(
            catalog.dead_letter,
            Some(DeadLetterConfig::Http { ref url, timeout_secs: 30 })
                if url.as_str() == "http://dlq.internal/failed"
        ));
        assert!(matches!(
            &catalog.processors[0],
            ProcessorConfig::Filter { condition: Condition::Equals { path, .. }, .. }
                if path == "issue.fields.project.key"
        ));
        match &catalog.processors[1] {
            ProcessorConfig::Mapper { template, .. } => {
                assert_eq!(
                    template,
                    &serde_json::json!({"key": "{{ issue.key }}", "source": "jira"})
                );
            }
            other => panic!("unexpected processor {other:?}"),
        }
        match &catalog.sink {
            SinkConfig::Http {
                url,
                delete_url,
                timeout_secs,
            } => {
                assert_eq!(url.as_str(), "https://catalog.internal/items");
                assert!(delete_url.is_some());
                assert_eq!(*timeout_secs, 30);
            }
            other => panic!("unexpected sink {other:?}"),
        }
    }

    #[test]
    fn test_defaults() {
        let config: FileConfig = toml::from_str(
            r#"
[[integrations]]
name = "github"

[[integrations.pipelines]]
name = "log"
sink = { type = "log" }
"#,
        )
        .unwrap();
        assert_eq!(config.server.listen, default_listen_addr());
        assert_eq!(config.server.shutdown_timeout_secs, 30);

        let github = &config.integrations[0];
        assert!(github.secret.is_none());
        assert!(github.primary_keys.is_empty());
        let pipeline = &github.pipelines[0];
        assert_eq!(pipeline.queue.capacity, DEFAULT_QUEUE_CAPACITY);
        assert_eq!(pipeline.queue.full_policy, FullQueuePolicy::Block);
        assert!(pipeline.retry.is_none());
        assert!(pipeline.processors.is_empty());
    }

    #[test]
    fn test_missing_sink_is_rejected() {
        let result: Result<FileConfig, _> = toml::from_str(
            r#"
[[integrations]]
name = "github"

[[integrations.pipelines]]
name = "nowhere"
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_dead_letter_type_is_rejected() {
        let result: Result<FileConfig, _> = toml::from_str(
            r#"
[[integrations]]
name = "github"

[[integrations.pipelines]]
name = "audit"
dead_letter = { type = "memory" }
sink = { type = "log" }
"#,
        );
        assert!(result.is_err());
    }
}
