//! Integrations: a webhook source bound to a group of pipelines.
//!
//! An [`Integration`] turns a raw request body into an [`Event`] (event
//! type, operation, primary keys, id) and hands it to its
//! [`PipelineGroup`].

use crate::config::file::{
    DeadLetterConfig, IntegrationConfig, PipelineConfig, PrimaryKeyConfig, ProcessorConfig,
    SinkConfig,
};
use bytes::Bytes;
use eventpipe_core::events::QueueConfig;
use eventpipe_core::pipeline::{
    LogDeadLetter, Pipeline, PipelineError, PipelineGroup, RetryPolicy, SinkDeadLetter,
};
use eventpipe_core::processors::{FieldMapper, Filter, Processor, lookup_path};
use eventpipe_core::sinks::{HttpSink, HttpSinkConfig, LogSink, Sink};
use eventpipe_sdk::{Event, Operation, PrimaryKeys};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors building pipelines from configuration.
#[derive(Debug, Error)]
#[error("integration {integration}, pipeline {pipeline}: {source}")]
pub struct BuildError {
    pub integration: String,
    pub pipeline: String,
    #[source]
    pub source: PipelineError,
}

/// Errors turning a request body into an event.
#[derive(Debug, Error)]
pub enum MappingError {
    #[error("invalid JSON body: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("primary key {key} not found at {path}")]
    MissingPrimaryKey { key: String, path: String },
}

pub struct Integration {
    name: String,
    secret: Option<Box<[u8]>>,
    event_type_path: Option<String>,
    delete_event_types: HashSet<String>,
    primary_keys: Vec<PrimaryKeyConfig>,
    group: PipelineGroup,
}

impl Integration {
    pub fn new(config: IntegrationConfig) -> Result<Self, BuildError> {
        let pipelines = config
            .pipelines
            .into_iter()
            .map(|pipeline| {
                let pipeline_name = pipeline.name.clone();
                build_pipeline(&config.name, pipeline).map_err(|source| BuildError {
                    integration: config.name.clone(),
                    pipeline: pipeline_name,
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            secret: config.secret.map(|s| s.into_bytes().into_boxed_slice()),
            event_type_path: config.event_type_path,
            delete_event_types: config.delete_event_types.into_iter().collect(),
            primary_keys: config.primary_keys,
            group: PipelineGroup::new(pipelines),
            name: config.name,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Webhook secret, when requests must be signed.
    pub fn secret(&self) -> Option<&[u8]> {
        self.secret.as_deref()
    }

    pub fn group(&self) -> &PipelineGroup {
        &self.group
    }

    /// Build an event from a request body.
    ///
    /// `event_type` comes from the `X-Event-Type` header and takes precedence
    /// over `event_type_path`.
    pub fn to_event(&self, body: Bytes, event_type: Option<&str>) -> Result<Event, MappingError> {
        let data: Value = serde_json::from_slice(&body)?;

        let event_type = event_type.map(str::to_owned).or_else(|| {
            self.event_type_path
                .as_deref()
                .and_then(|path| lookup_path(&data, path))
                .and_then(scalar_to_string)
        });

        let operation = match &event_type {
            Some(t) if self.delete_event_types.contains(t) => Operation::Delete,
            _ => Operation::Write,
        };

        let mut primary_keys = PrimaryKeys::new();
        for field in &self.primary_keys {
            let value = lookup_path(&data, &field.path)
                .and_then(scalar_to_string)
                .ok_or_else(|| MappingError::MissingPrimaryKey {
                    key: field.key.clone(),
                    path: field.path.clone(),
                })?;
            primary_keys.push(field.key.clone(), value);
        }

        let id = primary_keys
            .first()
            .map(|pk| pk.value.clone())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let mut builder = Event::builder(body)
            .id(id)
            .primary_keys(primary_keys)
            .operation(operation)
            .data(data);
        if let Some(event_type) = event_type {
            builder = builder.event_type(event_type);
        }
        Ok(builder.build())
    }
}

/// Build every configured integration, keyed by name.
pub fn build_integrations(
    configs: Vec<IntegrationConfig>,
) -> Result<HashMap<String, Arc<Integration>>, BuildError> {
    configs
        .into_iter()
        .map(|config| {
            let integration = Integration::new(config)?;
            Ok((integration.name.clone(), Arc::new(integration)))
        })
        .collect()
}

fn build_pipeline(integration: &str, config: PipelineConfig) -> Result<Pipeline, PipelineError> {
    let mut builder = Pipeline::builder(config.name.clone())
        .queue(QueueConfig::new(config.queue.capacity).with_policy(config.queue.full_policy))
        .sink(build_sink(integration, &config.name, config.sink));

    for processor in config.processors {
        builder = builder.processor(build_processor(processor));
    }
    if let Some(retry) = config.retry {
        builder = builder.retry(RetryPolicy::exponential(
            retry.max_retries,
            Duration::from_millis(retry.base_delay_ms),
            Duration::from_millis(retry.max_delay_ms),
        ));
    }
    match config.dead_letter {
        Some(DeadLetterConfig::Log) => builder = builder.dead_letter(Arc::new(LogDeadLetter)),
        Some(DeadLetterConfig::Http { url, timeout_secs }) => {
            let mut http = HttpSinkConfig::new(url);
            http.timeout = Duration::from_secs(timeout_secs);
            let sink = HttpSink::new(format!("{integration}/{}/dead-letter", config.name), http);
            builder = builder.dead_letter(Arc::new(SinkDeadLetter::new(Arc::new(sink))))
        }
        None => {}
    }
    builder.build()
}

fn build_processor(config: ProcessorConfig) -> Box<dyn Processor> {
    match config {
        ProcessorConfig::Filter { name, condition } => match name {
            Some(name) => Box::new(Filter::named(name, condition)),
            None => Box::new(Filter::new(condition)),
        },
        ProcessorConfig::Mapper { name, template } => match name {
            Some(name) => Box::new(FieldMapper::named(name, template)),
            None => Box::new(FieldMapper::new(template)),
        },
    }
}

fn build_sink(integration: &str, pipeline: &str, config: SinkConfig) -> Arc<dyn Sink> {
    let name = format!("{integration}/{pipeline}");
    match config {
        SinkConfig::Log => Arc::new(LogSink::named(name)),
        SinkConfig::Http {
            url,
            delete_url,
            timeout_secs,
        } => {
            let mut http = HttpSinkConfig::new(url);
            http.delete_url = delete_url;
            http.timeout = Duration::from_secs(timeout_secs);
            Arc::new(HttpSink::new(name, http))
        }
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
