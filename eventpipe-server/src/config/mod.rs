//! Configuration module for eventpipe-server.
//!
//! Handles loading configuration from TOML files and CLI arguments
//! (which also fall back to environment variables).

pub mod file;
pub mod runtime;

use crate::config::file::{FileConfig, IntegrationConfig};
use crate::config::runtime::ServerConfig;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    ValidationError(String),
}

/// Loaded configuration result containing all parts.
#[derive(Debug)]
pub struct LoadedConfig {
    pub server: ServerConfig,
    pub integrations: Vec<IntegrationConfig>,
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: PathBuf,
    listen_override: Option<SocketAddr>,
}

impl ConfigLoader {
    /// Create a new config loader.
    pub fn new(config_path: impl AsRef<Path>, listen_override: Option<SocketAddr>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            listen_override,
        }
    }

    /// Load and process the configuration.
    ///
    /// This will:
    /// 1. Read the TOML file
    /// 2. Apply CLI overrides
    /// 3. Validate the configuration
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let config_content = std::fs::read_to_string(&self.config_path)?;
        self.load_str(&config_content)
    }

    fn load_str(&self, config_content: &str) -> Result<LoadedConfig, ConfigError> {
        let mut file_config: FileConfig = toml::from_str(config_content)?;

        if let Some(listen) = self.listen_override {
            file_config.server.listen = listen;
        }

        validate(&file_config)?;

        Ok(LoadedConfig {
            server: ServerConfig {
                listen: file_config.server.listen,
                shutdown_timeout: Duration::from_secs(file_config.server.shutdown_timeout_secs),
            },
            integrations: file_config.integrations,
        })
    }
}

fn validate(config: &FileConfig) -> Result<(), ConfigError> {
    if config.integrations.is_empty() {
        return Err(invalid("at least one integration must be configured"));
    }

    let mut integration_names = HashSet::new();
    for integration in &config.integrations {
        if !integration_names.insert(integration.name.as_str()) {
            return Err(invalid(format!(
                "duplicate integration name {}",
                integration.name
            )));
        }
        if integration.pipelines.is_empty() {
            return Err(invalid(format!(
                "integration {} has no pipelines",
                integration.name
            )));
        }

        for primary_key in &integration.primary_keys {
            if primary_key.key.trim().is_empty() || primary_key.path.trim().is_empty() {
                return Err(invalid(format!(
                    "integration {} has a primary key with an empty key or path",
                    integration.name
                )));
            }
        }

        let mut pipeline_names = HashSet::new();
        for pipeline in &integration.pipelines {
            if !pipeline_names.insert(pipeline.name.as_str()) {
                return Err(invalid(format!(
                    "integration {} has duplicate pipeline name {}",
                    integration.name, pipeline.name
                )));
            }
            if pipeline.queue.capacity == 0 {
                return Err(invalid(format!(
                    "pipeline {}/{} has a zero queue capacity",
                    integration.name, pipeline.name
                )));
            }
        }
    }
    Ok(())
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError(message.into())
}
