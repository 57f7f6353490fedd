//! Runtime configuration derived from the file configuration.

use std::net::SocketAddr;
use std::time::Duration;

/// Server settings used at runtime.
#[derive(Debug, Clone, Copy)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    /// Grace period for pipelines to drain before they are cancelled.
    pub shutdown_timeout: Duration,
}
