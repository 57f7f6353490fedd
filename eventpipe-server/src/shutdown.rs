//! Signal handling and pipeline shutdown.

use crate::integration::Integration;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::watch;

/// Creates a future that completes when a shutdown signal is received.
///
/// Listens for SIGTERM and SIGINT (Ctrl+C).
pub async fn shutdown_signal() {
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
        _ = sigint.recv() => {
            tracing::info!("Received SIGINT, initiating graceful shutdown");
        }
    }
}

/// Stop every integration's pipelines.
///
/// Queues are drained first. Pipelines still busy after `timeout` are
/// cancelled through `shutdown_tx`, which makes them finish their queued
/// events and exit. Sinks and processors are closed last.
pub async fn stop_integrations(
    integrations: &HashMap<String, Arc<Integration>>,
    timeout: Duration,
    shutdown_tx: &watch::Sender<bool>,
) {
    for integration in integrations.values() {
        integration.group().drain().await;
    }

    let wait_all = async {
        for integration in integrations.values() {
            if let Err(e) = integration.group().wait().await {
                tracing::error!(integration = %integration.name(), error = %e, "Pipelines stopped with errors");
            }
        }
    };

    if tokio::time::timeout(timeout, wait_all).await.is_err() {
        tracing::warn!(
            timeout_secs = timeout.as_secs(),
            "Pipelines did not drain in time, cancelling"
        );
        let _ = shutdown_tx.send(true);
        for integration in integrations.values() {
            if let Err(e) = integration.group().wait().await {
                tracing::error!(integration = %integration.name(), error = %e, "Pipelines stopped with errors");
            }
        }
    }

    for integration in integrations.values() {
        if let Err(e) = integration.group().close().await {
            tracing::error!(integration = %integration.name(), error = %e, "Failed to close pipelines");
        }
    }
    tracing::info!("All pipelines stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::file::FileConfig;
    use crate::integration::build_integrations;

    #[tokio::test]
    async fn test_stop_integrations_drains_and_closes() {
        let config: FileConfig = toml::from_str(
            r#"
[[integrations]]
name = "github"

[[integrations.pipelines]]
name = "audit"
sink = { type = "log" }
"#,
        )
        .unwrap();
        let integrations = build_integrations(config.integrations).unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let github = &integrations["github"];
        github.group().start(shutdown_rx).await;
        github
            .group()
            .add_message(eventpipe_sdk::Event::builder("{}").id("1").build())
            .await
            .unwrap();

        stop_integrations(&integrations, Duration::from_secs(5), &shutdown_tx).await;

        assert!(github.group().add_message(eventpipe_sdk::Event::builder("{}").build()).await.is_err());
        assert!(!*shutdown_tx.borrow());
    }
}
