//! eventpipe server
//!
//! Accepts webhook events over HTTP and fans them out to the configured
//! pipelines of each integration.

mod api;
mod config;
mod integration;
mod server;
mod shutdown;
mod state;

use clap::Parser;
use config::ConfigLoader;
use integration::build_integrations;
use server::{build_router, run_server};
use shutdown::stop_integrations;
use state::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// eventpipe - webhook event ingestion and fan-out
#[derive(Parser, Debug)]
#[command(name = "eventpipe-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, env = "EVENTPIPE_CONFIG", default_value = "./eventpipe.toml")]
    config: PathBuf,

    /// Override the listen address (e.g., 0.0.0.0:3000)
    #[arg(short, long, env = "EVENTPIPE_LISTEN")]
    listen: Option<SocketAddr>,

    /// Emit logs as JSON lines
    #[arg(long, default_value = "false")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize tracing
    init_tracing(args.log_json);

    tracing::info!("Starting eventpipe-server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config_loader = ConfigLoader::new(&args.config, args.listen);
    let loaded_config = config_loader.load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;
    tracing::info!("Configuration loaded from {:?}", args.config);

    let server_config = loaded_config.server;
    let integrations = build_integrations(loaded_config.integrations).map_err(|e| {
        tracing::error!("Failed to build pipelines: {}", e);
        e
    })?;

    // Start every pipeline before accepting traffic
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    for integration in integrations.values() {
        integration.group().start(shutdown_rx.clone()).await;
        tracing::info!(
            integration = %integration.name(),
            pipelines = ?integration.group().branch_names(),
            "Integration ready"
        );
    }

    let state = AppState::new(integrations);
    let router = build_router(state.clone());

    // Run the server
    tracing::info!("Starting HTTP server on {}", server_config.listen);
    let result = run_server(router, server_config.listen).await;

    // No more requests: let the pipelines finish their queues
    stop_integrations(&state.integrations, server_config.shutdown_timeout, &shutdown_tx).await;
    tracing::info!("Server shutdown complete");

    result.map_err(Into::into)
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,eventpipe_core=info,tower_http=debug"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
