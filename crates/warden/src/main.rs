//! # Warden - Proof-of-Work Gate
//!
//! Issues proof-of-work challenges, verifies solutions, and grants short-lived
//! session cookies. State lives in a replicated key-value cluster, with an
//! in-process fallback tier whenever no primary can be reached.
//!
//! ## Architecture
//! ```text
//! Client → Front door (auth_request) → Warden
//!                                        ↓
//!                        Redis primary/replicas ⇄ Local tier
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod challenge;
mod clock;
mod config;
mod routes;
mod sessions;
mod state;
mod store;

use clock::SystemClock;
use config::AppConfig;
use state::AppState;
use store::{local::sweep_worker, topology::discovery_worker};

/// Warden - Proof-of-Work Gate
#[derive(Parser, Debug)]
#[command(name = "warden")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config/warden.toml")]
    config: String,

    /// Listen address (overrides config)
    #[arg(short, long, env = "LISTEN_ADDR")]
    listen: Option<String>,

    /// Comma-separated store nodes (overrides config)
    #[arg(long, env = "REDIS_NODES", value_delimiter = ',')]
    redis_nodes: Vec<String>,

    /// Use the remote store at all (overrides config)
    #[arg(long, env = "REDIS_ENABLED")]
    redis_enabled: Option<bool>,

    /// Challenge difficulty, clamped to 1..=10 (overrides config)
    #[arg(long, env = "POW_DIFFICULTY")]
    difficulty: Option<u8>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "LOG_LEVEL")]
    log_level: String,

    /// Enable JSON logging output
    #[arg(long, default_value = "false")]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Pick up a local .env before clap reads the environment
    dotenvy::dotenv().ok();

    // Parse CLI arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(&args.log_level, args.json_logs)?;

    info!("Starting Warden v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::load(&args.config, &args)?;
    info!(
        listen = %config.listen_addr,
        redis_enabled = config.storage.enabled,
        difficulty = config.challenge.difficulty,
        "Configuration loaded from {}",
        args.config
    );

    // Initialize application state (runs the first discovery cycle)
    let state = AppState::new(config.clone(), Arc::new(SystemClock)).await;

    // Create shutdown broadcast channel
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    // Keep the topology warm in the background
    if let Some(tracker) = state.store.tracker() {
        let tracker = tracker.clone();
        let discovery_shutdown = shutdown_tx.subscribe();
        tokio::spawn(async move {
            discovery_worker(tracker, discovery_shutdown).await;
        });
    }

    // Sweep expired entries out of the local tier
    let local = state.store.local().clone();
    let sweep_interval = config.storage.sweep_interval();
    let sweep_shutdown = shutdown_tx.subscribe();
    tokio::spawn(async move {
        sweep_worker(local, sweep_interval, sweep_shutdown).await;
    });

    // Build router
    let app = routes::create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    info!("Warden listening on {}", config.listen_addr);

    // Handle graceful shutdown
    let shutdown_signal = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        }
        info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("Server error")?;

    info!("Warden shutdown complete");
    Ok(())
}

/// Initialize structured logging with tracing
fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .init();
    }

    Ok(())
}
