//! Drinks gateway - guest drink allowance service for event staff
//!
//! Module structure:
//! - `domain/` - Core business types (GuestCode, GuestRecord, DrinksError)
//! - `io/` - External interfaces (HTTP API, remote client, drink log)
//! - `services/` - Business logic (GuestLedger, SessionGate)
//! - `infra/` - Infrastructure (Config, Metrics)

use clap::Parser;
use drinks_gateway::infra::{Config, Metrics};
use drinks_gateway::io::{create_drink_log, start_api_server, ApiState};
use drinks_gateway::services::{GuestLedger, SessionGate};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Drinks gateway - guest code lookup and drink counting API
#[derive(Parser, Debug)]
#[command(name = "drinks-gateway", version, about)]
struct Args {
    /// Path to TOML configuration file (falls back to CONFIG_FILE, then config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,
}

/// Drink log channel capacity
const DRINK_LOG_BUFFER: usize = 1000;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    // Default: INFO, use RUST_LOG=debug for per-request visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!(version = %env!("CARGO_PKG_VERSION"), git_hash = %env!("GIT_HASH"), "drinks_gateway_starting");

    let args = Args::parse();
    let config = Config::load_from_path(&Config::resolve_config_path(args.config.as_deref()));

    info!(
        config_file = %config.config_file(),
        site_id = %config.site_id(),
        server_addr = %config.server_addr(),
        guests = %config.guests().len(),
        commit_delay_ms = %config.commit_delay_ms(),
        drink_log = %config.drink_log_file(),
        "config_loaded"
    );

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Create shared components
    let metrics = Arc::new(Metrics::new());
    let ledger = Arc::new(GuestLedger::from_config(&config).with_metrics(metrics.clone()));
    let sessions = Arc::new(SessionGate::from_config(&config).with_metrics(metrics.clone()));

    let mut state = ApiState::new(ledger, sessions, metrics.clone(), config.site_id());

    // Start drink log writer (if enabled)
    if config.drink_log_enabled() {
        let (drink_log, writer) =
            create_drink_log(config.drink_log_file(), DRINK_LOG_BUFFER, metrics.clone());
        tokio::spawn(async move {
            writer.run().await;
        });
        state = state.with_drink_log(drink_log);
    }

    // Start metrics reporter (lock-free reads with full summary)
    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs().max(1);
    let mut reporter_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(metrics_interval));
        // First tick completes immediately
        interval.tick().await;
        loop {
            tokio::select! {
                _ = interval.tick() => metrics_clone.report().log(),
                _ = reporter_shutdown.changed() => {
                    if *reporter_shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    });

    // Handle shutdown on Ctrl+C
    let shutdown_signal = shutdown_tx;
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_signal.send(true);
    });

    // Run API server until shutdown
    if let Err(e) = start_api_server(&config.server_addr(), Arc::new(state), shutdown_rx).await {
        error!(error = %format!("{:#}", e), "api_server_error");
        return Err(e);
    }

    // Final summary for the interval cut short by shutdown
    metrics.report().log();
    info!(drinks_registered = %metrics.drinks_registered(), "drinks_gateway_shutdown_complete");
    Ok(())
}
