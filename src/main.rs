//! Transfer Verifier Service
//!
//! Verifies USDT transfers submitted by requesters and follows unconfirmed
//! ones until they are final.
//!
//! ## Overview
//!
//! The service:
//! 1. Checks a submitted transaction immediately (`POST /check`)
//! 2. Stores transactions that are not final yet as pending records
//! 3. Re-checks pending records on a fixed interval, resuming at the first unmet stage
//! 4. Reports confirmations, rejections and expiries to the requester
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin transfer-verifier -- --config config/verifier.toml
//! ```
//!
//! Or set the config path via environment variable:
//!
//! ```bash
//! TRANSFER_VERIFIER_CONFIG_PATH=config/verifier.toml cargo run --bin transfer-verifier
//! ```

use anyhow::Result;
use clap::Parser;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use transfer_verifier::api::ApiServer;
use transfer_verifier::config::Config;
use transfer_verifier::effects::SideEffects;
use transfer_verifier::monitor::{ImmediateChecker, MonitorSettings, OutcomeHandler, PendingMonitor};
use transfer_verifier::storage::open_store;
use transfer_verifier::validator::CheckerSet;

#[derive(Parser, Debug)]
#[command(name = "transfer-verifier")]
#[command(about = "Verifies stablecoin transfers and tracks them until confirmation")]
struct Args {
    /// Path to configuration file (default: config/verifier.toml or TRANSFER_VERIFIER_CONFIG_PATH env var)
    #[arg(short, long)]
    config: Option<String>,
}

// ============================================================================
// MAIN APPLICATION ENTRY POINT
// ============================================================================

/// Main application entry point.
///
/// This function:
/// 1. Parses arguments and initializes logging
/// 2. Loads and validates configuration
/// 3. Builds explorer clients, checkers and the pending store
/// 4. Runs the poller and the API server until Ctrl+C
#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting Transfer Verifier Service");

    let config = Config::load(args.config.as_deref())?;
    info!("Configuration loaded successfully");

    let checkers = CheckerSet::from_config(&config)?;
    let store = open_store(&config.storage).await?;
    let outcomes = OutcomeHandler::new(store.clone(), SideEffects::tracing());

    let settings = MonitorSettings::from(&config.service);
    let monitor = PendingMonitor::new(store.clone(), checkers.clone(), outcomes.clone(), settings);
    let checker = ImmediateChecker::new(store, checkers, outcomes, settings.lock_ttl);
    let api_server = ApiServer::new(config, checker);

    info!("All components initialized successfully");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown = |mut rx: watch::Receiver<bool>| async move {
        let _ = rx.changed().await;
    };

    let monitor_shutdown = shutdown(shutdown_rx.clone());
    let monitor_task = tokio::spawn(async move {
        if let Err(e) = monitor.run(monitor_shutdown).await {
            error!("Monitoring error: {}", e);
        }
    });

    let api_shutdown = shutdown(shutdown_rx);
    let api_task = tokio::spawn(async move {
        if let Err(e) = api_server.run(api_shutdown).await {
            error!("API server error: {}", e);
        }
    });

    signal::ctrl_c().await?;
    info!("Received shutdown signal, stopping services...");
    let _ = shutdown_tx.send(true);

    let _ = tokio::join!(monitor_task, api_task);
    info!("Transfer verifier stopped");
    Ok(())
}
