//! Pricewatch - token price alerting service
//!
//! Main entry point for the HTTP server

use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use pricewatch_core::{AppConfig, SystemClock};
use pricewatch_detector::{LevelWatcher, PriceScanner};
use pricewatch_feed::{
    load_coins, spawn_writer, FeedEndpoint, HistoryStore, Registry, SqliteStore, SymbolPoller,
};
use pricewatch_notifier::{build_sinks, AlertDispatcher};
use pricewatch_server::{AlertService, HttpServer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    info!("Starting Pricewatch v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config_path = env::var("PRICEWATCH_CONFIG").unwrap_or_else(|_| "pricewatch.toml".to_string());
    let config = AppConfig::load(&config_path)?;
    info!(
        "Loaded configuration from {} ({} windows)",
        config_path,
        config.alerts.windows.len()
    );

    // History
    let store = SqliteStore::open(
        &config.storage.database_path,
        config.storage.migrate_from.as_deref(),
    )?;
    let registry = Arc::new(Registry::new(config.alerts.default_currency.as_str()));
    let loaded = registry.bootstrap(store.load_all()?);
    let stats = registry.stats();
    info!(
        "Loaded {} symbols with {} observations",
        loaded, stats.observation_count
    );
    let (persist, writer) = spawn_writer(store);

    // Detection
    let levels = match &config.alerts.levels_path {
        Some(path) => LevelWatcher::load(path, config.alerts.level_tolerance)?,
        None => LevelWatcher::new(config.alerts.level_tolerance),
    };
    let scanner = PriceScanner::new(config.alerts.windows.clone(), levels);

    // Delivery
    let http = reqwest::Client::builder()
        .timeout(Duration::from_millis(config.notifier.timeout_ms))
        .build()
        .context("building HTTP client")?;
    let sinks = build_sinks(&config.notifier.channels, &http);
    if sinks.is_empty() {
        info!("No notification channels configured");
    }
    let (dispatcher, dispatch_worker) = AlertDispatcher::spawn(&config.notifier, sinks);

    // Downstream feeds
    let coins = match &config.poller.coins_path {
        Some(path) => load_coins(path).with_context(|| format!("reading {path}"))?,
        None => vec![],
    };
    let endpoints = config
        .poller
        .endpoints
        .iter()
        .map(|url| FeedEndpoint::new(url.as_str(), http.clone()))
        .collect();
    let mut poller = SymbolPoller::new(
        endpoints,
        coins,
        Arc::clone(&registry),
        Duration::from_secs(config.poller.interval_secs),
    );
    poller.start().await;

    let clock = Arc::new(SystemClock::new(config.alerts.timezone));
    let service = AlertService::new(Arc::clone(&registry), scanner, dispatcher, clock)
        .with_persistence(persist);
    let server = HttpServer::new(config.server.clone(), service);

    // Setup shutdown channel
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

    // Spawn shutdown signal handler
    tokio::spawn(async move {
        let ctrl_c = async {
            signal::ctrl_c()
                .await
                .expect("Failed to install Ctrl+C handler");
        };

        #[cfg(unix)]
        let terminate = async {
            signal::unix::signal(signal::unix::SignalKind::terminate())
                .expect("Failed to install signal handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("Received Ctrl+C");
            }
            _ = terminate => {
                info!("Received termination signal");
            }
        }

        let _ = shutdown_tx.send(());
    });

    info!("HTTP server listening on {}", server.address());
    info!("Press Ctrl+C to shutdown");

    let result = server.start_with_shutdown(shutdown_rx).await;
    poller.stop().await;

    // Dropping the last handles lets the workers drain and exit
    drop(server);
    if let Err(e) = writer.await {
        error!("Persistence writer panicked: {}", e);
    }
    if let Err(e) = dispatch_worker.await {
        error!("Alert dispatcher panicked: {}", e);
    }
    registry.clear();

    if let Err(e) = result {
        error!("Server error: {}", e);
        return Err(e);
    }

    info!("Server shutdown complete");
    Ok(())
}
