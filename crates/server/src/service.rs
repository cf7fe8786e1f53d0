//! Ingestion service: append, detect, dispatch

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info};

use pricewatch_core::{Clock, PriceObservation};
use pricewatch_detector::{PriceScanner, ScanReport};
use pricewatch_feed::{PersistHandle, Registry};
use pricewatch_notifier::{render, DispatcherHandle};

/// What happened to one ingested observation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestOutcome {
    /// False when the price equalled the current price
    pub accepted: bool,
    pub new_symbol: bool,
    pub alerts: usize,
    pub suppressed: usize,
    pub deliveries: usize,
}

/// Snapshot served by `/health`
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub uptime_secs: u64,
    pub symbols: usize,
    pub observations: usize,
    pub alerts_sent: u64,
    pub alerts_failed: u64,
    pub alerts_dropped: u64,
}

/// Shared state behind the HTTP handlers
pub struct AlertService {
    registry: Arc<Registry>,
    scanner: PriceScanner,
    dispatcher: DispatcherHandle,
    persist: Option<PersistHandle>,
    clock: Arc<dyn Clock>,
    start_time: Instant,
}

impl AlertService {
    pub fn new(
        registry: Arc<Registry>,
        scanner: PriceScanner,
        dispatcher: DispatcherHandle,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            scanner,
            dispatcher,
            persist: None,
            clock,
            start_time: Instant::now(),
        }
    }

    pub fn with_persistence(mut self, persist: PersistHandle) -> Self {
        self.persist = Some(persist);
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Append the observation and run detection while holding the symbol's
    /// lock. Never waits on network or disk.
    pub fn ingest(&self, symbol: &str, observation: PriceObservation) -> IngestOutcome {
        self.ingest_inspect(symbol, observation, |_| {})
    }

    /// `ingest`, handing the scan report to `inspect` before dispatch
    fn ingest_inspect(
        &self,
        symbol: &str,
        observation: PriceObservation,
        inspect: impl FnOnce(&ScanReport),
    ) -> IngestOutcome {
        let (series, new_symbol) = self.registry.get_or_create(symbol);
        if new_symbol {
            info!("Tracking new symbol {}", symbol);
        }

        let mut series = series.lock();
        if !series.append(observation.price, observation.timestamp) {
            debug!("{} unchanged at {}, discarded", symbol, observation.price);
            return IngestOutcome {
                new_symbol,
                ..Default::default()
            };
        }

        if let Some(persist) = &self.persist {
            persist.persist(series.symbol(), series.currency(), observation);
        }

        let report = self.scanner.scan(&series, &observation, self.clock.now());
        inspect(&report);

        for event in &report.suppressed {
            info!("Move not at a window extreme, not sent:\n{}", render(event));
        }

        let alerts = report.events.len();
        // still under the series lock, so per-symbol alert order is kept
        let deliveries = report
            .events
            .into_iter()
            .map(|event| self.dispatcher.dispatch(event))
            .sum();

        IngestOutcome {
            accepted: true,
            new_symbol,
            alerts,
            suppressed: report.suppressed.len(),
            deliveries,
        }
    }

    pub fn health(&self) -> HealthStatus {
        let registry = self.registry.stats();
        let dispatch = self.dispatcher.stats();
        HealthStatus {
            status: "ok",
            uptime_secs: self.start_time.elapsed().as_secs(),
            symbols: registry.symbol_count,
            observations: registry.observation_count,
            alerts_sent: dispatch.sent,
            alerts_failed: dispatch.failed,
            alerts_dropped: dispatch.dropped,
        }
    }
}
