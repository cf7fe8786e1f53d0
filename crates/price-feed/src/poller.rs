//! Keeps downstream feed services subscribed to every symbol we watch

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Deserialize;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::feeds::FeedEndpoint;
use crate::registry::Registry;

#[derive(Debug, Deserialize)]
struct CoinEntry {
    symbol: String,
}

/// Read `[{symbol}]` from the coins file. A missing file means no coins.
pub fn load_coins(path: &str) -> anyhow::Result<Vec<String>> {
    if !Path::new(path).exists() {
        return Ok(vec![]);
    }
    let raw = std::fs::read_to_string(path)?;
    let coins: Vec<CoinEntry> = serde_json::from_str(&raw)?;
    Ok(coins
        .into_iter()
        .map(|c| c.symbol.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}

/// Outcome of one push round
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollStats {
    pub pushed: usize,
    pub failed: usize,
}

struct PollerInner {
    endpoints: Vec<FeedEndpoint>,
    coins: Vec<String>,
    registry: Arc<Registry>,
}

impl PollerInner {
    fn symbols(&self) -> Vec<String> {
        let set: BTreeSet<String> = self
            .coins
            .iter()
            .cloned()
            .chain(self.registry.symbols())
            .collect();
        set.into_iter().collect()
    }

    async fn push_once(&self) -> PollStats {
        let symbols = self.symbols();
        let mut stats = PollStats::default();

        for endpoint in &self.endpoints {
            let results = join_all(symbols.iter().map(|s| endpoint.add_token(s))).await;
            for result in results {
                match result {
                    Ok(()) => stats.pushed += 1,
                    Err(e) => {
                        stats.failed += 1;
                        warn!("Feed push to {} failed: {:#}", endpoint.base_url(), e);
                    }
                }
            }
        }
        stats
    }
}

/// Periodically pushes the coins file plus every registry symbol to each
/// configured feed endpoint
pub struct SymbolPoller {
    inner: Arc<PollerInner>,
    interval: Duration,
    handle: Option<JoinHandle<()>>,
    running: Arc<RwLock<bool>>,
}

impl SymbolPoller {
    pub fn new(
        endpoints: Vec<FeedEndpoint>,
        coins: Vec<String>,
        registry: Arc<Registry>,
        interval: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(PollerInner {
                endpoints,
                coins,
                registry,
            }),
            interval,
            handle: None,
            running: Arc::new(RwLock::new(false)),
        }
    }

    /// Union of coin-file and registry symbols, sorted and deduplicated
    pub fn symbols(&self) -> Vec<String> {
        self.inner.symbols()
    }

    pub async fn push_once(&self) -> PollStats {
        self.inner.push_once().await
    }

    pub async fn start(&mut self) {
        if self.inner.endpoints.is_empty() {
            info!("No feed endpoints configured, symbol poller idle");
            return;
        }

        info!(
            "Starting symbol poller: {} endpoints every {:?}",
            self.inner.endpoints.len(),
            self.interval
        );
        *self.running.write().await = true;

        let inner = Arc::clone(&self.inner);
        let running = Arc::clone(&self.running);
        let period = self.interval;

        self.handle = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                if !*running.read().await {
                    break;
                }

                let stats = inner.push_once().await;
                info!(
                    "Symbol push: {} ok, {} failed",
                    stats.pushed, stats.failed
                );
            }
        }));
    }

    pub async fn stop(&mut self) {
        info!("Stopping symbol poller");
        *self.running.write().await = false;

        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }
}
