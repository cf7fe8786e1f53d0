//! Asynchronous alert delivery
//!
//! Ingestion only ever calls [`DispatcherHandle::dispatch`], which renders
//! the event and enqueues one delivery per routed channel without blocking.
//! A worker task performs the sends with bounded concurrency and a timeout
//! per delivery.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use pricewatch_core::{AlertEvent, Channel, NotifierConfig, NotifyError, MAX_IN_FLIGHT};

use crate::channels::{NotificationSink, SinkMap};
use crate::render::render;

/// Channels an event is delivered to
pub fn route(event: &AlertEvent) -> Vec<Channel> {
    match event.severity() {
        Some(severity) => vec![Channel::All, severity.channel()],
        None => vec![Channel::Levels],
    }
}

struct Delivery {
    channel: Channel,
    sink: Arc<dyn NotificationSink>,
    event: Arc<AlertEvent>,
    text: Arc<str>,
}

#[derive(Default)]
struct Counters {
    sent: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

/// Delivery counters since startup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    pub sent: u64,
    pub failed: u64,
    pub dropped: u64,
}

/// Cloneable producer side of the dispatcher
#[derive(Clone)]
pub struct DispatcherHandle {
    tx: mpsc::Sender<Delivery>,
    sinks: Arc<SinkMap>,
    counters: Arc<Counters>,
}

impl DispatcherHandle {
    /// Queue `event` for every routed channel that has a sink.
    /// Returns how many deliveries were queued.
    pub fn dispatch(&self, event: AlertEvent) -> usize {
        let targets: Vec<(Channel, Arc<dyn NotificationSink>)> = route(&event)
            .into_iter()
            .filter_map(|c| self.sinks.get(&c).map(|s| (c, Arc::clone(s))))
            .collect();
        if targets.is_empty() {
            debug!("No sink configured for {} {} alert", event.symbol, event.kind);
            return 0;
        }

        let text: Arc<str> = Arc::from(render(&event));
        let event = Arc::new(event);
        let mut queued = 0;

        for (channel, sink) in targets {
            let delivery = Delivery {
                channel,
                sink,
                event: Arc::clone(&event),
                text: Arc::clone(&text),
            };
            match self.tx.try_send(delivery) {
                Ok(()) => queued += 1,
                Err(e) => {
                    let reason = match e {
                        mpsc::error::TrySendError::Full(_) => NotifyError::QueueFull,
                        mpsc::error::TrySendError::Closed(_) => NotifyError::QueueClosed,
                    };
                    self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                    warn!("Dropped {} alert for {} on {}: {}", event.kind, event.symbol, channel, reason);
                }
            }
        }
        queued
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            sent: self.counters.sent.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }

    pub fn channels(&self) -> Vec<Channel> {
        Channel::ALL
            .into_iter()
            .filter(|c| self.sinks.contains_key(c))
            .collect()
    }
}

pub struct AlertDispatcher;

impl AlertDispatcher {
    /// Start the delivery worker. It finishes in-flight sends and exits once
    /// every handle has been dropped.
    pub fn spawn(config: &NotifierConfig, sinks: SinkMap) -> (DispatcherHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let counters = Arc::new(Counters::default());

        let worker = tokio::spawn(run_worker(
            rx,
            Arc::clone(&counters),
            config.max_in_flight.clamp(1, MAX_IN_FLIGHT),
            Duration::from_millis(config.timeout_ms),
        ));

        let handle = DispatcherHandle {
            tx,
            sinks: Arc::new(sinks),
            counters,
        };
        (handle, worker)
    }
}

async fn run_worker(
    mut rx: mpsc::Receiver<Delivery>,
    counters: Arc<Counters>,
    max_in_flight: usize,
    timeout: Duration,
) {
    let permits = Arc::new(Semaphore::new(max_in_flight));
    let timeout_ms = timeout.as_millis() as u64;

    while let Some(delivery) = rx.recv().await {
        let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
            break;
        };
        let counters = Arc::clone(&counters);

        tokio::spawn(async move {
            let result = tokio::time::timeout(
                timeout,
                delivery.sink.send(&delivery.event, &delivery.text),
            )
            .await
            .unwrap_or(Err(NotifyError::Timeout { timeout_ms }));

            match result {
                Ok(()) => {
                    counters.sent.fetch_add(1, Ordering::Relaxed);
                    debug!("Delivered {} alert on {}", delivery.event.symbol, delivery.channel);
                }
                Err(e) => {
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        "Delivery of {} alert on {} via {} failed: {}",
                        delivery.event.symbol,
                        delivery.channel,
                        delivery.sink.name(),
                        e
                    );
                }
            }
            drop(permit);
        });
    }

    // wait for in-flight sends
    let _ = permits.acquire_many(max_in_flight as u32).await;
    info!("Alert dispatcher stopped");
}
