//! Runs every detector over a freshly appended observation

use chrono::NaiveDateTime;
use tracing::debug;

use pricewatch_core::{AlertEvent, PriceObservation, Window};
use pricewatch_feed::PriceSeries;

use crate::levels::LevelWatcher;
use crate::window::{Evaluation, WindowEvaluator};

/// What one observation produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanReport {
    /// Events to dispatch, windows first in configuration order, then levels
    pub events: Vec<AlertEvent>,
    /// Threshold-meeting moves that were not new extremes
    pub suppressed: Vec<AlertEvent>,
    /// Windows skipped for lack of a usable reference
    pub skipped: usize,
}

impl ScanReport {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.suppressed.is_empty()
    }
}

/// Window and level detection for a single symbol's series
pub struct PriceScanner {
    evaluator: WindowEvaluator,
    levels: LevelWatcher,
}

impl PriceScanner {
    pub fn new(windows: Vec<Window>, levels: LevelWatcher) -> Self {
        Self {
            evaluator: WindowEvaluator::new(windows),
            levels,
        }
    }

    pub fn evaluator(&self) -> &WindowEvaluator {
        &self.evaluator
    }

    pub fn levels(&self) -> &LevelWatcher {
        &self.levels
    }

    /// Evaluate `observation`, which must already be the series' current entry.
    /// Windows run once each, levels once.
    pub fn scan(
        &self,
        series: &PriceSeries,
        observation: &PriceObservation,
        now: NaiveDateTime,
    ) -> ScanReport {
        let mut report = ScanReport::default();

        for evaluation in self.evaluator.evaluate_all(series, observation, now) {
            match evaluation {
                Evaluation::Moved(outcome) if outcome.is_alert() => {
                    report.events.push(outcome.to_event(series.symbol()));
                }
                Evaluation::Moved(outcome) if outcome.is_suppressed() => {
                    report.suppressed.push(outcome.to_event(series.symbol()));
                }
                Evaluation::Moved(_) | Evaluation::Unchanged => {}
                Evaluation::Skipped(reason) => {
                    debug!("{} window skipped: {}", series.symbol(), reason);
                    report.skipped += 1;
                }
            }
        }

        report
            .events
            .extend(self.levels.check(series.symbol(), observation));

        debug!(
            "Scanned {} @ {}: {} events, {} suppressed",
            series.symbol(),
            observation.price,
            report.events.len(),
            report.suppressed.len()
        );
        report
    }
}
