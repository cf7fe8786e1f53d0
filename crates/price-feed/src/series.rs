//! Ordered price history for a single symbol

use chrono::{Duration, NaiveDateTime};
use rust_decimal::Decimal;

use pricewatch_core::PriceObservation;

/// Observations for one symbol, kept ordered by timestamp.
///
/// The current price is whatever was accepted last, which is the newest
/// observation unless the feed delivered out of order.
#[derive(Debug, Clone)]
pub struct PriceSeries {
    symbol: String,
    currency: String,
    observations: Vec<PriceObservation>,
    current: Option<PriceObservation>,
}

impl PriceSeries {
    pub fn new(symbol: impl Into<String>, currency: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            currency: currency.into(),
            observations: Vec::new(),
            current: None,
        }
    }

    /// Rebuild a series from stored history
    pub fn with_history(
        symbol: impl Into<String>,
        currency: impl Into<String>,
        mut observations: Vec<PriceObservation>,
    ) -> Self {
        observations.sort_by_key(|o| o.timestamp);
        let current = observations.last().copied();
        Self {
            symbol: symbol.into(),
            currency: currency.into(),
            observations,
            current,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn observations(&self) -> &[PriceObservation] {
        &self.observations
    }

    pub fn current(&self) -> Option<&PriceObservation> {
        self.current.as_ref()
    }

    /// Last accepted price, zero when empty
    pub fn current_price(&self) -> Decimal {
        self.current.map(|o| o.price).unwrap_or(Decimal::ZERO)
    }

    /// Append an observation. Returns false (and changes nothing) when the
    /// price equals the current price.
    pub fn append(&mut self, price: Decimal, timestamp: NaiveDateTime) -> bool {
        if price == self.current_price() {
            return false;
        }

        let observation = PriceObservation::new(price, timestamp);
        // Equal timestamps keep arrival order
        let idx = self
            .observations
            .partition_point(|o| o.timestamp <= timestamp);
        self.observations.insert(idx, observation);
        self.current = Some(observation);
        true
    }

    /// Observation closest to `now - window`
    pub fn nearest(&self, window: Duration, now: NaiveDateTime) -> Option<&PriceObservation> {
        self.nearest_to(now - window)
    }

    /// Observation with the smallest `|timestamp - reference|`. On a tie the
    /// earlier one wins, and among equal timestamps the first appended.
    pub fn nearest_to(&self, reference: NaiveDateTime) -> Option<&PriceObservation> {
        let after = self
            .observations
            .partition_point(|o| o.timestamp < reference);

        let later = self.observations.get(after);
        let earlier = after.checked_sub(1).and_then(|prev| {
            let ts = self.observations[prev].timestamp;
            let run_start = self.observations.partition_point(|o| o.timestamp < ts);
            self.observations.get(run_start)
        });

        match (earlier, later) {
            (Some(e), Some(l)) => {
                if l.distance_to(reference) < e.distance_to(reference) {
                    Some(l)
                } else {
                    Some(e)
                }
            }
            (Some(e), None) => Some(e),
            (None, l) => l,
        }
    }

    /// Observations strictly newer than `cutoff`
    pub fn since(&self, cutoff: NaiveDateTime) -> &[PriceObservation] {
        let start = self
            .observations
            .partition_point(|o| o.timestamp <= cutoff);
        &self.observations[start..]
    }
}
