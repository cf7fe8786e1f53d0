//! Static price level proximity

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use anyhow::Context;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use pricewatch_core::{AlertEvent, AlertKind, PriceObservation, WatchLevel};

use crate::window::percent_change;

/// Default fractional tolerance either side of a level
pub const DEFAULT_TOLERANCE: Decimal = Decimal::from_parts(15, 0, 0, false, 3);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawLevel {
    Text(String),
    Number(Value),
}

impl RawLevel {
    fn parse(&self) -> Option<Decimal> {
        match self {
            RawLevel::Text(s) => Decimal::from_str(s.trim()).ok(),
            RawLevel::Number(v) => Decimal::from_str(&v.to_string()).ok(),
        }
    }
}

/// Per-symbol watch levels, read-only after load
#[derive(Debug, Clone, Default)]
pub struct LevelWatcher {
    levels: HashMap<String, Vec<Decimal>>,
    tolerance: Decimal,
}

impl LevelWatcher {
    pub fn new(tolerance: Decimal) -> Self {
        Self {
            levels: HashMap::new(),
            tolerance,
        }
    }

    pub fn with_levels(tolerance: Decimal, levels: impl IntoIterator<Item = WatchLevel>) -> Self {
        let mut watcher = Self::new(tolerance);
        for level in levels {
            watcher.add(level);
        }
        watcher
    }

    /// Load `{"SYMBOL": [level, ...]}`; levels may be numbers or numeric strings.
    /// A missing file yields an empty watcher.
    pub fn load(path: &str, tolerance: Decimal) -> anyhow::Result<Self> {
        if !Path::new(path).exists() {
            info!("No price levels file at {path}");
            return Ok(Self::new(tolerance));
        }
        let raw = std::fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
        let watcher = Self::from_json(&raw, tolerance).with_context(|| format!("parsing {path}"))?;
        info!(
            "Loaded {} price levels for {} symbols",
            watcher.level_count(),
            watcher.levels.len()
        );
        Ok(watcher)
    }

    pub fn from_json(raw: &str, tolerance: Decimal) -> anyhow::Result<Self> {
        let parsed: HashMap<String, Vec<RawLevel>> = serde_json::from_str(raw)?;
        let mut watcher = Self::new(tolerance);
        for (symbol, levels) in parsed {
            for level in levels {
                let price = level
                    .parse()
                    .with_context(|| format!("level for {symbol} is not a number"))?;
                watcher.add(WatchLevel::new(symbol.as_str(), price));
            }
        }
        Ok(watcher)
    }

    pub fn add(&mut self, level: WatchLevel) {
        self.levels.entry(level.symbol).or_default().push(level.price);
    }

    pub fn tolerance(&self) -> Decimal {
        self.tolerance
    }

    pub fn levels_for(&self, symbol: &str) -> &[Decimal] {
        self.levels.get(symbol).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn level_count(&self) -> usize {
        self.levels.values().map(Vec::len).sum()
    }

    /// One event per level the observation is near
    pub fn check(&self, symbol: &str, observation: &PriceObservation) -> Vec<AlertEvent> {
        self.levels_for(symbol)
            .iter()
            .filter(|level| {
                WatchLevel::new(symbol, **level).is_near(observation.price, self.tolerance)
            })
            .map(|level| AlertEvent {
                symbol: symbol.to_string(),
                kind: AlertKind::LevelProximity,
                window: None,
                threshold: None,
                reference_price: *level,
                current_price: observation.price,
                percent_change: percent_change(*level, observation.price)
                    .map(|(_, change)| change)
                    .unwrap_or(Decimal::ZERO),
                reference_timestamp: None,
                current_timestamp: observation.timestamp,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pricewatch_core::parse_timestamp;
    use rust_decimal_macros::dec;

    fn obs(price: Decimal) -> PriceObservation {
        PriceObservation::new(price, parse_timestamp("2024-03-01 12:00:00").unwrap())
    }

    #[test]
    fn test_level_proximity_scenario() {
        let watcher =
            LevelWatcher::with_levels(DEFAULT_TOLERANCE, [WatchLevel::new("BTC", dec!(1000))]);

        let hits = watcher.check("BTC", &obs(dec!(995)));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].kind, AlertKind::LevelProximity);
        assert_eq!(hits[0].reference_price, dec!(1000));
        assert_eq!(hits[0].percent_change, dec!(0.5));

        assert!(watcher.check("BTC", &obs(dec!(900))).is_empty());
        assert!(watcher.check("ETH", &obs(dec!(995))).is_empty());
    }

    #[test]
    fn test_bounds_are_exclusive() {
        let watcher =
            LevelWatcher::with_levels(DEFAULT_TOLERANCE, [WatchLevel::new("BTC", dec!(1000))]);
        assert!(watcher.check("BTC", &obs(dec!(985))).is_empty());
        assert!(watcher.check("BTC", &obs(dec!(1015))).is_empty());
        assert_eq!(watcher.check("BTC", &obs(dec!(1014.99))).len(), 1);
    }

    #[test]
    fn test_every_matching_level_fires() {
        let watcher = LevelWatcher::with_levels(
            dec!(0.05),
            [
                WatchLevel::new("ETH", dec!(100)),
                WatchLevel::new("ETH", dec!(103)),
                WatchLevel::new("ETH", dec!(200)),
            ],
        );
        let hits = watcher.check("ETH", &obs(dec!(101)));
        let levels: Vec<_> = hits.iter().map(|e| e.reference_price).collect();
        assert_eq!(levels, vec![dec!(100), dec!(103)]);
    }

    #[test]
    fn test_from_json_accepts_strings_and_numbers() {
        let watcher = LevelWatcher::from_json(
            r#"{"BTC": ["65000", 70000.5], "LINA": [0.012]}"#,
            DEFAULT_TOLERANCE,
        )
        .unwrap();
        assert_eq!(watcher.levels_for("BTC"), &[dec!(65000), dec!(70000.5)]);
        assert_eq!(watcher.levels_for("LINA"), &[dec!(0.012)]);
        assert_eq!(watcher.level_count(), 3);

        assert!(LevelWatcher::from_json(r#"{"BTC": ["soon"]}"#, DEFAULT_TOLERANCE).is_err());
    }

    #[test]
    fn test_missing_file_is_empty() {
        let watcher = LevelWatcher::load("/nonexistent/price_levels.json", DEFAULT_TOLERANCE).unwrap();
        assert_eq!(watcher.level_count(), 0);
    }
}
