//! Symbol registry
//!
//! Uses DashMap for lookup-or-create with one winner per symbol, and a
//! mutex per series so different symbols never contend.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::series::PriceSeries;

/// A series shared between the registry and whoever is evaluating it
pub type SharedSeries = Arc<Mutex<PriceSeries>>;

/// Owns every known symbol's price history
#[derive(Debug)]
pub struct Registry {
    series: DashMap<String, SharedSeries>,
    default_currency: String,
}

impl Registry {
    pub fn new(default_currency: impl Into<String>) -> Self {
        Self {
            series: DashMap::new(),
            default_currency: default_currency.into(),
        }
    }

    /// Load stored series. Symbols already present are left untouched.
    pub fn bootstrap(&self, series: impl IntoIterator<Item = PriceSeries>) -> usize {
        let mut loaded = 0;
        for s in series {
            if let Entry::Vacant(slot) = self.series.entry(s.symbol().to_string()) {
                slot.insert(Arc::new(Mutex::new(s)));
                loaded += 1;
            }
        }
        loaded
    }

    pub fn get(&self, symbol: &str) -> Option<SharedSeries> {
        self.series.get(symbol).map(|r| Arc::clone(r.value()))
    }

    /// Returns the series and whether this call created it
    pub fn get_or_create(&self, symbol: &str) -> (SharedSeries, bool) {
        if let Some(existing) = self.get(symbol) {
            return (existing, false);
        }

        match self.series.entry(symbol.to_string()) {
            Entry::Occupied(entry) => (Arc::clone(entry.get()), false),
            Entry::Vacant(slot) => {
                let series = Arc::new(Mutex::new(PriceSeries::new(
                    symbol,
                    self.default_currency.as_str(),
                )));
                slot.insert(Arc::clone(&series));
                (series, true)
            }
        }
    }

    /// Known symbols, sorted
    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.series.iter().map(|e| e.key().clone()).collect();
        symbols.sort();
        symbols
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Drop every series
    pub fn clear(&self) {
        self.series.clear();
    }

    pub fn stats(&self) -> RegistryStats {
        let handles: Vec<SharedSeries> = self
            .series
            .iter()
            .map(|e| Arc::clone(e.value()))
            .collect();

        RegistryStats {
            symbol_count: handles.len(),
            observation_count: handles.iter().map(|s| s.lock().len()).sum(),
        }
    }
}

/// Statistics about the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStats {
    pub symbol_count: usize,
    pub observation_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pricewatch_core::parse_timestamp;
    use rust_decimal::Decimal;
    use std::thread;

    #[test]
    fn test_get_or_create_reuses_series() {
        let registry = Registry::new("USD");
        let (first, created) = registry.get_or_create("BTC");
        assert!(created);
        let (second, created) = registry.get_or_create("BTC");
        assert!(!created);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.lock().currency(), "USD");
    }

    #[test]
    fn test_concurrent_creation_has_one_winner() {
        let registry = Arc::new(Registry::new("USD"));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || registry.get_or_create("ETH").1)
            })
            .collect();

        let created = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|created| *created)
            .count();
        assert_eq!(created, 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_concurrent_appends_to_different_symbols() {
        let registry = Arc::new(Registry::new("USD"));
        let start = parse_timestamp("2024-03-01 00:00:00").unwrap();

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    let symbol = format!("TOKEN{i}");
                    for j in 1..=100 {
                        let (series, _) = registry.get_or_create(&symbol);
                        series
                            .lock()
                            .append(Decimal::from(j), start + chrono::Duration::seconds(j));
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        let stats = registry.stats();
        assert_eq!(stats.symbol_count, 4);
        assert_eq!(stats.observation_count, 400);
        assert_eq!(registry.symbols(), vec!["TOKEN0", "TOKEN1", "TOKEN2", "TOKEN3"]);
    }

    #[test]
    fn test_bootstrap_skips_known_symbols() {
        let registry = Registry::new("USD");
        registry.get_or_create("BTC");

        let loaded = registry.bootstrap(vec![
            PriceSeries::new("BTC", "USD"),
            PriceSeries::new("SOL", "EUR"),
        ]);
        assert_eq!(loaded, 1);
        assert_eq!(registry.get("SOL").unwrap().lock().currency(), "EUR");

        registry.clear();
        assert!(registry.is_empty());
    }
}
