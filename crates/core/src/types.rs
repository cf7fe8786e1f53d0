//! Core type definitions

use chrono::{Duration, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{CoreError, CoreResult, WindowSpec};

/// Wire and storage format of every timestamp handled by the service
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parse a `YYYY-MM-DD HH:MM:SS` timestamp
pub fn parse_timestamp(raw: &str) -> CoreResult<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw.trim(), TIMESTAMP_FORMAT).map_err(|_| {
        CoreError::InvalidTimestamp {
            value: raw.to_string(),
        }
    })
}

pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// A single price seen for a symbol at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceObservation {
    pub price: Decimal,
    pub timestamp: NaiveDateTime,
}

impl PriceObservation {
    pub fn new(price: Decimal, timestamp: NaiveDateTime) -> Self {
        Self { price, timestamp }
    }

    /// Absolute distance between this observation and `reference`
    pub fn distance_to(&self, reference: NaiveDateTime) -> Duration {
        let delta = self.timestamp - reference;
        if delta < Duration::zero() {
            -delta
        } else {
            delta
        }
    }
}

/// Direction of a price move relative to its reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

/// A look-back duration paired with the minimum percent change that alerts
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "WindowSpec")]
pub struct Window {
    pub label: String,
    pub duration: Duration,
    /// Percent, e.g. `0.1` means 0.1%
    pub threshold: Decimal,
}

impl Window {
    pub fn new(label: impl Into<String>, duration: Duration, threshold: Decimal) -> Self {
        Self {
            label: label.into(),
            duration,
            threshold,
        }
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (>= {}%)", self.label, self.threshold)
    }
}

/// Static price of interest for a symbol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchLevel {
    pub symbol: String,
    pub price: Decimal,
}

impl WatchLevel {
    pub fn new(symbol: impl Into<String>, price: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            price,
        }
    }

    /// True when `price` lies strictly inside `level * (1 ± tolerance)`
    pub fn is_near(&self, price: Decimal, tolerance: Decimal) -> bool {
        let lower = self.price * (Decimal::ONE - tolerance);
        let upper = self.price * (Decimal::ONE + tolerance);
        lower < price && price < upper
    }
}

/// What an alert event describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Ath,
    Atl,
    LevelProximity,
}

impl AlertKind {
    pub fn name(&self) -> &'static str {
        match self {
            AlertKind::Ath => "ath",
            AlertKind::Atl => "atl",
            AlertKind::LevelProximity => "level_proximity",
        }
    }

    pub fn is_price_change(&self) -> bool {
        matches!(self, AlertKind::Ath | AlertKind::Atl)
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Notification routing bucket derived from `change / threshold`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Standard,
    Elevated,
    Critical,
}

impl Severity {
    pub fn from_ratio(ratio: Decimal) -> Self {
        if ratio >= Decimal::from(3) {
            Severity::Critical
        } else if ratio >= Decimal::from(2) {
            Severity::Elevated
        } else {
            Severity::Standard
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Severity::Standard => "standard",
            Severity::Elevated => "elevated",
            Severity::Critical => "critical",
        }
    }

    pub fn channel(&self) -> Channel {
        match self {
            Severity::Standard => Channel::Standard,
            Severity::Elevated => Channel::Elevated,
            Severity::Critical => Channel::Critical,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Outbound notification channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Receives every price-change event
    All,
    Standard,
    Elevated,
    Critical,
    Levels,
}

impl Channel {
    pub const ALL: [Channel; 5] = [
        Channel::All,
        Channel::Standard,
        Channel::Elevated,
        Channel::Critical,
        Channel::Levels,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Channel::All => "all",
            Channel::Standard => "standard",
            Channel::Elevated => "elevated",
            Channel::Critical => "critical",
            Channel::Levels => "levels",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A detected condition handed to the dispatcher. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertEvent {
    pub symbol: String,
    pub kind: AlertKind,
    /// Window label for price-change events
    pub window: Option<String>,
    /// Window threshold (percent) for price-change events
    pub threshold: Option<Decimal>,
    /// Historical price for price-change events, the watch level otherwise
    pub reference_price: Decimal,
    pub current_price: Decimal,
    pub percent_change: Decimal,
    pub reference_timestamp: Option<NaiveDateTime>,
    pub current_timestamp: NaiveDateTime,
}

impl AlertEvent {
    /// `percent_change / threshold`, undefined for level events and zero thresholds
    pub fn ratio(&self) -> Option<Decimal> {
        if !self.kind.is_price_change() {
            return None;
        }
        self.threshold
            .and_then(|threshold| self.percent_change.checked_div(threshold))
    }

    pub fn severity(&self) -> Option<Severity> {
        if !self.kind.is_price_change() {
            return None;
        }
        Some(self.ratio().map(Severity::from_ratio).unwrap_or(Severity::Standard))
    }

    pub fn direction(&self) -> Direction {
        match self.kind {
            AlertKind::Atl => Direction::Down,
            AlertKind::Ath => Direction::Up,
            AlertKind::LevelProximity => {
                if self.current_price < self.reference_price {
                    Direction::Down
                } else {
                    Direction::Up
                }
            }
        }
    }
}
