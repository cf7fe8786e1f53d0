//! Configuration types

use std::collections::HashSet;
use std::str::FromStr;

use chrono::Duration;
use config::builder::DefaultState;
use config::ConfigBuilder;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::info;

use crate::{Channel, CoreError, CoreResult, Window};

/// Environment prefix, e.g. `PRICEWATCH__SERVER__PORT=9000`
pub const ENV_PREFIX: &str = "PRICEWATCH";

/// Legacy per-window threshold override, suffixed with the window label
pub const LEGACY_THRESHOLD_PREFIX: &str = "MINIMUM_PRICE_CHANGE_TO_ALERT_";

/// Parse `30s`, `5m`, `1h`, `7d` or `2w` into a positive duration
pub fn parse_duration(raw: &str) -> CoreResult<Duration> {
    let trimmed = raw.trim();
    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (digits, unit) = trimmed.split_at(split);
    let value: i64 = digits
        .parse()
        .map_err(|_| CoreError::InvalidDuration(raw.to_string()))?;

    let duration = match unit.trim().to_ascii_lowercase().as_str() {
        "s" => Duration::try_seconds(value),
        "m" => Duration::try_minutes(value),
        "h" => Duration::try_hours(value),
        "d" => Duration::try_days(value),
        "w" => Duration::try_weeks(value),
        _ => None,
    };

    match duration {
        Some(d) if d > Duration::zero() => Ok(d),
        _ => Err(CoreError::InvalidDuration(raw.to_string())),
    }
}

/// Window entry as written in config files
#[derive(Debug, Clone, Deserialize)]
pub struct WindowSpec {
    #[serde(default)]
    pub label: Option<String>,
    pub duration: String,
    pub threshold: Decimal,
}

impl TryFrom<WindowSpec> for Window {
    type Error = CoreError;

    fn try_from(spec: WindowSpec) -> Result<Self, Self::Error> {
        let duration = parse_duration(&spec.duration)?;
        let label = spec
            .label
            .unwrap_or_else(|| spec.duration.trim().to_ascii_lowercase());
        Ok(Window::new(label, duration, spec.threshold))
    }
}

/// HTTP ingestion endpoint
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

/// History persistence
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database_path: String,
    /// Legacy JSON history imported when the database is first created
    pub migrate_from: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: "database.db".to_string(),
            migrate_from: Some("prices.json".to_string()),
        }
    }
}

/// Timezone the price feed stamps observations in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timezone {
    #[default]
    Local,
    Utc,
}

/// Detection configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub windows: Vec<Window>,
    /// Fractional, `0.015` means 1.5% either side of a level
    pub level_tolerance: Decimal,
    pub levels_path: Option<String>,
    pub timezone: Timezone,
    pub default_currency: String,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            windows: default_windows(),
            level_tolerance: Decimal::new(15, 3),
            levels_path: Some("price_levels.json".to_string()),
            timezone: Timezone::Local,
            default_currency: "USD".to_string(),
        }
    }
}

impl AlertConfig {
    /// Replace window thresholds from `MINIMUM_PRICE_CHANGE_TO_ALERT_<LABEL>` values
    pub fn apply_legacy_overrides<F>(&mut self, lookup: F) -> CoreResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        for window in &mut self.windows {
            let key = format!("{LEGACY_THRESHOLD_PREFIX}{}", window.label.to_uppercase());
            if let Some(raw) = lookup(&key) {
                window.threshold = Decimal::from_str(raw.trim())
                    .map_err(|_| CoreError::InvalidConfig(format!("{key}={raw:?} is not a number")))?;
                info!("Window {} threshold set to {}% from {}", window.label, window.threshold, key);
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> CoreResult<()> {
        let mut labels = HashSet::new();
        for window in &self.windows {
            if window.threshold.is_sign_negative() {
                return Err(CoreError::InvalidConfig(format!(
                    "window {} has a negative threshold",
                    window.label
                )));
            }
            if window.duration <= Duration::zero() {
                return Err(CoreError::InvalidConfig(format!(
                    "window {} has a non-positive duration",
                    window.label
                )));
            }
            if !labels.insert(window.label.as_str()) {
                return Err(CoreError::InvalidConfig(format!(
                    "duplicate window label {}",
                    window.label
                )));
            }
        }

        if self.level_tolerance.is_sign_negative() || self.level_tolerance >= Decimal::ONE {
            return Err(CoreError::InvalidConfig(format!(
                "level_tolerance {} must be within [0, 1)",
                self.level_tolerance
            )));
        }
        Ok(())
    }
}

/// 5m through 30d, thresholds in percent
pub fn default_windows() -> Vec<Window> {
    [
        ("5m", Duration::minutes(5), Decimal::new(1, 1)),
        ("15m", Duration::minutes(15), Decimal::new(5, 1)),
        ("30m", Duration::minutes(30), Decimal::ONE),
        ("1h", Duration::hours(1), Decimal::new(15, 1)),
        ("4h", Duration::hours(4), Decimal::TWO),
        ("8h", Duration::hours(8), Decimal::from(3)),
        ("24h", Duration::hours(24), Decimal::from(5)),
        ("7d", Duration::days(7), Decimal::TEN),
        ("30d", Duration::days(30), Decimal::from(20)),
    ]
    .into_iter()
    .map(|(label, duration, threshold)| Window::new(label, duration, threshold))
    .collect()
}

/// Where a channel's notifications go
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SinkConfig {
    /// Discord-style webhook, form field `content`
    Webhook { url: String },
    Telegram { token: String, chat_id: String },
    /// Write to the service log only
    Log,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ChannelsConfig {
    pub all: Option<SinkConfig>,
    pub standard: Option<SinkConfig>,
    pub elevated: Option<SinkConfig>,
    pub critical: Option<SinkConfig>,
    pub levels: Option<SinkConfig>,
}

impl ChannelsConfig {
    pub fn get(&self, channel: Channel) -> Option<&SinkConfig> {
        match channel {
            Channel::All => self.all.as_ref(),
            Channel::Standard => self.standard.as_ref(),
            Channel::Elevated => self.elevated.as_ref(),
            Channel::Critical => self.critical.as_ref(),
            Channel::Levels => self.levels.as_ref(),
        }
    }
}

/// Upper bound on concurrent deliveries; semaphore permits are finite
pub const MAX_IN_FLIGHT: usize = 65_536;

/// Notification delivery
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    pub timeout_ms: u64,
    pub queue_capacity: usize,
    pub max_in_flight: usize,
    pub channels: ChannelsConfig,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            queue_capacity: 1_024,
            max_in_flight: 16,
            channels: ChannelsConfig::default(),
        }
    }
}

/// Downstream price-feed endpoints kept subscribed to our symbols
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    pub interval_secs: u64,
    pub endpoints: Vec<String>,
    pub coins_path: Option<String>,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_secs: 120,
            endpoints: vec![],
            coins_path: Some("coins.json".to_string()),
        }
    }
}

/// Complete service configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub alerts: AlertConfig,
    pub notifier: NotifierConfig,
    pub poller: PollerConfig,
}

impl AppConfig {
    /// Load from an optional TOML file overlaid with `PRICEWATCH__*` variables
    pub fn load(path: &str) -> CoreResult<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        let mut cfg = Self::build(builder)?;
        cfg.alerts
            .apply_legacy_overrides(|key| std::env::var(key).ok())?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn build(builder: ConfigBuilder<DefaultState>) -> CoreResult<Self> {
        builder
            .build()
            .and_then(|settings| settings.try_deserialize())
            .map_err(|e| CoreError::InvalidConfig(e.to_string()))
    }

    pub fn validate(&self) -> CoreResult<()> {
        self.alerts.validate()?;

        if self.notifier.queue_capacity == 0 || self.notifier.max_in_flight == 0 {
            return Err(CoreError::InvalidConfig(
                "notifier queue_capacity and max_in_flight must be positive".into(),
            ));
        }
        if self.notifier.max_in_flight > MAX_IN_FLIGHT {
            return Err(CoreError::InvalidConfig(format!(
                "notifier max_in_flight {} exceeds {}",
                self.notifier.max_in_flight, MAX_IN_FLIGHT
            )));
        }
        if self.notifier.timeout_ms == 0 {
            return Err(CoreError::InvalidConfig("notifier timeout_ms must be positive".into()));
        }
        if self.poller.interval_secs == 0 {
            return Err(CoreError::InvalidConfig("poller interval_secs must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn from_toml(raw: &str) -> CoreResult<AppConfig> {
        AppConfig::build(
            config::Config::builder()
                .add_source(config::File::from_str(raw, config::FileFormat::Toml)),
        )
    }

    #[test]
    fn test_default_config_is_valid() {
        let cfg = AppConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.server.port, 8000);
        assert_eq!(cfg.alerts.windows.len(), 9);
        assert_eq!(cfg.alerts.level_tolerance, dec!(0.015));
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::seconds(30));
        assert_eq!(parse_duration("5m").unwrap(), Duration::minutes(5));
        assert_eq!(parse_duration(" 4H ").unwrap(), Duration::hours(4));
        assert_eq!(parse_duration("30d").unwrap(), Duration::days(30));
        assert!(parse_duration("0m").is_err());
        assert!(parse_duration("m").is_err());
        assert!(parse_duration("5y").is_err());
    }

    #[test]
    fn test_windows_from_toml() {
        let cfg = from_toml(
            r#"
            [alerts]
            level_tolerance = 0.02

            [[alerts.windows]]
            duration = "5m"
            threshold = 0.1

            [[alerts.windows]]
            label = "day"
            duration = "24h"
            threshold = 5
            "#,
        )
        .unwrap();

        assert_eq!(cfg.alerts.windows.len(), 2);
        assert_eq!(cfg.alerts.windows[0].label, "5m");
        assert_eq!(cfg.alerts.windows[0].threshold, dec!(0.1));
        assert_eq!(cfg.alerts.windows[1].label, "day");
        assert_eq!(cfg.alerts.windows[1].duration, Duration::hours(24));
        assert_eq!(cfg.alerts.level_tolerance, dec!(0.02));
        // untouched sections keep their defaults
        assert_eq!(cfg.poller.interval_secs, 120);
    }

    #[test]
    fn test_sinks_from_toml() {
        let cfg = from_toml(
            r#"
            [notifier.channels.all]
            kind = "webhook"
            url = "https://hooks.example/all"

            [notifier.channels.levels]
            kind = "log"
            "#,
        )
        .unwrap();

        let channels = &cfg.notifier.channels;
        assert_eq!(
            channels.get(Channel::All),
            Some(&SinkConfig::Webhook {
                url: "https://hooks.example/all".into()
            })
        );
        assert_eq!(channels.get(Channel::Levels), Some(&SinkConfig::Log));
        assert_eq!(channels.get(Channel::Critical), None);
    }

    #[test]
    fn test_legacy_threshold_override() {
        let mut alerts = AlertConfig::default();
        alerts
            .apply_legacy_overrides(|key| match key {
                "MINIMUM_PRICE_CHANGE_TO_ALERT_5M" => Some("0.25".into()),
                "MINIMUM_PRICE_CHANGE_TO_ALERT_7D" => Some("12".into()),
                _ => None,
            })
            .unwrap();

        assert_eq!(alerts.windows[0].threshold, dec!(0.25));
        assert_eq!(alerts.windows[7].label, "7d");
        assert_eq!(alerts.windows[7].threshold, dec!(12));
        assert_eq!(alerts.windows[1].threshold, dec!(0.5));
    }

    #[test]
    fn test_legacy_override_rejects_garbage() {
        let mut alerts = AlertConfig::default();
        let err = alerts
            .apply_legacy_overrides(|_| Some("lots".into()))
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidConfig(_)));
    }

    #[test]
    fn test_validation_rejects_duplicates_and_bad_tolerance() {
        let mut alerts = AlertConfig::default();
        alerts.windows.push(Window::new("5m", Duration::minutes(5), dec!(1)));
        assert!(alerts.validate().is_err());

        let mut alerts = AlertConfig::default();
        alerts.level_tolerance = dec!(1.5);
        assert!(alerts.validate().is_err());

        let mut alerts = AlertConfig::default();
        alerts.windows[0].threshold = dec!(-1);
        assert!(alerts.validate().is_err());
    }

    #[test]
    fn test_max_in_flight_is_bounded() {
        let err = from_toml("[notifier]\nmax_in_flight = 4294967296")
            .unwrap()
            .validate()
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidConfig(_)));

        let mut cfg = AppConfig::default();
        cfg.notifier.max_in_flight = MAX_IN_FLIGHT;
        cfg.validate().unwrap();
        cfg.notifier.max_in_flight = MAX_IN_FLIGHT + 1;
        assert!(cfg.validate().is_err());
        cfg.notifier.max_in_flight = 0;
        assert!(cfg.validate().is_err());
    }
}
