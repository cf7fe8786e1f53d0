//! SQLite history persistence
//!
//! Accepted observations are queued to a blocking writer so ingestion never
//! waits on disk.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension};
use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use pricewatch_core::{format_timestamp, parse_timestamp, PriceObservation};

use crate::series::PriceSeries;

/// Persistence errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid legacy history: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Corrupt row for {symbol}: {reason}")]
    Corrupt { symbol: String, reason: String },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Durable, per-symbol ordered history
pub trait HistoryStore: Send {
    /// Every stored series, observations ordered by timestamp
    fn load_all(&self) -> StoreResult<Vec<PriceSeries>>;

    fn append(
        &mut self,
        symbol: &str,
        currency: &str,
        observation: &PriceObservation,
    ) -> StoreResult<()>;
}

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS tokens (
        id          INTEGER PRIMARY KEY,
        symbol      TEXT NOT NULL UNIQUE,
        currency    TEXT NOT NULL DEFAULT 'USD'
    );

    CREATE TABLE IF NOT EXISTS token_prices (
        id          INTEGER PRIMARY KEY,
        token_id    INTEGER NOT NULL REFERENCES tokens(id),
        price       TEXT NOT NULL,
        datetime    TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_token_prices_token
        ON token_prices(token_id, datetime)";

pub struct SqliteStore {
    conn: Connection,
    token_ids: HashMap<String, i64>,
}

impl SqliteStore {
    /// Opens (or creates) the history database. A freshly created database
    /// is seeded from the legacy JSON history at `migrate_from`, if present.
    pub fn open(path: &str, migrate_from: Option<&str>) -> StoreResult<Self> {
        let existed = Path::new(path).exists();
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut store = Self::init(Connection::open(path)?)?;
        info!("SQLite history DB opened at {path}");

        if !existed {
            if let Some(legacy) = migrate_from.filter(|p| Path::new(p).exists()) {
                info!("Starting to migrate {legacy} into {path}");
                let start = std::time::Instant::now();
                let migrated = store.migrate_json(legacy)?;
                info!(
                    "Migration completed: {migrated} observations in {:?}",
                    start.elapsed()
                );
            }
        }
        Ok(store)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn,
            token_ids: HashMap::new(),
        })
    }

    fn token_id(&mut self, symbol: &str, currency: &str) -> StoreResult<i64> {
        if let Some(id) = self.token_ids.get(symbol) {
            return Ok(*id);
        }
        let id = upsert_token(&self.conn, symbol, currency)?;
        self.token_ids.insert(symbol.to_string(), id);
        Ok(id)
    }

    /// Import `[{symbol, currency, price_history: [{price, datetime}]}]`.
    /// Older files name the timestamp field `timestamp`.
    pub fn migrate_json(&mut self, path: &str) -> StoreResult<usize> {
        let raw = std::fs::read_to_string(path)?;
        let tokens: Vec<LegacyToken> = serde_json::from_str(&raw)?;

        let tx = self.conn.transaction()?;
        let mut migrated = 0;
        for token in &tokens {
            let currency = token.currency.as_deref().unwrap_or("USD");
            let id = upsert_token(&tx, &token.symbol, currency)?;
            for entry in &token.price_history {
                let ts = parse_timestamp(&entry.datetime).map_err(|e| StoreError::Corrupt {
                    symbol: token.symbol.clone(),
                    reason: e.to_string(),
                })?;
                tx.execute(
                    "INSERT INTO token_prices (token_id, price, datetime) VALUES (?1, ?2, ?3)",
                    rusqlite::params![id, entry.price.to_string(), format_timestamp(&ts)],
                )?;
                migrated += 1;
            }
        }
        tx.commit()?;
        self.token_ids.clear();
        Ok(migrated)
    }
}

/// Databases created by older versions have no UNIQUE constraint on
/// `tokens.symbol`, so look up before inserting
fn upsert_token(conn: &Connection, symbol: &str, currency: &str) -> StoreResult<i64> {
    let existing = conn
        .query_row(
            "SELECT id FROM tokens WHERE symbol = ?1 ORDER BY id LIMIT 1",
            rusqlite::params![symbol],
            |row| row.get(0),
        )
        .optional()?;
    if let Some(id) = existing {
        return Ok(id);
    }

    conn.execute(
        "INSERT INTO tokens (symbol, currency) VALUES (?1, ?2)",
        rusqlite::params![symbol, currency],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Prices are written as text; databases from older versions stored floats
fn decode_price(symbol: &str, value: Value) -> StoreResult<Decimal> {
    let corrupt = |reason: String| StoreError::Corrupt {
        symbol: symbol.to_string(),
        reason,
    };
    match value {
        Value::Text(s) => Decimal::from_str(&s).map_err(|e| corrupt(format!("price {s:?}: {e}"))),
        Value::Real(f) => Decimal::try_from(f).map_err(|e| corrupt(format!("price {f}: {e}"))),
        Value::Integer(i) => Ok(Decimal::from(i)),
        other => Err(corrupt(format!("unexpected price value {other:?}"))),
    }
}

impl HistoryStore for SqliteStore {
    fn load_all(&self) -> StoreResult<Vec<PriceSeries>> {
        let mut stmt = self.conn.prepare(
            "SELECT t.symbol, t.currency, p.price, p.datetime
             FROM tokens t
             LEFT JOIN token_prices p ON p.token_id = t.id
             ORDER BY t.id, p.datetime, p.id",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Value>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut series: Vec<(String, String, Vec<PriceObservation>)> = Vec::new();
        for (symbol, currency, price, datetime) in rows {
            if series.last().map(|(s, _, _)| s != &symbol).unwrap_or(true) {
                series.push((symbol.clone(), currency, Vec::new()));
            }
            // LEFT JOIN yields a NULL row for tokens without prices
            let Some(datetime) = datetime else { continue };

            let price = decode_price(&symbol, price)?;
            let timestamp = parse_timestamp(&datetime).map_err(|e| StoreError::Corrupt {
                symbol: symbol.clone(),
                reason: e.to_string(),
            })?;
            if let Some((_, _, observations)) = series.last_mut() {
                observations.push(PriceObservation::new(price, timestamp));
            }
        }

        Ok(series
            .into_iter()
            .map(|(symbol, currency, observations)| {
                PriceSeries::with_history(symbol, currency, observations)
            })
            .collect())
    }

    fn append(
        &mut self,
        symbol: &str,
        currency: &str,
        observation: &PriceObservation,
    ) -> StoreResult<()> {
        let id = self.token_id(symbol, currency)?;
        self.conn.execute(
            "INSERT INTO token_prices (token_id, price, datetime) VALUES (?1, ?2, ?3)",
            rusqlite::params![
                id,
                observation.price.to_string(),
                format_timestamp(&observation.timestamp)
            ],
        )?;
        Ok(())
    }
}

#[derive(Deserialize)]
struct LegacyToken {
    symbol: String,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    price_history: Vec<LegacyEntry>,
}

#[derive(Deserialize)]
struct LegacyEntry {
    price: Decimal,
    #[serde(alias = "timestamp")]
    datetime: String,
}

/// An accepted observation waiting to be written
#[derive(Debug, Clone)]
struct PersistRequest {
    symbol: String,
    currency: String,
    observation: PriceObservation,
}

/// Cheap handle for queueing writes to the persistence task
#[derive(Debug, Clone)]
pub struct PersistHandle {
    tx: mpsc::UnboundedSender<PersistRequest>,
}

impl PersistHandle {
    /// Queue an observation. Never blocks.
    pub fn persist(&self, symbol: &str, currency: &str, observation: PriceObservation) {
        let request = PersistRequest {
            symbol: symbol.to_string(),
            currency: currency.to_string(),
            observation,
        };
        if self.tx.send(request).is_err() {
            warn!("Persistence writer stopped, observation for {symbol} not stored");
        }
    }
}

/// Start the blocking writer. It exits once every handle has been dropped.
pub fn spawn_writer<S>(store: S) -> (PersistHandle, JoinHandle<()>)
where
    S: HistoryStore + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<PersistRequest>();

    let handle = tokio::task::spawn_blocking(move || {
        let mut store = store;
        let mut written = 0u64;
        while let Some(req) = rx.blocking_recv() {
            match store.append(&req.symbol, &req.currency, &req.observation) {
                Ok(()) => written += 1,
                Err(e) => error!("Failed to persist {} observation: {}", req.symbol, e),
            }
        }
        info!("Persistence writer stopped after {written} writes");
    });

    (PersistHandle { tx }, handle)
}
