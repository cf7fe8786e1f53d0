//! Price history storage and the downstream feed glue
//!
//! Features:
//! - Per-symbol ordered history with duplicate suppression
//! - Concurrent symbol registry with per-series locking
//! - SQLite persistence behind a non-blocking writer
//! - Periodic symbol push to downstream price-feed endpoints

pub mod series;
pub mod registry;
pub mod store;
pub mod feeds;
pub mod poller;

pub use series::PriceSeries;
pub use registry::{Registry, RegistryStats, SharedSeries};
pub use store::{spawn_writer, HistoryStore, PersistHandle, SqliteStore, StoreError, StoreResult};
pub use feeds::{FeedEndpoint, FeedToken};
pub use poller::{load_coins, PollStats, SymbolPoller};
