//! Price movement detection
//!
//! Features:
//! - Percent change against the observation nearest each window
//! - Window-local ATH/ATL classification
//! - Static price level proximity

pub mod window;
pub mod levels;
pub mod scanner;

pub use window::{extremes, percent_change, Evaluation, WindowEvaluator, WindowOutcome};
pub use levels::{LevelWatcher, DEFAULT_TOLERANCE};
pub use scanner::{PriceScanner, ScanReport};
