//! Error types

use std::fmt;

use thiserror::Error;

/// Core error types
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Invalid timestamp {value:?}, expected YYYY-MM-DD HH:MM:SS")]
    InvalidTimestamp { value: String },

    #[error("Invalid duration {0:?}, expected e.g. 30s, 5m, 1h, 7d")]
    InvalidDuration(String),
}

/// Notification delivery errors
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Channel responded with status {code}")]
    Status { code: u16 },

    #[error("Delivery timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Dispatch queue full")]
    QueueFull,

    #[error("Dispatch queue closed")]
    QueueClosed,
}

/// Why a window evaluation produced nothing. Not an error: callers skip silently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No observation older than the one just appended
    EmptyHistory,
    /// Historical price is zero, percent change is undefined
    DegenerateComparison,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::EmptyHistory => write!(f, "no prior observation"),
            SkipReason::DegenerateComparison => write!(f, "historical price is zero"),
        }
    }
}

/// Result type alias
pub type CoreResult<T> = Result<T, CoreError>;
pub type NotifyResult<T> = Result<T, NotifyError>;
