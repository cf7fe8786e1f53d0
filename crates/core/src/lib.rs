//! Core types and utilities for the price alerting service
//!
//! This crate provides shared types used across all components:
//! - Price observations and watch levels
//! - Window definitions and alert events
//! - Severity tiers and notification channels
//! - Configuration, errors and the evaluation clock

pub mod types;
pub mod config;
pub mod errors;
pub mod clock;

pub use types::*;
pub use self::config::*;
pub use errors::*;
pub use clock::*;
