//! HTTP ingestion and alerting service
//!
//! Accepts pushed price observations, runs window and level detection and
//! hands alerts to the dispatcher.

pub mod conversions;
pub mod service;
pub mod routes;
pub mod server;

pub use conversions::{Ingest, IngestRequest, IngestResponse};
pub use server::{HttpServer, HttpServerBuilder};
pub use service::{AlertService, HealthStatus, IngestOutcome};
