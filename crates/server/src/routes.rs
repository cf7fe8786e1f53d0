//! HTTP handlers

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::warn;

use pricewatch_core::CoreError;

use crate::conversions::{Ingest, IngestRequest, IngestResponse};
use crate::service::{AlertService, HealthStatus};

pub type AppState = Arc<AlertService>;

/// Errors surfaced to HTTP callers
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Invalid(#[from] CoreError),

    #[error("Invalid JSON body: {0}")]
    Body(#[from] JsonRejection),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        warn!("Rejected ingestion request: {}", message);
        (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
    }
}

pub async fn add_token_price(
    State(service): State<AppState>,
    payload: Result<Json<IngestRequest>, JsonRejection>,
) -> Result<Json<IngestResponse>, ApiError> {
    let Json(request) = payload?;
    let ingest = Ingest::try_from(request)?;

    let outcome = service.ingest(&ingest.symbol, ingest.observation);
    Ok(Json(IngestResponse::ok(outcome.accepted)))
}

pub async fn health(State(service): State<AppState>) -> Json<HealthStatus> {
    Json(service.health())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pricewatch_core::{default_windows, parse_timestamp, ManualClock, NotifierConfig};
    use pricewatch_detector::{LevelWatcher, PriceScanner, DEFAULT_TOLERANCE};
    use pricewatch_feed::Registry;
    use pricewatch_notifier::{AlertDispatcher, SinkMap};

    fn state() -> AppState {
        let clock = Arc::new(ManualClock::new(
            parse_timestamp("2024-03-01 12:00:00").unwrap() + Duration::seconds(1),
        ));
        let (dispatcher, _worker) = AlertDispatcher::spawn(&NotifierConfig::default(), SinkMap::new());
        Arc::new(AlertService::new(
            Arc::new(Registry::new("USD")),
            PriceScanner::new(default_windows(), LevelWatcher::new(DEFAULT_TOLERANCE)),
            dispatcher,
            clock,
        ))
    }

    fn body(value: serde_json::Value) -> Result<Json<IngestRequest>, JsonRejection> {
        Ok(Json(serde_json::from_value(value).unwrap()))
    }

    #[tokio::test]
    async fn test_add_token_price() {
        let state = state();
        let Json(resp) = add_token_price(
            State(state.clone()),
            body(json!({"symbol": "BTC", "price": 100, "timestamp": "2024-03-01 12:00:00"})),
        )
        .await
        .unwrap();
        assert_eq!(resp, IngestResponse::ok(true));

        let Json(resp) = add_token_price(
            State(state.clone()),
            body(json!({"symbol": "BTC", "current_price": 100, "current_time": "2024-03-01 12:00:01"})),
        )
        .await
        .unwrap();
        assert!(!resp.accepted);

        let Json(health) = health(State(state)).await;
        assert_eq!(health.symbols, 1);
        assert_eq!(health.observations, 1);
    }

    #[tokio::test]
    async fn test_malformed_payload_is_bad_request() {
        let state = state();
        let err = add_token_price(
            State(state.clone()),
            body(json!({"symbol": "BTC", "price": "x", "timestamp": "2024-03-01 12:00:00"})),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Invalid(CoreError::MalformedInput(_))));
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);

        // nothing reached the registry
        assert!(state.registry().is_empty());
    }
}
