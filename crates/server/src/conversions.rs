//! Ingestion payload validation

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use pricewatch_core::{parse_timestamp, CoreError, CoreResult, PriceObservation};

/// Body of `POST /addTokenPrice`. Every field is optional here so missing
/// fields are reported as malformed input rather than a generic decode error.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IngestRequest {
    #[serde(default, alias = "coin_name")]
    pub symbol: Option<String>,
    #[serde(default, alias = "current_price")]
    pub price: Option<Value>,
    #[serde(default, alias = "current_time")]
    pub timestamp: Option<String>,
}

/// A validated observation for one symbol
#[derive(Debug, Clone, PartialEq)]
pub struct Ingest {
    pub symbol: String,
    pub observation: PriceObservation,
}

fn malformed(msg: impl Into<String>) -> CoreError {
    CoreError::MalformedInput(msg.into())
}

/// Accepts JSON numbers and numeric strings, including exponent notation
pub fn parse_price(value: &Value) -> CoreResult<Decimal> {
    let raw = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        other => return Err(malformed(format!("price must be a number, got {other}"))),
    };

    let price = Decimal::from_str(&raw)
        .or_else(|_| Decimal::from_scientific(&raw))
        .map_err(|_| malformed(format!("price {raw:?} is not a finite number")))?;

    if price.is_sign_negative() && !price.is_zero() {
        return Err(malformed(format!("price {price} is negative")));
    }
    Ok(price)
}

impl TryFrom<IngestRequest> for Ingest {
    type Error = CoreError;

    fn try_from(req: IngestRequest) -> CoreResult<Self> {
        let symbol = req
            .symbol
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| malformed("symbol is required"))?;

        let price = req
            .price
            .as_ref()
            .ok_or_else(|| malformed("price is required"))
            .and_then(parse_price)?;

        let raw_ts = req
            .timestamp
            .ok_or_else(|| malformed("timestamp is required"))?;
        let timestamp =
            parse_timestamp(&raw_ts).map_err(|e| malformed(e.to_string()))?;

        Ok(Ingest {
            symbol,
            observation: PriceObservation::new(price, timestamp),
        })
    }
}

/// Body returned by `POST /addTokenPrice`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestResponse {
    pub response: String,
    pub accepted: bool,
}

impl IngestResponse {
    pub fn ok(accepted: bool) -> Self {
        Self {
            response: "ok".to_string(),
            accepted,
        }
    }
}
