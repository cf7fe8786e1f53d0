//! Client for a downstream price-feed service
//!
//! The feed service polls exchanges for every token it has been told about
//! and posts the results back to our ingestion endpoint.

use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
use tracing::debug;

/// Token as reported by `GET /getTokens`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FeedToken {
    pub symbol: String,
}

/// One downstream feed service
#[derive(Debug, Clone)]
pub struct FeedEndpoint {
    base_url: String,
    http: reqwest::Client,
}

impl FeedEndpoint {
    pub fn new(base_url: impl Into<String>, http: reqwest::Client) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url, http }
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building feed HTTP client")?;
        Ok(Self::new(base_url, http))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Symbols the feed currently tracks
    pub async fn list_tokens(&self) -> anyhow::Result<Vec<String>> {
        let tokens: Vec<FeedToken> = self
            .http
            .get(self.url("getTokens"))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .with_context(|| format!("decoding token list from {}", self.base_url))?;
        Ok(tokens.into_iter().map(|t| t.symbol).collect())
    }

    pub async fn add_token(&self, symbol: &str) -> anyhow::Result<()> {
        self.http
            .put(self.url(&format!("putToken/{symbol}")))
            .send()
            .await?
            .error_for_status()
            .with_context(|| format!("adding {symbol} to {}", self.base_url))?;
        debug!("Pushed {} to {}", symbol, self.base_url);
        Ok(())
    }

    pub async fn remove_token(&self, symbol: &str) -> anyhow::Result<()> {
        self.http
            .delete(self.url(&format!("deleteToken/{symbol}")))
            .send()
            .await?
            .error_for_status()
            .with_context(|| format!("removing {symbol} from {}", self.base_url))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls_ignore_trailing_slash() {
        let endpoint = FeedEndpoint::new("http://localhost:8010/", reqwest::Client::new());
        assert_eq!(endpoint.base_url(), "http://localhost:8010");
        assert_eq!(endpoint.url("getTokens"), "http://localhost:8010/getTokens");
    }

    #[test]
    fn test_token_list_decodes() {
        let tokens: Vec<FeedToken> =
            serde_json::from_str(r#"[{"symbol": "BTC"}, {"symbol": "LINA", "extra": 1}]"#)
                .unwrap();
        assert_eq!(tokens[1].symbol, "LINA");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_errors() {
        let endpoint =
            FeedEndpoint::with_timeout("http://127.0.0.1:9", Duration::from_millis(200)).unwrap();
        assert!(endpoint.add_token("BTC").await.is_err());
    }
}
