//! HTTP server configuration and startup

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tracing::info;

use pricewatch_core::ServerConfig;

use crate::routes;
use crate::service::AlertService;

/// HTTP server wrapper
pub struct HttpServer {
    config: ServerConfig,
    service: Arc<AlertService>,
}

impl HttpServer {
    pub fn new(config: ServerConfig, service: AlertService) -> Self {
        Self {
            config,
            service: Arc::new(service),
        }
    }

    pub fn service(&self) -> &Arc<AlertService> {
        &self.service
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/addTokenPrice", post(routes::add_token_price))
            .route("/health", get(routes::health))
            .with_state(Arc::clone(&self.service))
    }

    /// Serve until `shutdown` resolves, then finish in-flight requests
    pub async fn start_with_shutdown(
        &self,
        shutdown: tokio::sync::oneshot::Receiver<()>,
    ) -> anyhow::Result<()> {
        let addr: SocketAddr = self.address().parse()?;
        let listener = tokio::net::TcpListener::bind(addr).await?;

        info!("Starting HTTP server on {} (with graceful shutdown)", addr);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(async {
                shutdown.await.ok();
                info!("Shutdown signal received");
            })
            .await?;

        Ok(())
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }
}

/// Builder for server configuration
pub struct HttpServerBuilder {
    config: ServerConfig,
}

impl HttpServerBuilder {
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
        }
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn build(self, service: AlertService) -> HttpServer {
        HttpServer::new(self.config, service)
    }
}

impl Default for HttpServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
