//! HTTP server for the gateway.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::{any, get};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};
use crate::metrics::MetricsRegistry;
use crate::proxy::handler::{self, GatewayState};
use crate::proxy::routes::RouteTable;
use crate::ratelimit::RateBudgetStore;

/// HTTP front of the gateway.
pub struct GatewayServer {
    /// Address to bind to
    addr: SocketAddr,
    /// Compiled router serving the declared routes
    router: Router,
}

impl GatewayServer {
    /// Compile a configuration into a ready-to-bind server.
    ///
    /// Builds the rate budget store, the metrics registry (when enabled),
    /// the route table, and the router. Every configuration problem
    /// surfaces here, before the listener opens.
    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        config.validate()?;
        let addr = config.bind_addr()?;

        let store = Arc::new(RateBudgetStore::new(config.store_capacity));
        let metrics = config.metrics.then(MetricsRegistry::new);
        let table = Arc::new(RouteTable::build(config, store, metrics.as_ref())?);

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.upstream_timeout_secs))
            .build()?;

        let state = GatewayState {
            table: Arc::clone(&table),
            client,
            metrics,
        };

        let mut router = Router::new();
        for path in table.paths() {
            router = router.route(path, any(handler::forward));
        }
        if state.metrics.is_some() {
            router = router.route("/metrics", get(handler::scrape));
        }
        let router = router
            .with_state(state)
            .layer(TraceLayer::new_for_http());

        Ok(Self { addr, router })
    }

    /// The compiled router, for driving the gateway without a listener.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Start the server.
    ///
    /// This method blocks until the server is shut down.
    pub async fn serve(self) -> Result<()> {
        let listener = TcpListener::bind(self.addr).await?;
        info!(addr = %self.addr, "gateway listening");

        axum::serve(listener, self.router).await.map_err(|e| {
            error!(error = %e, "gateway server failed");
            GatewayError::Io(e)
        })
    }

    /// Start the server with graceful shutdown.
    ///
    /// The server shuts down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.addr).await?;
        info!(addr = %self.addr, "gateway listening");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(signal)
            .await
            .map_err(|e| {
                error!(error = %e, "gateway server failed");
                GatewayError::Io(e)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RouteConfig;

    fn config(metrics: bool) -> GatewayConfig {
        GatewayConfig {
            routes: vec![RouteConfig {
                frontend: "/a".to_string(),
                backend: "http://127.0.0.1:9000/".to_string(),
                reqs_per_sec: 2,
                burst: 1,
                label: "a".to_string(),
            }],
            metrics,
            ..GatewayConfig::default()
        }
    }

    #[test]
    fn test_server_creation() {
        let server = GatewayServer::from_config(&config(false)).unwrap();
        assert_eq!(server.addr.to_string(), "127.0.0.1:8080");
    }

    #[test]
    fn test_server_creation_with_metrics() {
        assert!(GatewayServer::from_config(&config(true)).is_ok());
    }

    #[test]
    fn test_zero_rate_route_refuses_to_start() {
        let mut config = config(false);
        config.routes[0].reqs_per_sec = 0;

        assert!(GatewayServer::from_config(&config).is_err());
    }
}
