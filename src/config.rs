//! Configuration management for Floodgate.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use tracing::info;

use crate::error::{GatewayError, Result};

/// Main configuration for the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Declared routes, in declaration order
    #[serde(default)]
    pub routes: Vec<RouteConfig>,

    /// Whether to collect per-route metrics and expose `/metrics`
    #[serde(default)]
    pub metrics: bool,

    /// Port the listener binds on the loopback interface
    #[serde(default = "default_port")]
    pub port: String,

    /// Timeout for outbound backend requests, in seconds
    #[serde(default = "default_upstream_timeout_secs", rename = "upstreamTimeoutSecs")]
    pub upstream_timeout_secs: u64,

    /// Capacity of the rate budget store
    #[serde(default = "default_store_capacity", rename = "storeCapacity")]
    pub store_capacity: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            routes: Vec::new(),
            metrics: false,
            port: default_port(),
            upstream_timeout_secs: default_upstream_timeout_secs(),
            store_capacity: default_store_capacity(),
        }
    }
}

fn default_port() -> String {
    "8080".to_string()
}

fn default_upstream_timeout_secs() -> u64 {
    15
}

fn default_store_capacity() -> usize {
    65536
}

/// One frontend-to-backend mapping with its rate budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteConfig {
    /// Path the gateway serves this route on
    pub frontend: String,

    /// Backend URL admitted requests are forwarded to
    pub backend: String,

    /// Sustained request budget, per second
    #[serde(rename = "reqsPerSec")]
    pub reqs_per_sec: u32,

    /// Requests that may run ahead of the sustained rate
    #[serde(default)]
    pub burst: u32,

    /// Name prefix for this route's metric instruments
    #[serde(default)]
    pub label: String,
}

impl GatewayConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading gateway configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| GatewayError::Config(format!("failed to parse gateway config: {}", e)))
    }

    /// Validate the configuration.
    ///
    /// Any failure here refuses to start the process rather than running a
    /// route with a broken or unbounded budget.
    pub fn validate(&self) -> Result<()> {
        self.bind_addr()?;

        for route in &self.routes {
            if !route.frontend.starts_with('/') {
                return Err(GatewayError::Config(format!(
                    "route {}: frontend path must start with '/'",
                    route.frontend
                )));
            }
            if route.reqs_per_sec == 0 {
                return Err(GatewayError::Config(format!(
                    "route {}: reqsPerSec must be greater than zero",
                    route.frontend
                )));
            }
            if self.metrics && route.label.is_empty() {
                return Err(GatewayError::Config(format!(
                    "route {}: label is required when metrics are enabled",
                    route.frontend
                )));
            }
            if self.metrics && route.frontend == "/metrics" {
                return Err(GatewayError::Config(
                    "route /metrics collides with the metrics endpoint".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Listener address: the loopback interface on the configured port.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("127.0.0.1:{}", self.port)
            .parse()
            .map_err(|_| GatewayError::Config(format!("invalid port: {}", self.port)))
    }
}
