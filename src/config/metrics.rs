//! Metrics endpoint configuration

use std::net::SocketAddr;

use serde::Deserialize;

/// Default port of the metrics HTTP endpoint
pub const DEFAULT_METRICS_PORT: u16 = 9090;

/// Metrics configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Serve Prometheus metrics over HTTP
    pub enabled: bool,
    /// HTTP bind address for `/metrics`, `/health` and `/ready`
    pub bind: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind: SocketAddr::from(([0, 0, 0, 0], DEFAULT_METRICS_PORT)),
        }
    }
}
