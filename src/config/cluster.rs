//! Cluster Configuration
//!
//! Static cluster membership and sync settings.

use std::net::SocketAddr;
use std::time::Duration;

use serde::Deserialize;

/// Default TCP port for the cluster sync protocol
pub const DEFAULT_SYNC_PORT: u16 = 15000;

/// Cluster configuration. Immutable once the broker has started.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Whether clustering is enabled
    pub enabled: bool,

    /// Address the sync listener binds to
    /// Default: 0.0.0.0:15000
    #[serde(default = "default_sync_bind")]
    pub sync_bind: SocketAddr,

    /// Sync addresses of all cluster nodes, this one included
    /// Format: "host:port"
    #[serde(default)]
    pub nodes: Vec<String>,

    /// Upper bound for opening an outbound sync connection
    /// Default: 2s
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Upper bound for reading a sync request or snapshot
    /// Default: 5s
    #[serde(default = "default_read_timeout", with = "humantime_serde")]
    pub read_timeout: Duration,
}

fn default_sync_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], DEFAULT_SYNC_PORT))
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(2)
}

fn default_read_timeout() -> Duration {
    Duration::from_secs(5)
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            sync_bind: default_sync_bind(),
            nodes: Vec::new(),
            connect_timeout: default_connect_timeout(),
            read_timeout: default_read_timeout(),
        }
    }
}

impl ClusterConfig {
    /// Name used in logs, from the host name
    pub fn node_name(&self) -> String {
        let host = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "localhost".to_string());
        format!("{}:{}", host, self.sync_bind.port())
    }

    /// Check that every node entry has the `host:port` form
    pub fn validate_nodes(&self) -> Result<(), String> {
        for node in &self.nodes {
            let valid = node
                .rsplit_once(':')
                .map(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok())
                .unwrap_or(false);
            if !valid {
                return Err(format!("cluster node '{}' is not in host:port form", node));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::field_reassign_with_default)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClusterConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.sync_bind, "0.0.0.0:15000".parse().unwrap());
        assert!(config.nodes.is_empty());
        assert_eq!(config.connect_timeout, Duration::from_secs(2));
        assert_eq!(config.read_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_node_name_includes_port() {
        let mut config = ClusterConfig::default();
        config.sync_bind = "0.0.0.0:15123".parse().unwrap();
        assert!(config.node_name().ends_with(":15123"));
    }

    #[test]
    fn test_validate_nodes() {
        let mut config = ClusterConfig::default();
        config.nodes = vec![
            "10.0.0.1:15000".to_string(),
            "node2.internal:15000".to_string(),
            "[::1]:15000".to_string(),
        ];
        assert!(config.validate_nodes().is_ok());

        config.nodes.push("missing-port".to_string());
        assert!(config.validate_nodes().is_err());

        config.nodes = vec![":15000".to_string()];
        assert!(config.validate_nodes().is_err());

        config.nodes = vec!["host:notaport".to_string()];
        assert!(config.validate_nodes().is_err());
    }
}
