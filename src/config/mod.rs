//! Configuration Module
//!
//! Provides TOML-based configuration for FastSub with support for:
//! - Broker socket settings
//! - Cluster membership and sync timeouts
//! - Metrics endpoint
//! - Environment variable overrides (FASTSUB__* prefix)

use std::net::SocketAddr;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use config::{Environment, File, FileFormat};
use regex::Regex;
use serde::Deserialize;

use crate::broker::{BrokerConfig, DEFAULT_RECV_BUFFER_SIZE};
use crate::protocol::{DEFAULT_BROKER_PORT, MAX_DATAGRAM_SIZE};

// Re-export cluster config types
pub use cluster::{ClusterConfig, DEFAULT_SYNC_PORT};

// Re-export metrics config types
pub use metrics::MetricsConfig;

mod cluster;
mod metrics;

/// Largest UDP payload over IPv4
pub const MAX_UDP_PAYLOAD: usize = 65_507;

fn env_var_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$\{([^}:]+)(?::-([^}]*))?\}").expect("env var pattern is valid")
    })
}

/// Substitute environment variables in a string.
/// Supports `${VAR}` and `${VAR:-default}` syntax.
fn substitute_env_vars(content: &str) -> String {
    env_var_pattern()
        .replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            std::env::var(var_name).unwrap_or_else(|_| default.to_string())
        })
        .to_string()
}


/// Configuration error types
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
    /// Config crate error
    Config(config::ConfigError),
    /// Validation error
    Validation(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Config(e) => write!(f, "Config error: {}", e),
            ConfigError::Validation(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

impl From<config::ConfigError> for ConfigError {
    fn from(e: config::ConfigError) -> Self {
        ConfigError::Config(e)
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub log: LogConfig,
    /// Broker socket configuration
    pub server: ServerConfig,
    /// Cluster configuration
    pub cluster: ClusterConfig,
    /// Metrics configuration
    pub metrics: MetricsConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level: error, warn, info, debug, trace
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Broker socket configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// UDP bind address
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
    /// Receive buffer per datagram; longer datagrams are truncated
    #[serde(default = "default_max_datagram_size")]
    pub max_datagram_size: usize,
    /// Socket receive buffer (SO_RCVBUF), 0 keeps the OS default
    #[serde(default = "default_recv_buffer_size")]
    pub recv_buffer_size: usize,
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], DEFAULT_BROKER_PORT))
}
fn default_max_datagram_size() -> usize {
    MAX_DATAGRAM_SIZE
}
fn default_recv_buffer_size() -> usize {
    DEFAULT_RECV_BUFFER_SIZE
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_datagram_size: default_max_datagram_size(),
            recv_buffer_size: default_recv_buffer_size(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file with environment variable overrides.
    ///
    /// Supports two forms of environment variable usage:
    /// 1. In-file substitution: `${VAR}` or `${VAR:-default}` syntax in the TOML file
    /// 2. Override via env vars: `FASTSUB__` prefix with double underscores for nesting:
    ///    - `FASTSUB__SERVER__BIND=0.0.0.0:10001` overrides `server.bind`
    ///    - `FASTSUB__CLUSTER__ENABLED=true` overrides `cluster.enabled`
    ///    - `FASTSUB__CLUSTER__READ_TIMEOUT=10s` overrides `cluster.read_timeout`
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder()
            // Start with defaults
            .set_default("log.level", "info")?
            .set_default("server.bind", default_bind().to_string())?
            .set_default("server.max_datagram_size", MAX_DATAGRAM_SIZE as u64)?
            .set_default("server.recv_buffer_size", DEFAULT_RECV_BUFFER_SIZE as u64)?
            .set_default("cluster.enabled", false)?
            .set_default(
                "cluster.sync_bind",
                SocketAddr::from(([0, 0, 0, 0], DEFAULT_SYNC_PORT)).to_string(),
            )?
            .set_default("cluster.connect_timeout", "2s")?
            .set_default("cluster.read_timeout", "5s")?
            .set_default("metrics.enabled", false)?
            .set_default("metrics.bind", "0.0.0.0:9090")?;

        // Load from file with env var substitution
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let substituted = substitute_env_vars(&content);
                builder = builder.add_source(File::from_str(&substituted, FileFormat::Toml));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // File doesn't exist, use defaults
            }
            Err(e) => return Err(ConfigError::Io(e)),
        }

        // Override with environment variables (FASTSUB__SERVER__BIND, etc.)
        // Double underscore separates nested keys, single underscore preserved in field names
        let cfg = builder
            .add_source(
                Environment::with_prefix("FASTSUB")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("cluster.nodes")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = cfg.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides only (no file).
    ///
    /// Useful for containerized deployments where all config comes from env vars.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(Path::new(""))
    }

    /// Parse configuration from a string (for testing, no env var support)
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.max_datagram_size == 0 || self.server.max_datagram_size > MAX_UDP_PAYLOAD {
            return Err(ConfigError::Validation(format!(
                "server.max_datagram_size must be between 1 and {}",
                MAX_UDP_PAYLOAD
            )));
        }

        if self.cluster.enabled {
            if self.cluster.nodes.is_empty() {
                return Err(ConfigError::Validation(
                    "cluster.nodes must list at least one node when clustering is enabled"
                        .to_string(),
                ));
            }
            self.cluster
                .validate_nodes()
                .map_err(ConfigError::Validation)?;
        }

        if self.cluster.connect_timeout == Duration::ZERO {
            return Err(ConfigError::Validation(
                "cluster.connect_timeout must be greater than zero".to_string(),
            ));
        }
        if self.cluster.read_timeout == Duration::ZERO {
            return Err(ConfigError::Validation(
                "cluster.read_timeout must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Broker settings derived from the `[server]` section
    pub fn to_broker_config(&self) -> BrokerConfig {
        BrokerConfig {
            bind_addr: self.server.bind,
            max_datagram_size: self.server.max_datagram_size,
            recv_buffer_size: match self.server.recv_buffer_size {
                0 => None,
                size => Some(size),
            },
        }
    }
}
