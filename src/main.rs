//! FastSub - distributed UDP publish/subscribe broker
//!
//! Usage:
//!   fastsub [OPTIONS]
//!
//! Options:
//!   -c, --config <FILE>      Configuration file path
//!   -b, --bind <ADDR>        UDP bind address (default: 0.0.0.0:10000)
//!   --sync-bind <ADDR>       Cluster sync bind address (default: 0.0.0.0:15000)
//!   --node <HOST:PORT>       Cluster node, repeatable (implies --cluster)
//!   --cluster                Enable clustering
//!   -l, --log-level          Log level (error, warn, info, debug, trace)
//!   -h, --help               Print help

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use fastsub::broker::Broker;
use fastsub::cluster::SyncService;
use fastsub::config::Config;
use fastsub::registry::SubscriptionRegistry;
use fastsub::{Metrics, MetricsServer};

/// Log level for CLI
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum LogLevel {
    /// Only errors
    Error,
    /// Warnings and errors
    Warn,
    /// Informational messages
    #[default]
    Info,
    /// Debug messages
    Debug,
    /// Trace messages (very verbose)
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Level {
        match self {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }

    fn from_config(level: &str) -> Self {
        match level.to_lowercase().as_str() {
            "error" => LogLevel::Error,
            "warn" => LogLevel::Warn,
            "debug" => LogLevel::Debug,
            "trace" => LogLevel::Trace,
            _ => LogLevel::Info,
        }
    }
}

/// FastSub - distributed UDP pub/sub broker
#[derive(Parser, Debug)]
#[command(name = "fastsub")]
#[command(version)]
#[command(about = "Distributed publish/subscribe broker over UDP")]
struct Args {
    /// Configuration file path (TOML format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// UDP bind address
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// TCP bind address of the cluster sync listener
    #[arg(long)]
    sync_bind: Option<SocketAddr>,

    /// Cluster node sync address (host:port), repeat for every node
    #[arg(long = "node", value_name = "HOST:PORT")]
    nodes: Vec<String>,

    /// Enable clustering
    #[arg(long)]
    cluster: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, value_enum)]
    log_level: Option<LogLevel>,
}

impl Args {
    /// Apply CLI overrides on top of the loaded configuration
    fn apply(&self, config: &mut Config) {
        if let Some(bind) = self.bind {
            config.server.bind = bind;
        }
        if let Some(sync_bind) = self.sync_bind {
            config.cluster.sync_bind = sync_bind;
        }
        if !self.nodes.is_empty() {
            config.cluster.nodes = self.nodes.clone();
            config.cluster.enabled = true;
        }
        if self.cluster {
            config.cluster.enabled = true;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load configuration file if specified, otherwise defaults plus env overrides
    let loaded = match &args.config {
        Some(config_path) => Config::load(config_path),
        None => Config::from_env(),
    };
    let mut config = match loaded {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            std::process::exit(1);
        }
    };

    args.apply(&mut config);
    if let Err(e) = config.validate() {
        eprintln!("Invalid configuration: {}", e);
        std::process::exit(1);
    }

    // Setup logging - CLI overrides config, config overrides default (info)
    let log_level = args
        .log_level
        .unwrap_or_else(|| LogLevel::from_config(&config.log.level));

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level.to_tracing_level())
        .with_target(false)
        .with_thread_ids(true)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    if let Some(path) = &args.config {
        info!("Loaded configuration from {:?}", path);
    }

    let broker_config = config.to_broker_config();

    info!("Starting FastSub broker");
    info!("  Bind address: udp://{}", broker_config.bind_addr);
    info!(
        "  Max datagram size: {} bytes",
        broker_config.max_datagram_size
    );

    let registry = Arc::new(SubscriptionRegistry::new());
    let mut broker = Broker::with_registry(broker_config, registry.clone());

    let metrics = if config.metrics.enabled {
        let metrics = Arc::new(Metrics::new());
        broker.set_metrics(metrics.clone());
        info!("  Metrics: enabled (http://{})", config.metrics.bind);

        // Spawn metrics server
        let metrics_server = MetricsServer::new(metrics.clone(), config.metrics.bind);
        tokio::spawn(async move {
            if let Err(e) = metrics_server.run().await {
                error!("Metrics server error: {}", e);
            }
        });
        Some(metrics)
    } else {
        info!("  Metrics: disabled");
        None
    };

    // Setup clustering if configured
    if config.cluster.enabled {
        let cluster = config.cluster.clone();
        info!(
            "  Cluster: enabled as {} (sync=tcp://{})",
            cluster.node_name(),
            cluster.sync_bind
        );
        info!("    Nodes: {}", cluster.nodes.join(", "));

        let mut sync = SyncService::new(cluster, registry);
        if let Some(metrics) = metrics {
            sync.set_metrics(metrics);
        }
        broker.set_replication(Arc::new(sync));
    } else {
        info!("  Cluster: disabled");
    }

    let broker = Arc::new(broker);

    let signal_broker = broker.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown requested");
                signal_broker.shutdown();
            }
            Err(e) => error!("Cannot listen for shutdown signal: {}", e),
        }
    });

    broker.run().await?;

    info!("Broker stopped");
    Ok(())
}
