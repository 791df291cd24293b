//! FastSub - distributed publish/subscribe broker over UDP
//!
//! Clients subscribe to topics and publish messages with single datagrams.
//! Several broker nodes form a cluster by replicating their subscription
//! registries over a small TCP sync protocol, so any node can deliver any
//! publication directly to every subscriber.

pub mod broker;
pub mod cluster;
pub mod config;
pub mod metrics;
pub mod protocol;
pub mod registry;

pub use broker::{Broker, BrokerConfig, BrokerState, Replication};
pub use cluster::{ClusterConfig, SyncError, SyncService};
pub use config::Config;
pub use metrics::{Metrics, MetricsServer};
pub use protocol::{Command, ParseError};
pub use registry::{Snapshot, SubscriptionRegistry};
