//! Cluster Module
//!
//! Replicates subscriptions across a static list of FastSub nodes.
//!
//! # Architecture
//!
//! Every node runs a TCP sync listener next to its UDP broker socket:
//! - **Bootstrap pull**: on startup, fetch a full snapshot from one peer
//! - **Push-on-write**: every local `SUB` is sent to all other peers
//!
//! Publications are never forwarded. Subscribers are addressed directly by
//! whichever node receives the `PUB`.
//!
//! # Usage
//!
//! ```toml
//! # fastsub.toml
//! [cluster]
//! enabled = true
//! sync_bind = "0.0.0.0:15000"
//! nodes = ["node1:15000", "node2:15000", "node3:15000"]
//! ```

mod error;
mod locality;
mod protocol;
mod service;
mod transport;

pub use error::SyncError;
pub use locality::{is_local_address, HostInterfaces, Locality};
pub use protocol::{encode_push, SyncCommand, PULL_REQUEST};
pub use service::{resolve_node, InboundHandler, SyncService};
pub use transport::{Connector, SyncStream, TcpConnector};

// Re-export cluster config
pub use crate::config::ClusterConfig;
