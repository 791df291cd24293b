//! Replication capability
//!
//! A broker optionally carries a replication strategy. The plain broker has
//! none installed; the clustered broker installs the cluster sync service.

use async_trait::async_trait;
use tokio::sync::broadcast;

/// Hooks the broker calls to keep subscription state replicated
#[async_trait]
pub trait Replication: Send + Sync {
    /// Fetch existing cluster state into the local registry.
    ///
    /// Runs once, after the broker socket is bound and before the first
    /// datagram is read. Failures are logged, never returned.
    async fn bootstrap(&self);

    /// Start background tasks (e.g. an inbound sync listener).
    ///
    /// An error here is fatal for the broker.
    async fn start(&self, _shutdown: broadcast::Receiver<()>) -> std::io::Result<()> {
        Ok(())
    }

    /// Called after a local `SUB` was applied to the registry
    async fn on_subscribe(&self, topic: &str, subscriber: &str);
}
