//! Datagram dispatch
//!
//! Each received datagram is handled as an independent unit of work: parse,
//! then either subscribe the sender or fan the body out to subscribers.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tracing::{debug, warn};

use crate::metrics::Metrics;
use crate::protocol::{encode_delivery, Command};
use crate::registry::SubscriptionRegistry;

use super::Replication;

/// Shared state for datagram handler tasks
pub struct Dispatcher {
    socket: Arc<UdpSocket>,
    registry: Arc<SubscriptionRegistry>,
    replication: Option<Arc<dyn Replication>>,
    metrics: Option<Arc<Metrics>>,
}

impl Dispatcher {
    pub fn new(
        socket: Arc<UdpSocket>,
        registry: Arc<SubscriptionRegistry>,
        replication: Option<Arc<dyn Replication>>,
        metrics: Option<Arc<Metrics>>,
    ) -> Self {
        Self {
            socket,
            registry,
            replication,
            metrics,
        }
    }

    /// Handle one datagram received from `source`
    pub async fn handle_datagram(&self, payload: &[u8], source: SocketAddr) {
        let msg = String::from_utf8_lossy(payload);

        match Command::parse(&msg) {
            Ok(Command::Subscribe { topic }) => self.subscribe(topic, source).await,
            Ok(Command::Publish { topic, body }) => self.publish(topic, body).await,
            Err(e) => {
                warn!("{} from {}, discarded: {:?}", e, source, msg);
                if let Some(ref metrics) = self.metrics {
                    metrics.datagram_discarded(e.kind());
                }
            }
        }
    }

    async fn subscribe(&self, topic: &str, source: SocketAddr) {
        let subscriber = source.to_string();
        let added = self.registry.add_subscription(topic, &subscriber);
        debug!(
            "SUB '{}' from {} ({})",
            topic,
            subscriber,
            if added { "new" } else { "existing" }
        );

        if let Some(ref metrics) = self.metrics {
            metrics.subscription_accepted(self.registry.topic_count());
        }

        // Re-SUBs are replicated too, so a node that missed the first push
        // catches up on the next one
        if let Some(ref replication) = self.replication {
            replication.on_subscribe(topic, &subscriber).await;
        }
    }

    async fn publish(&self, topic: &str, body: &str) {
        if let Some(ref metrics) = self.metrics {
            metrics.publish_received();
        }

        let subscribers = self.registry.matching_subscribers(topic);
        if subscribers.is_empty() {
            debug!("PUB '{}': no subscribers", topic);
            return;
        }

        let datagram = encode_delivery(topic, body);
        debug!("PUB '{}': delivering to {} subscribers", topic, subscribers.len());

        for subscriber in subscribers.iter() {
            match self.deliver(subscriber, &datagram).await {
                Ok(()) => {
                    if let Some(ref metrics) = self.metrics {
                        metrics.delivery_sent();
                    }
                }
                Err(e) => {
                    warn!("Failed to deliver '{}' to {}: {}", topic, subscriber, e);
                    if let Some(ref metrics) = self.metrics {
                        metrics.delivery_failed();
                    }
                }
            }
        }
    }

    async fn deliver(&self, subscriber: &str, datagram: &[u8]) -> io::Result<()> {
        let addr = resolve_subscriber(subscriber).await?;
        self.socket.send_to(datagram, addr).await?;
        Ok(())
    }
}

/// Turn a subscriber id back into a socket address.
///
/// Locally recorded ids are `SocketAddr` strings; replicated ids may carry
/// a host name and are resolved, first address wins.
pub async fn resolve_subscriber(subscriber: &str) -> io::Result<SocketAddr> {
    if let Ok(addr) = subscriber.parse::<SocketAddr>() {
        return Ok(addr);
    }

    tokio::net::lookup_host(subscriber)
        .await?
        .next()
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no address for subscriber {}", subscriber),
            )
        })
}
