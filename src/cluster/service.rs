//! Cluster Sync Service
//!
//! Keeps subscription registries of a static set of nodes eventually
//! consistent:
//! - bootstrap pull: fetch a full snapshot from the first reachable node
//! - push-on-write: send every local subscription to all other nodes
//! - inbound listener: serve `PULL` and apply `PUSH` from other nodes
//!
//! Pull stops at the first success while push always tries every node.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use rand::Rng;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::broker::Replication;
use crate::config::ClusterConfig;
use crate::metrics::Metrics;
use crate::registry::{Snapshot, SubscriptionRegistry};

use super::locality::{HostInterfaces, Locality};
use super::protocol::{encode_push, read_push_body, SyncCommand, PULL_REQUEST};
use super::transport::{Connector, SyncStream, TcpConnector};
use super::SyncError;

/// Serves inbound sync connections against the local registry
#[derive(Clone)]
pub struct InboundHandler {
    registry: Arc<SubscriptionRegistry>,
    read_timeout: Duration,
    metrics: Option<Arc<Metrics>>,
}

impl InboundHandler {
    pub fn new(registry: Arc<SubscriptionRegistry>, read_timeout: Duration) -> Self {
        Self {
            registry,
            read_timeout,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Option<Arc<Metrics>>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Handle one connection: read the command line, act on it, close.
    pub async fn handle<S: SyncStream>(&self, stream: S) -> Result<SyncCommand, SyncError> {
        let mut reader = BufReader::new(stream);
        let mut line = String::new();

        let n = timeout(self.read_timeout, reader.read_line(&mut line))
            .await
            .map_err(|_| SyncError::Timeout("reading sync command"))??;
        if n == 0 {
            return Err(SyncError::Incomplete("missing command"));
        }

        let command = match SyncCommand::parse(&line) {
            Ok(command) => command,
            Err(e) => {
                self.record_request("unknown");
                return Err(e);
            }
        };
        self.record_request(command.name());

        match command {
            SyncCommand::Pull => {
                let snapshot = self.registry.snapshot();
                let stream = reader.get_mut();
                stream.write_all(snapshot.encode().as_bytes()).await?;
                stream.shutdown().await?;
                debug!(
                    "Sent snapshot with {} subscriptions ({} topics)",
                    snapshot.len(),
                    snapshot.topic_count()
                );
            }
            SyncCommand::Push => {
                let (topic, subscriber) = timeout(self.read_timeout, read_push_body(&mut reader))
                    .await
                    .map_err(|_| SyncError::Timeout("reading PUSH body"))??;
                let added = self.registry.add_subscription(&topic, &subscriber);
                if added {
                    if let Some(ref metrics) = self.metrics {
                        metrics.topics_changed(self.registry.topic_count());
                    }
                }
                debug!(
                    "Applied PUSH '{}' -> {} ({})",
                    topic,
                    subscriber,
                    if added { "new" } else { "existing" }
                );
            }
        }

        Ok(command)
    }

    fn record_request(&self, command: &str) {
        if let Some(ref metrics) = self.metrics {
            metrics.sync_request_received(command);
        }
    }
}

/// Cluster sync service, installed into the broker as its [`Replication`]
pub struct SyncService<C: Connector = TcpConnector> {
    config: ClusterConfig,
    registry: Arc<SubscriptionRegistry>,
    connector: C,
    locality: Arc<dyn Locality>,
    metrics: Option<Arc<Metrics>>,
    listen_addr: RwLock<Option<SocketAddr>>,
}

impl SyncService<TcpConnector> {
    /// Sync service over TCP with host interface self-detection
    pub fn new(config: ClusterConfig, registry: Arc<SubscriptionRegistry>) -> Self {
        let connector = TcpConnector::new(config.connect_timeout);
        Self::with_connector(config, registry, connector)
    }
}

impl<C: Connector> SyncService<C> {
    /// Sync service using a custom connection factory
    pub fn with_connector(
        config: ClusterConfig,
        registry: Arc<SubscriptionRegistry>,
        connector: C,
    ) -> Self {
        Self {
            config,
            registry,
            connector,
            locality: Arc::new(HostInterfaces),
            metrics: None,
            listen_addr: RwLock::new(None),
        }
    }

    /// Replace the node self-detection strategy
    pub fn with_locality<L: Locality + 'static>(mut self, locality: L) -> Self {
        self.locality = Arc::new(locality);
        self
    }

    /// Set metrics for the sync service
    pub fn set_metrics(&mut self, metrics: Arc<Metrics>) {
        self.metrics = Some(metrics);
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// Address of the inbound listener once started
    pub fn listen_addr(&self) -> Option<SocketAddr> {
        *self.listen_addr.read()
    }

    /// Handler serving inbound connections for this node
    pub fn inbound_handler(&self) -> InboundHandler {
        InboundHandler::new(self.registry.clone(), self.config.read_timeout)
            .with_metrics(self.metrics.clone())
    }

    /// Node list in round-robin order from a uniformly random start
    fn traversal_order(&self) -> Vec<&str> {
        let nodes = &self.config.nodes;
        if nodes.is_empty() {
            return Vec::new();
        }
        let start = rand::thread_rng().gen_range(0..nodes.len());
        (0..nodes.len())
            .map(|i| nodes[(start + i) % nodes.len()].as_str())
            .collect()
    }

    /// Resolve `node` and drop it if it refers to this host
    async fn remote_addr(&self, node: &str) -> Result<Option<SocketAddr>, SyncError> {
        let addr = resolve_node(node).await?;
        if self.locality.is_local(addr) {
            debug!("Skipping local node {}", node);
            return Ok(None);
        }
        Ok(Some(addr))
    }

    /// Bootstrap pull: restore the snapshot of the first remote node that
    /// answers. Returns the number of new subscriptions.
    pub async fn pull(&self) -> Result<usize, SyncError> {
        let mut attempted = 0;

        for node in self.traversal_order() {
            let addr = match self.remote_addr(node).await {
                Ok(Some(addr)) => addr,
                Ok(None) => continue,
                Err(e) => {
                    attempted += 1;
                    warn!("Sync pull from {} skipped: {}", node, e);
                    continue;
                }
            };
            attempted += 1;

            info!("Requesting sync data from node {}", node);
            match self.pull_from(addr).await {
                Ok(snapshot) => {
                    let restored = self.registry.restore(&snapshot);
                    info!(
                        "Restored {} new subscriptions ({} received) from node {}",
                        restored,
                        snapshot.len(),
                        node
                    );
                    if let Some(ref metrics) = self.metrics {
                        metrics.bootstrap_completed(restored, self.registry.topic_count());
                    }
                    return Ok(restored);
                }
                Err(e) => {
                    warn!("Sync pull from {} failed: {}", node, e);
                }
            }
        }

        if attempted == 0 {
            Err(SyncError::NoPeers)
        } else {
            Err(SyncError::Unreachable(attempted))
        }
    }

    /// Fetch the full snapshot of one node
    pub async fn pull_from(&self, addr: SocketAddr) -> Result<Snapshot, SyncError> {
        let mut stream = self.connector.connect(addr).await?;
        stream.write_all(PULL_REQUEST).await?;
        stream.flush().await?;

        let mut data = String::new();
        timeout(self.config.read_timeout, stream.read_to_string(&mut data))
            .await
            .map_err(|_| SyncError::Timeout("reading snapshot"))??;

        Ok(Snapshot::decode(&data))
    }

    /// Push-on-write: send one pair to every remote node. Returns how many
    /// nodes accepted the connection.
    pub async fn push(&self, topic: &str, subscriber: &str) -> usize {
        let mut delivered = 0;

        for node in self.traversal_order() {
            let result = match self.remote_addr(node).await {
                Ok(Some(addr)) => {
                    debug!("Sending sync data to node {}", node);
                    self.push_to(addr, topic, subscriber).await
                }
                Ok(None) => continue,
                Err(e) => Err(e),
            };

            match result {
                Ok(()) => {
                    delivered += 1;
                    if let Some(ref metrics) = self.metrics {
                        metrics.sync_push_sent();
                    }
                }
                Err(e) => {
                    warn!("Sync push of '{}' to {} failed: {}", topic, node, e);
                    if let Some(ref metrics) = self.metrics {
                        metrics.sync_push_failed();
                    }
                }
            }
        }

        delivered
    }

    /// Send one pair to one node
    pub async fn push_to(
        &self,
        addr: SocketAddr,
        topic: &str,
        subscriber: &str,
    ) -> Result<(), SyncError> {
        let mut stream = self.connector.connect(addr).await?;
        stream.write_all(&encode_push(topic, subscriber)).await?;
        stream.shutdown().await?;
        Ok(())
    }

    /// Bind the inbound listener and serve it until shutdown
    pub async fn listen(&self, shutdown: broadcast::Receiver<()>) -> std::io::Result<SocketAddr> {
        let listener = match TcpListener::bind(self.config.sync_bind).await {
            Ok(listener) => listener,
            Err(e) => {
                error!("Cannot listen on sync port {}: {}", self.config.sync_bind, e);
                return Err(e);
            }
        };
        let addr = listener.local_addr()?;
        *self.listen_addr.write() = Some(addr);
        info!("Listening for cluster sync on tcp://{}", addr);

        let handler = self.inbound_handler();
        tokio::spawn(async move {
            serve(listener, handler, shutdown).await;
        });

        Ok(addr)
    }
}

/// Accept loop of the inbound sync listener
async fn serve(
    listener: TcpListener,
    handler: InboundHandler,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            biased;

            result = shutdown.recv() => {
                match result {
                    Ok(()) | Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                }
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, addr)) => {
                        info!("New sync request from {}", addr);
                        let handler = handler.clone();
                        tokio::spawn(async move {
                            match handler.handle(stream).await {
                                Ok(command) => debug!("Sync {} from {} done", command.name(), addr),
                                Err(e) => warn!("Sync request from {} rejected: {}", addr, e),
                            }
                        });
                    }
                    Err(e) => {
                        error!("Failed to accept sync connection: {}", e);
                    }
                }
            }
        }
    }
    debug!("Sync listener stopped");
}

/// Resolve a `host:port` node entry, first address wins
pub async fn resolve_node(node: &str) -> Result<SocketAddr, SyncError> {
    if let Ok(addr) = node.parse::<SocketAddr>() {
        return Ok(addr);
    }
    tokio::net::lookup_host(node)
        .await
        .map_err(|_| SyncError::Resolve(node.to_string()))?
        .next()
        .ok_or_else(|| SyncError::Resolve(node.to_string()))
}

#[async_trait]
impl<C: Connector + 'static> Replication for SyncService<C> {
    async fn bootstrap(&self) {
        match self.pull().await {
            Ok(restored) => info!("Cluster bootstrap complete ({} subscriptions)", restored),
            Err(SyncError::NoPeers) => info!("Cluster bootstrap skipped: no remote nodes"),
            Err(e) => warn!("Cluster bootstrap failed, starting empty: {}", e),
        }
    }

    async fn start(&self, shutdown: broadcast::Receiver<()>) -> std::io::Result<()> {
        self.listen(shutdown).await.map(|_| ())
    }

    async fn on_subscribe(&self, topic: &str, subscriber: &str) {
        let delivered = self.push(topic, subscriber).await;
        debug!("Replicated '{}' -> {} to {} nodes", topic, subscriber, delivered);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io;

    use tokio::io::DuplexStream;
    use tokio::task::JoinHandle;

    /// In-memory cluster: each address maps to a node's inbound handler
    #[derive(Default)]
    struct MemoryConnector {
        nodes: HashMap<SocketAddr, InboundHandler>,
        tasks: parking_lot::Mutex<Vec<JoinHandle<Result<SyncCommand, SyncError>>>>,
    }

    impl MemoryConnector {
        fn with_node(mut self, addr: &str, registry: Arc<SubscriptionRegistry>) -> Self {
            let handler = InboundHandler::new(registry, Duration::from_secs(1));
            self.nodes.insert(addr.parse().unwrap(), handler);
            self
        }

        /// Wait until every served connection is done
        async fn settle(&self) {
            let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
            for task in tasks {
                let _ = task.await;
            }
        }
    }

    #[async_trait]
    impl Connector for MemoryConnector {
        type Stream = DuplexStream;

        async fn connect(&self, addr: SocketAddr) -> Result<DuplexStream, SyncError> {
            let handler = self.nodes.get(&addr).cloned().ok_or_else(|| {
                SyncError::Io(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"))
            })?;
            let (client, server) = tokio::io::duplex(64 * 1024);
            let task = tokio::spawn(async move { handler.handle(server).await });
            self.tasks.lock().push(task);
            Ok(client)
        }
    }

    const SELF_ADDR: &str = "10.0.0.1:15000";

    fn cluster_config(nodes: &[&str]) -> ClusterConfig {
        ClusterConfig {
            enabled: true,
            nodes: nodes.iter().map(|n| n.to_string()).collect(),
            read_timeout: Duration::from_secs(1),
            ..Default::default()
        }
    }

    fn service(
        nodes: &[&str],
        registry: Arc<SubscriptionRegistry>,
        connector: MemoryConnector,
    ) -> SyncService<MemoryConnector> {
        let own: SocketAddr = SELF_ADDR.parse().unwrap();
        SyncService::with_connector(cluster_config(nodes), registry, connector)
            .with_locality(move |addr: SocketAddr| addr == own)
    }

    #[test]
    fn test_traversal_visits_every_node_once() {
        let nodes = ["a:1", "b:1", "c:1", "d:1"];
        let svc = service(
            &nodes,
            Arc::new(SubscriptionRegistry::new()),
            MemoryConnector::default(),
        );

        for _ in 0..20 {
            let order = svc.traversal_order();
            assert_eq!(order.len(), nodes.len());
            // Round-robin from some start index
            let start = nodes.iter().position(|n| *n == order[0]).unwrap();
            for (i, node) in order.iter().enumerate() {
                assert_eq!(*node, nodes[(start + i) % nodes.len()]);
            }
        }
    }

    #[test]
    fn test_traversal_empty() {
        let svc = service(
            &[],
            Arc::new(SubscriptionRegistry::new()),
            MemoryConnector::default(),
        );
        assert!(svc.traversal_order().is_empty());
    }

    #[tokio::test]
    async fn test_pull_restores_remote_snapshot() {
        let remote = Arc::new(SubscriptionRegistry::new());
        remote.add_subscription("a", "c1");
        remote.add_subscription("b", "c2");

        let local = Arc::new(SubscriptionRegistry::new());
        let connector = MemoryConnector::default().with_node("10.0.0.2:15000", remote);
        let svc = service(&[SELF_ADDR, "10.0.0.2:15000"], local.clone(), connector);

        assert_eq!(svc.pull().await.unwrap(), 2);
        assert!(local.matching_subscribers("a").contains("c1"));
        assert!(local.matching_subscribers("b").contains("c2"));
    }

    #[tokio::test]
    async fn test_pull_merges_with_existing_state() {
        let remote = Arc::new(SubscriptionRegistry::new());
        remote.add_subscription("x", "c1");

        let local = Arc::new(SubscriptionRegistry::new());
        local.add_subscription("x", "c3");

        let connector = MemoryConnector::default().with_node("10.0.0.2:15000", remote);
        let svc = service(&["10.0.0.2:15000"], local.clone(), connector);

        assert_eq!(svc.pull().await.unwrap(), 1);
        let subs = local.matching_subscribers("x");
        assert_eq!(subs.len(), 2);
        assert!(subs.contains("c1") && subs.contains("c3"));
    }

    #[tokio::test]
    async fn test_pull_skips_unreachable_node() {
        let remote = Arc::new(SubscriptionRegistry::new());
        remote.add_subscription("t", "c1");

        let local = Arc::new(SubscriptionRegistry::new());
        // 10.0.0.3 has no handler, so connecting to it is refused
        let connector = MemoryConnector::default().with_node("10.0.0.2:15000", remote);
        let svc = service(
            &[SELF_ADDR, "10.0.0.3:15000", "10.0.0.2:15000"],
            local.clone(),
            connector,
        );

        for _ in 0..5 {
            assert!(svc.pull().await.unwrap() <= 1);
            assert!(local.matching_subscribers("t").contains("c1"));
        }
    }

    #[tokio::test]
    async fn test_pull_with_only_self_has_no_peers() {
        let svc = service(
            &[SELF_ADDR],
            Arc::new(SubscriptionRegistry::new()),
            MemoryConnector::default(),
        );
        assert!(matches!(svc.pull().await, Err(SyncError::NoPeers)));
    }

    #[tokio::test]
    async fn test_pull_all_unreachable() {
        let local = Arc::new(SubscriptionRegistry::new());
        let svc = service(
            &[SELF_ADDR, "10.0.0.2:15000", "10.0.0.3:15000"],
            local.clone(),
            MemoryConnector::default(),
        );
        assert!(matches!(svc.pull().await, Err(SyncError::Unreachable(2))));
        assert!(local.is_empty());
    }

    #[tokio::test]
    async fn test_push_reaches_every_remote_node() {
        let node2 = Arc::new(SubscriptionRegistry::new());
        let node3 = Arc::new(SubscriptionRegistry::new());
        let connector = MemoryConnector::default()
            .with_node("10.0.0.2:15000", node2.clone())
            .with_node("10.0.0.3:15000", node3.clone());
        let local = Arc::new(SubscriptionRegistry::new());
        let svc = service(
            &[SELF_ADDR, "10.0.0.2:15000", "10.0.0.3:15000"],
            local.clone(),
            connector,
        );

        assert_eq!(svc.push("x", "10.0.0.9:7000").await, 2);
        svc.connector.settle().await;

        assert!(node2.matching_subscribers("x").contains("10.0.0.9:7000"));
        assert!(node3.matching_subscribers("x").contains("10.0.0.9:7000"));
        // Push never touches the local registry
        assert!(local.is_empty());
    }

    #[tokio::test]
    async fn test_push_continues_past_failed_node() {
        let node3 = Arc::new(SubscriptionRegistry::new());
        let connector = MemoryConnector::default().with_node("10.0.0.3:15000", node3.clone());
        let mut svc = service(
            &[SELF_ADDR, "10.0.0.2:15000", "10.0.0.3:15000"],
            Arc::new(SubscriptionRegistry::new()),
            connector,
        );
        let metrics = Arc::new(Metrics::new());
        svc.set_metrics(metrics.clone());

        assert_eq!(svc.push("x", "c1").await, 1);
        svc.connector.settle().await;

        assert!(node3.matching_subscribers("x").contains("c1"));
        assert_eq!(metrics.sync_pushes_sent_total.get(), 1);
        assert_eq!(metrics.sync_push_failures_total.get(), 1);
    }

    #[tokio::test]
    async fn test_push_with_unresolvable_node() {
        let svc = service(
            &[SELF_ADDR, "node-without-port"],
            Arc::new(SubscriptionRegistry::new()),
            MemoryConnector::default(),
        );
        assert_eq!(svc.push("x", "c1").await, 0);
    }

    #[tokio::test]
    async fn test_on_subscribe_pushes() {
        let node2 = Arc::new(SubscriptionRegistry::new());
        let connector = MemoryConnector::default().with_node("10.0.0.2:15000", node2.clone());
        let svc = service(
            &[SELF_ADDR, "10.0.0.2:15000"],
            Arc::new(SubscriptionRegistry::new()),
            connector,
        );

        svc.on_subscribe("news", "10.0.0.5:9000").await;
        svc.connector.settle().await;
        assert!(node2.matching_subscribers("news").contains("10.0.0.5:9000"));
    }

    #[tokio::test]
    async fn test_inbound_push() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let handler = InboundHandler::new(registry.clone(), Duration::from_secs(1));

        let stream = tokio_test::io::Builder::new()
            .read(b"PUSH\nx\nc1\n\n")
            .build();
        assert_eq!(handler.handle(stream).await.unwrap(), SyncCommand::Push);
        assert!(registry.matching_subscribers("x").contains("c1"));
    }

    #[tokio::test]
    async fn test_inbound_push_updates_topic_gauge() {
        let registry = Arc::new(SubscriptionRegistry::new());
        registry.add_subscription("local", "c0");
        let metrics = Arc::new(Metrics::new());
        let handler = InboundHandler::new(registry.clone(), Duration::from_secs(1))
            .with_metrics(Some(metrics.clone()));

        let requests = [
            &b"PUSH\nx\nc1\n\n"[..],
            b"PUSH\ny\nc1\n\n",
            b"PUSH\nx\nc2\n\n",
        ];
        for request in requests {
            let stream = tokio_test::io::Builder::new().read(request).build();
            handler.handle(stream).await.unwrap();
        }

        assert_eq!(metrics.topics_current.get(), 3);
        assert_eq!(metrics.subscriptions_total.get(), 0);
    }

    #[tokio::test]
    async fn test_inbound_push_split_reads() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let handler = InboundHandler::new(registry.clone(), Duration::from_secs(1));

        let stream = tokio_test::io::Builder::new()
            .read(b"PU")
            .read(b"SH\nalerts\n10.0")
            .read(b".0.5:9000\n")
            .build();
        handler.handle(stream).await.unwrap();
        assert!(registry
            .matching_subscribers("alerts")
            .contains("10.0.0.5:9000"));
    }

    #[tokio::test]
    async fn test_inbound_pull_sends_snapshot() {
        let registry = Arc::new(SubscriptionRegistry::new());
        registry.add_subscription("t", "s");
        let handler = InboundHandler::new(registry, Duration::from_secs(1));

        let stream = tokio_test::io::Builder::new()
            .read(b"PULL\n")
            .write(b"t\ns\n\n")
            .build();
        assert_eq!(handler.handle(stream).await.unwrap(), SyncCommand::Pull);
    }

    #[tokio::test]
    async fn test_inbound_pull_empty_registry() {
        let handler =
            InboundHandler::new(Arc::new(SubscriptionRegistry::new()), Duration::from_secs(1));
        let stream = tokio_test::io::Builder::new().read(b"PULL\n").build();
        assert_eq!(handler.handle(stream).await.unwrap(), SyncCommand::Pull);
    }

    #[tokio::test]
    async fn test_inbound_unknown_command() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let metrics = Arc::new(Metrics::new());
        let handler = InboundHandler::new(registry.clone(), Duration::from_secs(1))
            .with_metrics(Some(metrics.clone()));

        let stream = tokio_test::io::Builder::new()
            .read(b"DELETE\nx\nc1\n\n")
            .build();
        assert!(matches!(
            handler.handle(stream).await,
            Err(SyncError::UnknownCommand(_))
        ));
        assert!(registry.is_empty());
        assert_eq!(
            metrics
                .sync_requests_received_total
                .with_label_values(&["unknown"])
                .get(),
            1
        );
    }

    #[tokio::test]
    async fn test_inbound_empty_connection() {
        let handler =
            InboundHandler::new(Arc::new(SubscriptionRegistry::new()), Duration::from_secs(1));
        let stream = tokio_test::io::Builder::new().build();
        assert!(matches!(
            handler.handle(stream).await,
            Err(SyncError::Incomplete(_))
        ));
    }

    #[tokio::test]
    async fn test_inbound_truncated_push() {
        let registry = Arc::new(SubscriptionRegistry::new());
        let handler = InboundHandler::new(registry.clone(), Duration::from_secs(1));
        let stream = tokio_test::io::Builder::new().read(b"PUSH\nx\n").build();
        assert!(matches!(
            handler.handle(stream).await,
            Err(SyncError::Incomplete("missing subscriber"))
        ));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_inbound_silent_peer_times_out() {
        let handler = InboundHandler::new(
            Arc::new(SubscriptionRegistry::new()),
            Duration::from_millis(50),
        );
        let (_client, server) = tokio::io::duplex(1024);
        assert!(matches!(
            handler.handle(server).await,
            Err(SyncError::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn test_listen_and_sync_over_tcp() {
        let remote_registry = Arc::new(SubscriptionRegistry::new());
        remote_registry.add_subscription("news", "127.0.0.1:7001");

        let remote_config = ClusterConfig {
            sync_bind: "127.0.0.1:0".parse().unwrap(),
            ..cluster_config(&[])
        };
        let remote = SyncService::new(remote_config, remote_registry.clone());
        let (shutdown_tx, _) = broadcast::channel(1);
        let remote_addr = remote.listen(shutdown_tx.subscribe()).await.unwrap();
        assert_eq!(remote.listen_addr(), Some(remote_addr));

        let local_registry = Arc::new(SubscriptionRegistry::new());
        let node = remote_addr.to_string();
        let local = SyncService::new(cluster_config(&[&node]), local_registry.clone())
            .with_locality(|_: SocketAddr| false);

        assert_eq!(local.pull().await.unwrap(), 1);
        assert!(local_registry
            .matching_subscribers("news")
            .contains("127.0.0.1:7001"));

        assert_eq!(local.push("alerts", "127.0.0.1:7002").await, 1);
        // The listener applies the push after the connection closes
        for _ in 0..50 {
            if !remote_registry.matching_subscribers("alerts").is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(remote_registry
            .matching_subscribers("alerts")
            .contains("127.0.0.1:7002"));

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_listen_bind_failure() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = ClusterConfig {
            sync_bind: taken.local_addr().unwrap(),
            ..cluster_config(&[])
        };
        let svc = SyncService::new(config, Arc::new(SubscriptionRegistry::new()));
        let (shutdown_tx, _) = broadcast::channel::<()>(1);
        assert!(svc.start(shutdown_tx.subscribe()).await.is_err());
        assert!(svc.listen_addr().is_none());
    }
}
