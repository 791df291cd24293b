//! Broker Protocol Engine
//!
//! Owns the UDP socket, reads datagrams one at a time and hands each one to
//! an independent task for parsing, subscription and delivery.

mod dispatch;
mod replication;

pub use dispatch::{resolve_subscriber, Dispatcher};
pub use replication::Replication;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::metrics::Metrics;
use crate::protocol::{DEFAULT_BROKER_PORT, MAX_DATAGRAM_SIZE};
use crate::registry::SubscriptionRegistry;


/// Default socket receive buffer size (SO_RCVBUF)
pub const DEFAULT_RECV_BUFFER_SIZE: usize = 64 * 1024;

/// Broker configuration
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// UDP bind address
    pub bind_addr: SocketAddr,
    /// Largest datagram read; longer datagrams are truncated by the OS
    pub max_datagram_size: usize,
    /// Socket receive buffer size
    pub recv_buffer_size: Option<usize>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_BROKER_PORT)),
            max_datagram_size: MAX_DATAGRAM_SIZE,
            recv_buffer_size: Some(DEFAULT_RECV_BUFFER_SIZE),
        }
    }
}

/// Lifecycle state of a broker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerState {
    /// Not reading datagrams
    Stopped,
    /// Socket bound and receive loop running
    Listening,
}

/// The UDP pub/sub broker
pub struct Broker {
    /// Configuration
    config: BrokerConfig,
    /// Subscription registry
    registry: Arc<SubscriptionRegistry>,
    /// Optional replication strategy (clustered mode)
    replication: Option<Arc<dyn Replication>>,
    /// Optional metrics
    metrics: Option<Arc<Metrics>>,
    /// Shutdown signal
    shutdown: broadcast::Sender<()>,
    /// Set once shutdown was requested, even before `run` subscribed
    shutdown_requested: AtomicBool,
    /// Lifecycle state
    state: RwLock<BrokerState>,
    /// Address the socket is bound to while listening
    local_addr: RwLock<Option<SocketAddr>>,
}

impl Broker {
    /// Create a broker with a fresh registry
    pub fn new(config: BrokerConfig) -> Self {
        Self::with_registry(config, Arc::new(SubscriptionRegistry::new()))
    }

    /// Create a broker sharing an existing registry
    pub fn with_registry(config: BrokerConfig, registry: Arc<SubscriptionRegistry>) -> Self {
        let (shutdown, _) = broadcast::channel(1);

        Self {
            config,
            registry,
            replication: None,
            metrics: None,
            shutdown,
            shutdown_requested: AtomicBool::new(false),
            state: RwLock::new(BrokerState::Stopped),
            local_addr: RwLock::new(None),
        }
    }

    /// Install a replication strategy
    pub fn set_replication(&mut self, replication: Arc<dyn Replication>) {
        self.replication = Some(replication);
    }

    /// Set metrics for the broker
    pub fn set_metrics(&mut self, metrics: Arc<Metrics>) {
        self.metrics = Some(metrics);
    }

    /// The broker's subscription registry
    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn state(&self) -> BrokerState {
        *self.state.read()
    }

    /// Bound socket address, once the broker is listening
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.read()
    }

    /// Subscribe to the shutdown signal
    pub fn shutdown_signal(&self) -> broadcast::Receiver<()> {
        self.shutdown.subscribe()
    }

    /// Stop the receive loop. In-flight datagram tasks run to completion.
    pub fn shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::SeqCst);
        let _ = self.shutdown.send(());
    }

    /// Run the broker until shutdown.
    ///
    /// Binding the socket or starting replication are the only fatal
    /// errors; everything after that is logged and skipped.
    pub async fn run(&self) -> Result<(), std::io::Error> {
        let mut shutdown_rx = self.shutdown.subscribe();

        let socket = match bind_socket(&self.config) {
            Ok(socket) => Arc::new(socket),
            Err(e) => {
                error!("Cannot bind broker socket {}: {}", self.config.bind_addr, e);
                return Err(e);
            }
        };
        let local_addr = socket.local_addr()?;

        if let Some(ref replication) = self.replication {
            // Subscribed before the flag check, so a shutdown racing with
            // bootstrap is either seen by the flag or by this receiver
            let replication_shutdown = self.shutdown.subscribe();
            replication.bootstrap().await;
            if self.shutdown_requested.load(Ordering::SeqCst) {
                debug!("Shutdown requested during bootstrap, not starting replication");
                return Ok(());
            }
            replication.start(replication_shutdown).await?;
        }

        *self.local_addr.write() = Some(local_addr);
        *self.state.write() = BrokerState::Listening;
        info!("Broker receiving on udp://{}", local_addr);

        let dispatcher = Arc::new(Dispatcher::new(
            socket.clone(),
            self.registry.clone(),
            self.replication.clone(),
            self.metrics.clone(),
        ));
        let mut buf = vec![0u8; self.config.max_datagram_size];

        while !self.shutdown_requested.load(Ordering::SeqCst) {
            tokio::select! {
                biased;

                result = shutdown_rx.recv() => {
                    match result {
                        Ok(()) | Err(broadcast::error::RecvError::Closed) => break,
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    }
                }
                received = socket.recv_from(&mut buf) => {
                    match received {
                        Ok((n, source)) => {
                            if let Some(ref metrics) = self.metrics {
                                metrics.datagram_received();
                            }
                            let payload = Bytes::copy_from_slice(&buf[..n]);
                            let dispatcher = dispatcher.clone();
                            tokio::spawn(async move {
                                dispatcher.handle_datagram(&payload, source).await;
                            });
                        }
                        Err(e) => {
                            warn!("Error receiving on udp://{}: {}", local_addr, e);
                        }
                    }
                }
            }
        }

        debug!("Broker receive loop on {} stopped", local_addr);
        *self.state.write() = BrokerState::Stopped;
        *self.local_addr.write() = None;
        Ok(())
    }
}

/// Create the broker's UDP socket with the configured buffer size
fn bind_socket(config: &BrokerConfig) -> std::io::Result<UdpSocket> {
    let socket = Socket::new(
        Domain::for_address(config.bind_addr),
        Type::DGRAM,
        Some(Protocol::UDP),
    )?;

    if let Some(size) = config.recv_buffer_size {
        if let Err(e) = socket.set_recv_buffer_size(size) {
            warn!("Cannot set receive buffer size to {}: {}", size, e);
        }
    }

    socket.set_nonblocking(true)?;
    socket.bind(&config.bind_addr.into())?;
    UdpSocket::from_std(socket.into())
}
