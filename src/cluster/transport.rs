//! Outbound sync connections
//!
//! The sync service opens connections through a [`Connector`], so tests can
//! replace TCP with an in-memory transport.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use super::SyncError;

/// Byte stream usable for one sync exchange
pub trait SyncStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> SyncStream for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

/// Factory for outbound sync connections
#[async_trait]
pub trait Connector: Send + Sync {
    type Stream: SyncStream;

    async fn connect(&self, addr: SocketAddr) -> Result<Self::Stream, SyncError>;
}

/// TCP connector with a bounded connect time
#[derive(Debug, Clone)]
pub struct TcpConnector {
    connect_timeout: Duration,
}

impl TcpConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    type Stream = TcpStream;

    async fn connect(&self, addr: SocketAddr) -> Result<TcpStream, SyncError> {
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| SyncError::Timeout("connecting"))??;
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}
