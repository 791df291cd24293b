//! Node self-detection
//!
//! The node list includes this node. Entries classified as local are left
//! out of all sync traffic so a node never syncs with itself.

use std::net::{IpAddr, SocketAddr};

use socket2::{Domain, Socket, Type};

/// Classifies node addresses as local or remote
pub trait Locality: Send + Sync {
    fn is_local(&self, addr: SocketAddr) -> bool;
}

/// Local if loopback, wildcard, or assigned to one of this host's interfaces
#[derive(Debug, Clone, Copy, Default)]
pub struct HostInterfaces;

impl Locality for HostInterfaces {
    fn is_local(&self, addr: SocketAddr) -> bool {
        is_local_address(addr.ip())
    }
}

impl<F> Locality for F
where
    F: Fn(SocketAddr) -> bool + Send + Sync,
{
    fn is_local(&self, addr: SocketAddr) -> bool {
        self(addr)
    }
}

/// Check whether `ip` refers to this host
pub fn is_local_address(ip: IpAddr) -> bool {
    if ip.is_loopback() || ip.is_unspecified() {
        return true;
    }
    is_interface_address(ip)
}

/// Binding an ephemeral port only succeeds on an address one of the host's
/// interfaces carries
fn is_interface_address(ip: IpAddr) -> bool {
    let addr = SocketAddr::new(ip, 0);
    match Socket::new(Domain::for_address(addr), Type::DGRAM, None) {
        Ok(socket) => socket.bind(&addr.into()).is_ok(),
        Err(_) => false,
    }
}
