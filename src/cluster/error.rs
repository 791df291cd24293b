//! Cluster sync error types

use std::fmt;

/// Errors raised by cluster sync operations
#[derive(Debug)]
pub enum SyncError {
    /// Connect, read or write failed
    Io(std::io::Error),
    /// Operation did not finish within the configured timeout
    Timeout(&'static str),
    /// Node address could not be resolved
    Resolve(String),
    /// First line of a sync connection is not a known command
    UnknownCommand(String),
    /// Request ended before all required lines were read
    Incomplete(&'static str),
    /// Every remote node was tried and none answered
    Unreachable(usize),
    /// The node list has no remote entries
    NoPeers,
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "IO error: {}", e),
            Self::Timeout(op) => write!(f, "timed out {}", op),
            Self::Resolve(node) => write!(f, "cannot resolve node address {}", node),
            Self::UnknownCommand(cmd) => write!(f, "unknown sync command {:?}", cmd),
            Self::Incomplete(what) => write!(f, "incomplete request: {}", what),
            Self::Unreachable(n) => write!(f, "all {} remote nodes unreachable", n),
            Self::NoPeers => write!(f, "no remote nodes configured"),
        }
    }
}

impl std::error::Error for SyncError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<tokio::time::error::Elapsed> for SyncError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Self::Timeout("waiting for peer")
    }
}
