//! Cluster Sync Protocol
//!
//! Line-oriented text over TCP. The first line is the command:
//!
//! ```text
//! PULL\n                              -> full snapshot, then close
//! PUSH\n<topic>\n<subscriber>\n\n     -> no response, then close
//! ```

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use super::SyncError;

/// Pull command line
pub const CMD_PULL: &str = "PULL";
/// Push command line
pub const CMD_PUSH: &str = "PUSH";

/// Complete PULL request
pub const PULL_REQUEST: &[u8] = b"PULL\n";

/// Command received on an inbound sync connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncCommand {
    /// Send back the full registry snapshot
    Pull,
    /// Merge one (topic, subscriber) pair
    Push,
}

impl SyncCommand {
    /// Parse the command line (trailing line break and spaces ignored)
    pub fn parse(line: &str) -> Result<Self, SyncError> {
        match line.trim() {
            CMD_PULL => Ok(SyncCommand::Pull),
            CMD_PUSH => Ok(SyncCommand::Push),
            other => Err(SyncError::UnknownCommand(other.to_string())),
        }
    }

    /// Label used for logs and metrics
    pub fn name(&self) -> &'static str {
        match self {
            SyncCommand::Pull => "pull",
            SyncCommand::Push => "push",
        }
    }
}

/// Encode a complete PUSH request
pub fn encode_push(topic: &str, subscriber: &str) -> Vec<u8> {
    format!("{}\n{}\n{}\n\n", CMD_PUSH, topic, subscriber).into_bytes()
}

/// Read a PUSH body: lines up to the first blank line or end of input.
///
/// The first two lines are the topic and the subscriber.
pub async fn read_push_body<R>(reader: &mut R) -> Result<(String, String), SyncError>
where
    R: AsyncBufRead + Unpin,
{
    let mut fields: Vec<String> = Vec::with_capacity(2);
    let mut line = String::new();

    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            break;
        }
        let value = line.trim_end_matches(['\r', '\n']);
        if value.is_empty() {
            break;
        }
        if fields.len() < 2 {
            fields.push(value.to_string());
        }
    }

    let mut fields = fields.into_iter();
    let topic = fields.next().ok_or(SyncError::Incomplete("missing topic"))?;
    let subscriber = fields
        .next()
        .ok_or(SyncError::Incomplete("missing subscriber"))?;
    Ok((topic, subscriber))
}
