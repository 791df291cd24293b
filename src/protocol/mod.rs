//! Broker wire protocol
//!
//! UDP payloads are UTF-8 text split into at most three tokens: verb,
//! topic and the rest of the payload.
//!
//! ```text
//! SUB <topic>\n<opaque>   subscribe the sender's address to <topic>
//! PUB <topic>\n<body>     publish <body> to <topic>
//! MSG <topic>\n<body>     delivery to a subscriber (outbound only)
//! ```

mod error;

pub use error::ParseError;

use bytes::{BufMut, Bytes, BytesMut};

/// Default UDP port for the broker protocol
pub const DEFAULT_BROKER_PORT: u16 = 10000;

/// Largest datagram the broker reads
pub const MAX_DATAGRAM_SIZE: usize = 4 * 1024;

/// Subscribe verb
pub const VERB_SUB: &str = "SUB";
/// Publish verb
pub const VERB_PUB: &str = "PUB";
/// Delivery verb
pub const VERB_MSG: &str = "MSG";

/// A parsed inbound datagram
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command<'a> {
    /// `SUB <topic>`; the rest of the payload is ignored
    Subscribe { topic: &'a str },
    /// `PUB <topic>` with the body to deliver
    Publish { topic: &'a str, body: &'a str },
}

impl<'a> Command<'a> {
    /// Parse a datagram payload.
    ///
    /// Tokens are separated by runs of ASCII whitespace; other Unicode
    /// spaces are part of a token. Leading whitespace is skipped. The body
    /// is everything after the whitespace run following the topic and may
    /// be empty, but that run must be present: `PUB topic` is malformed
    /// while `PUB topic\n` publishes an empty body.
    pub fn parse(msg: &'a str) -> Result<Self, ParseError> {
        let (verb, rest) =
            next_token(trim_ascii_start(msg)).ok_or(ParseError::Malformed("missing verb"))?;
        let rest = rest.ok_or(ParseError::Malformed("missing topic"))?;
        let (topic, body) = next_token(rest).ok_or(ParseError::Malformed("missing topic"))?;
        let body = body.ok_or(ParseError::Malformed("missing body"))?;

        match verb {
            VERB_SUB => Ok(Command::Subscribe { topic }),
            VERB_PUB => Ok(Command::Publish { topic, body }),
            other => Err(ParseError::UnknownVerb(other.to_string())),
        }
    }
}

/// Split off the first token of `s` (which must not start with whitespace).
///
/// Returns the token and, if a whitespace run followed it, the remainder
/// after that run.
fn next_token(s: &str) -> Option<(&str, Option<&str>)> {
    if s.is_empty() {
        return None;
    }
    match s.find(|c: char| c.is_ascii_whitespace()) {
        None => Some((s, None)),
        Some(end) => {
            let rest = trim_ascii_start(&s[end..]);
            Some((&s[..end], Some(rest)))
        }
    }
}

fn trim_ascii_start(s: &str) -> &str {
    s.trim_start_matches(|c: char| c.is_ascii_whitespace())
}

/// Encode a `MSG <topic>\n<body>` delivery datagram
pub fn encode_delivery(topic: &str, body: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(VERB_MSG.len() + topic.len() + body.len() + 2);
    buf.put_slice(VERB_MSG.as_bytes());
    buf.put_u8(b' ');
    buf.put_slice(topic.as_bytes());
    buf.put_u8(b'\n');
    buf.put_slice(body.as_bytes());
    buf.freeze()
}
