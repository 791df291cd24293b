//! Protocol error types

use std::fmt;

/// Reasons a broker datagram is discarded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Missing verb, topic or the separator before the body
    Malformed(&'static str),
    /// Verb is not `SUB` or `PUB`
    UnknownVerb(String),
}

impl ParseError {
    /// Short label used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "malformed",
            Self::UnknownVerb(_) => "unknown_verb",
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed(msg) => write!(f, "malformed message: {}", msg),
            Self::UnknownVerb(verb) => write!(f, "unknown verb: {}", verb),
        }
    }
}

impl std::error::Error for ParseError {}
