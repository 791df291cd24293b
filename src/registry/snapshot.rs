//! Registry snapshot and its line-oriented wire format.
//!
//! A snapshot is a sequence of per-topic blocks:
//!
//! ```text
//! <topic>\n
//! <subscriber>\n
//! <subscriber>\n
//! \n
//! ```
//!
//! The stream ends at end of input. The same format is the `PULL` response
//! of the cluster sync protocol.

use std::fmt::Write;

use super::{SubscriberId, Topic};

/// Full copy of a registry's (topic, subscriber) pairs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    blocks: Vec<(Topic, Vec<SubscriberId>)>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self { blocks: Vec::new() }
    }

    /// Append a topic block. Blocks without subscribers are dropped.
    pub fn push_topic(&mut self, topic: Topic, subscribers: Vec<SubscriberId>) {
        if !subscribers.is_empty() {
            self.blocks.push((topic, subscribers));
        }
    }

    /// Iterate over every (topic, subscriber) pair
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.blocks.iter().flat_map(|(topic, subscribers)| {
            subscribers
                .iter()
                .map(move |subscriber| (topic.as_ref(), subscriber.as_ref()))
        })
    }

    /// Number of topic blocks
    pub fn topic_count(&self) -> usize {
        self.blocks.len()
    }

    /// Number of (topic, subscriber) pairs
    pub fn len(&self) -> usize {
        self.blocks.iter().map(|(_, subs)| subs.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Serialize to the block format
    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(self.len() * 24);
        for (topic, subscribers) in &self.blocks {
            let _ = writeln!(out, "{}", topic);
            for subscriber in subscribers {
                let _ = writeln!(out, "{}", subscriber);
            }
            out.push('\n');
        }
        out
    }

    /// Parse the block format.
    ///
    /// The first line of each block is the topic, every following non-empty
    /// line a subscriber, and a blank line closes the block. A trailing
    /// block without its blank line is still accepted. `\r\n` line endings
    /// are tolerated.
    pub fn decode(input: &str) -> Self {
        let mut snapshot = Snapshot::new();
        let mut topic: Option<Topic> = None;
        let mut subscribers: Vec<SubscriberId> = Vec::new();

        for line in input.lines() {
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                if let Some(topic) = topic.take() {
                    snapshot.push_topic(topic, std::mem::take(&mut subscribers));
                }
                continue;
            }
            match topic {
                None => topic = Some(Topic::from(line)),
                Some(_) => subscribers.push(SubscriberId::from(line)),
            }
        }
        if let Some(topic) = topic {
            snapshot.push_topic(topic, subscribers);
        }

        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn pairs(snapshot: &Snapshot) -> Vec<(String, String)> {
        let mut pairs: Vec<_> = snapshot
            .pairs()
            .map(|(t, s)| (t.to_string(), s.to_string()))
            .collect();
        pairs.sort();
        pairs
    }

    #[test]
    fn test_encode_block_format() {
        let mut snapshot = Snapshot::new();
        snapshot.push_topic("alerts".into(), vec!["10.0.0.5:9000".into(), "10.0.0.6:9000".into()]);
        snapshot.push_topic("x".into(), vec!["c1".into()]);

        assert_eq!(
            snapshot.encode(),
            "alerts\n10.0.0.5:9000\n10.0.0.6:9000\n\nx\nc1\n\n"
        );
    }

    #[test]
    fn test_empty_snapshot_encodes_to_nothing() {
        assert_eq!(Snapshot::new().encode(), "");
        assert!(Snapshot::decode("").is_empty());
    }

    #[test]
    fn test_decode_blocks() {
        let snapshot = Snapshot::decode("a\n1.1.1.1:1\n2.2.2.2:2\n\nb\n3.3.3.3:3\n\n");
        assert_eq!(snapshot.topic_count(), 2);
        assert_eq!(snapshot.len(), 3);
        assert_eq!(
            pairs(&snapshot),
            vec![
                ("a".to_string(), "1.1.1.1:1".to_string()),
                ("a".to_string(), "2.2.2.2:2".to_string()),
                ("b".to_string(), "3.3.3.3:3".to_string()),
            ]
        );
    }

    #[test]
    fn test_decode_topic_comes_before_subscribers() {
        let snapshot = Snapshot::decode("x\nc1\n\n");
        assert_eq!(pairs(&snapshot), vec![("x".to_string(), "c1".to_string())]);
    }

    #[test]
    fn test_decode_unterminated_last_block() {
        let snapshot = Snapshot::decode("t\ns1\n\nu\ns2");
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.pairs().any(|p| p == ("u", "s2")));
    }

    #[test]
    fn test_decode_skips_topic_without_subscribers() {
        let snapshot = Snapshot::decode("lonely\n\nt\ns\n\n");
        assert_eq!(snapshot.topic_count(), 1);
        assert_eq!(pairs(&snapshot), vec![("t".to_string(), "s".to_string())]);
    }

    #[test]
    fn test_decode_crlf_and_extra_blank_lines() {
        let snapshot = Snapshot::decode("\r\n\r\nt\r\ns\r\n\r\n\n\n");
        assert_eq!(pairs(&snapshot), vec![("t".to_string(), "s".to_string())]);
    }
}
