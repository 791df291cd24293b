//! Subscription Registry
//!
//! Concurrent mapping from topic to the set of subscriber endpoints.
//!
//! The registry is shared by the datagram workers, the inbound sync
//! listener and the bootstrap pull. All mutation goes through
//! [`SubscriptionRegistry::add_subscription`], an idempotent merge into a
//! per-topic set. Topics live in a sharded `DashMap`, so inserts for
//! unrelated topics only contend when they hash to the same shard.

mod snapshot;

pub use snapshot::Snapshot;

use std::sync::Arc;

use ahash::{AHashSet, RandomState};
use dashmap::DashMap;

/// Topic name, matched by exact string equality
pub type Topic = Arc<str>;

/// Subscriber endpoint in `host:port` form
pub type SubscriberId = Arc<str>;

/// Deduplicated set of subscribers for one topic
pub type SubscriberSet = AHashSet<SubscriberId>;

/// Thread-safe topic -> subscriber set registry
pub struct SubscriptionRegistry {
    topics: DashMap<Topic, SubscriberSet, RandomState>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self {
            topics: DashMap::with_hasher(RandomState::new()),
        }
    }

    /// Add a (topic, subscriber) pair.
    ///
    /// Returns `true` if the pair was not present before. Adding the same
    /// pair twice leaves the registry unchanged.
    pub fn add_subscription(&self, topic: &str, subscriber: &str) -> bool {
        // Fast path: topic already known, only the shard holding it is locked
        if let Some(mut subs) = self.topics.get_mut(topic) {
            if subs.contains(subscriber) {
                return false;
            }
            return subs.insert(Arc::from(subscriber));
        }

        self.topics
            .entry(Arc::from(topic))
            .or_default()
            .insert(Arc::from(subscriber))
    }

    /// Current subscribers of `topic`, or an empty set if the topic is unknown
    pub fn matching_subscribers(&self, topic: &str) -> SubscriberSet {
        self.topics
            .get(topic)
            .map(|subs| subs.value().clone())
            .unwrap_or_default()
    }

    /// Dump every (topic, subscriber) pair
    pub fn snapshot(&self) -> Snapshot {
        let mut snapshot = Snapshot::new();
        for entry in self.topics.iter() {
            let subscribers: Vec<SubscriberId> = entry.value().iter().cloned().collect();
            snapshot.push_topic(entry.key().clone(), subscribers);
        }
        snapshot
    }

    /// Merge a snapshot into this registry.
    ///
    /// Existing state is kept; the result is the union of both. Returns the
    /// number of pairs that were new.
    pub fn restore(&self, snapshot: &Snapshot) -> usize {
        snapshot
            .pairs()
            .filter(|(topic, subscriber)| self.add_subscription(topic, subscriber))
            .count()
    }

    /// Number of topics with at least one subscriber
    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }

    /// Total number of (topic, subscriber) pairs
    pub fn subscription_count(&self) -> usize {
        self.topics.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
