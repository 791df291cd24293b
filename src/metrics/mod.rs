//! Prometheus metrics for FastSub
//!
//! Exposes broker and cluster sync counters at the /metrics endpoint.

use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry};

mod server;

pub use server::MetricsServer;

/// All FastSub metrics in one place
#[derive(Clone)]
pub struct Metrics {
    pub registry: Registry,

    // Datagram metrics
    pub datagrams_received_total: IntCounter,
    pub datagrams_discarded_total: IntCounterVec,

    // Subscription metrics
    pub subscriptions_total: IntCounter,
    pub topics_current: IntGauge,

    // Publish/delivery metrics
    pub publishes_total: IntCounter,
    pub deliveries_sent_total: IntCounter,
    pub deliveries_failed_total: IntCounter,

    // Cluster sync metrics
    pub sync_pushes_sent_total: IntCounter,
    pub sync_push_failures_total: IntCounter,
    pub sync_requests_received_total: IntCounterVec,
    pub bootstrap_subscriptions: IntGauge,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let datagrams_received_total = IntCounter::with_opts(Opts::new(
            "fastsub_datagrams_received_total",
            "Total datagrams received on the broker socket",
        ))
        .unwrap();

        let datagrams_discarded_total = IntCounterVec::new(
            Opts::new(
                "fastsub_datagrams_discarded_total",
                "Datagrams discarded without processing",
            ),
            &["reason"],
        )
        .unwrap();

        let subscriptions_total = IntCounter::with_opts(Opts::new(
            "fastsub_subscriptions_total",
            "Total SUB requests accepted from local clients",
        ))
        .unwrap();

        let topics_current = IntGauge::with_opts(Opts::new(
            "fastsub_topics_current",
            "Topics with at least one subscriber",
        ))
        .unwrap();

        let publishes_total = IntCounter::with_opts(Opts::new(
            "fastsub_publishes_total",
            "Total PUB requests received",
        ))
        .unwrap();

        let deliveries_sent_total = IntCounter::with_opts(Opts::new(
            "fastsub_deliveries_sent_total",
            "MSG datagrams sent to subscribers",
        ))
        .unwrap();

        let deliveries_failed_total = IntCounter::with_opts(Opts::new(
            "fastsub_deliveries_failed_total",
            "MSG deliveries that could not be sent",
        ))
        .unwrap();

        let sync_pushes_sent_total = IntCounter::with_opts(Opts::new(
            "fastsub_sync_pushes_sent_total",
            "PUSH updates delivered to cluster nodes",
        ))
        .unwrap();

        let sync_push_failures_total = IntCounter::with_opts(Opts::new(
            "fastsub_sync_push_failures_total",
            "PUSH updates that failed to reach a cluster node",
        ))
        .unwrap();

        let sync_requests_received_total = IntCounterVec::new(
            Opts::new(
                "fastsub_sync_requests_received_total",
                "Inbound cluster sync requests by command",
            ),
            &["command"],
        )
        .unwrap();

        let bootstrap_subscriptions = IntGauge::with_opts(Opts::new(
            "fastsub_bootstrap_subscriptions",
            "Subscriptions restored by the startup PULL",
        ))
        .unwrap();

        registry
            .register(Box::new(datagrams_received_total.clone()))
            .unwrap();
        registry
            .register(Box::new(datagrams_discarded_total.clone()))
            .unwrap();
        registry
            .register(Box::new(subscriptions_total.clone()))
            .unwrap();
        registry.register(Box::new(topics_current.clone())).unwrap();
        registry.register(Box::new(publishes_total.clone())).unwrap();
        registry
            .register(Box::new(deliveries_sent_total.clone()))
            .unwrap();
        registry
            .register(Box::new(deliveries_failed_total.clone()))
            .unwrap();
        registry
            .register(Box::new(sync_pushes_sent_total.clone()))
            .unwrap();
        registry
            .register(Box::new(sync_push_failures_total.clone()))
            .unwrap();
        registry
            .register(Box::new(sync_requests_received_total.clone()))
            .unwrap();
        registry
            .register(Box::new(bootstrap_subscriptions.clone()))
            .unwrap();

        Metrics {
            registry,
            datagrams_received_total,
            datagrams_discarded_total,
            subscriptions_total,
            topics_current,
            publishes_total,
            deliveries_sent_total,
            deliveries_failed_total,
            sync_pushes_sent_total,
            sync_push_failures_total,
            sync_requests_received_total,
            bootstrap_subscriptions,
        }
    }

    // Broker helpers

    pub fn datagram_received(&self) {
        self.datagrams_received_total.inc();
    }

    pub fn datagram_discarded(&self, reason: &str) {
        self.datagrams_discarded_total
            .with_label_values(&[reason])
            .inc();
    }

    pub fn subscription_accepted(&self, topic_count: usize) {
        self.subscriptions_total.inc();
        self.topics_current.set(topic_count as i64);
    }

    /// Topic gauge only, for subscriptions learned from other nodes
    pub fn topics_changed(&self, topic_count: usize) {
        self.topics_current.set(topic_count as i64);
    }

    pub fn publish_received(&self) {
        self.publishes_total.inc();
    }

    pub fn delivery_sent(&self) {
        self.deliveries_sent_total.inc();
    }

    pub fn delivery_failed(&self) {
        self.deliveries_failed_total.inc();
    }

    // Cluster helpers

    pub fn sync_push_sent(&self) {
        self.sync_pushes_sent_total.inc();
    }

    pub fn sync_push_failed(&self) {
        self.sync_push_failures_total.inc();
    }

    pub fn sync_request_received(&self, command: &str) {
        self.sync_requests_received_total
            .with_label_values(&[command])
            .inc();
    }

    pub fn bootstrap_completed(&self, restored: usize, topic_count: usize) {
        self.bootstrap_subscriptions.set(restored as i64);
        self.topics_current.set(topic_count as i64);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
