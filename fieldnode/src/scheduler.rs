//! Main scheduling loop.
//!
//! One task does everything: reconnects when the session is down, services
//! the transport in short slices otherwise, and samples and publishes
//! whenever a full period has passed since the last publish. The next
//! publish is measured from the previous one, not from a fixed epoch.

use std::time::Duration;

use fieldnode_common::{NodeConfig, Topics};
use fieldnode_transport::{InboundMessage, Session, Transport};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::clock::{Clock, format_timestamp, wait_for_sync};
use crate::config::FieldNodeConfig;
use crate::identity::NodeIdentity;
use crate::provisioning::{Acquisition, acquire_config};
use crate::publisher::TelemetryPublisher;
use crate::sampler::{AnalogSource, Sampler};

/// Counters kept by a [`Node`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NodeStats {
    /// Sampling cycles started.
    pub cycles: u64,
    /// Records handed to the transport.
    pub published: u64,
    /// Cycles dropped because a read or the publish failed.
    pub dropped: u64,
    /// Reconnections performed by the loop.
    pub reconnects: u64,
}

/// What one loop iteration did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Serviced the transport; no period boundary was reached.
    Idle,
    /// Ran a sampling cycle.
    Sampled,
}

/// A configured node and everything its loop needs.
///
/// Built once at startup; the identity and configuration never change
/// afterwards, including across reconnects.
#[derive(Debug)]
pub struct Node<T: Transport, S: AnalogSource, C: Clock> {
    session: Session<T>,
    identity: NodeIdentity,
    config: NodeConfig,
    config_topic: String,
    sampler: Sampler<S>,
    publisher: TelemetryPublisher,
    clock: C,
    poll_interval: Duration,
    last_upload: Option<Instant>,
    stats: NodeStats,
}

impl<T: Transport, S: AnalogSource, C: Clock> Node<T, S, C> {
    /// Assemble a node from an already acquired configuration.
    ///
    /// `topics` names the configuration topic the node keeps watching.
    pub fn new(
        session: Session<T>,
        identity: NodeIdentity,
        config: NodeConfig,
        topics: &Topics,
        sampler: Sampler<S>,
        publisher: TelemetryPublisher,
        clock: C,
    ) -> Self {
        let config_topic = topics.config_topic(identity.as_str());
        Self {
            session,
            identity,
            config,
            config_topic,
            sampler,
            publisher,
            clock,
            poll_interval: Duration::from_millis(10),
            last_upload: None,
            stats: NodeStats::default(),
        }
    }

    /// Set the upper bound of one transport service call.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Start a node: wait for the clock, connect, then acquire the
    /// configuration from the broker.
    ///
    /// Never gives up. Returns once the node is configured.
    pub async fn bootstrap(
        transport: T,
        identity: NodeIdentity,
        source: S,
        clock: C,
        settings: &FieldNodeConfig,
    ) -> Self {
        wait_for_sync(
            &clock,
            settings.clock.min_sync_year,
            settings.clock.sync_poll(),
        )
        .await;

        let mut session = Session::new(transport, identity.as_str())
            .with_retry_delay(settings.schedule.reconnect_delay());
        session.ensure_connected().await;

        let Acquisition {
            config,
            path,
            ignored,
            elapsed,
        } = acquire_config(&mut session, &identity, &settings.topics, &settings.provisioning).await;

        info!(
            node_id = %identity,
            channels = config.channel_count(),
            sampling_period_ms = config.sampling_period_ms(),
            path = ?path,
            ignored,
            elapsed_ms = elapsed.as_millis() as u64,
            "Node configured"
        );

        let sampler = Sampler::from_config(source, &settings.sampling);
        let publisher = TelemetryPublisher::new(
            identity.as_str(),
            settings.topics.telemetry.clone(),
            settings.format,
        );
        Self::new(
            session,
            identity,
            config,
            &settings.topics,
            sampler,
            publisher,
            clock,
        )
        .with_poll_interval(settings.schedule.poll_interval())
    }

    /// Node identity.
    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    /// Topic on which configuration messages arrive.
    pub fn config_topic(&self) -> &str {
        &self.config_topic
    }

    /// Operating parameters.
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Get a reference to the session.
    pub fn session(&self) -> &Session<T> {
        &self.session
    }

    /// Loop counters.
    pub fn stats(&self) -> NodeStats {
        self.stats
    }

    /// When the last sampling cycle started.
    pub fn last_upload(&self) -> Option<Instant> {
        self.last_upload
    }

    /// Run one loop iteration.
    pub async fn step(&mut self) -> Step {
        if !self.session.is_usable() {
            self.session.ensure_connected().await;
            self.stats.reconnects += 1;
        } else if let Some(message) = self.session.service(self.poll_interval).await {
            self.handle_inbound(&message);
        }

        let now = Instant::now();
        let period = self.config.sampling_period();
        let due = self
            .last_upload
            .is_none_or(|last| now.duration_since(last) >= period);

        if !due {
            return Step::Idle;
        }

        self.last_upload = Some(now);
        self.sample_and_publish().await;
        Step::Sampled
    }

    /// Run the loop forever.
    pub async fn run(&mut self) {
        info!(
            node_id = %self.identity,
            channels = self.config.channel_count(),
            sampling_period_ms = self.config.sampling_period_ms(),
            topic = %self.publisher.topic(),
            "Sampling started"
        );

        loop {
            self.step().await;
        }
    }

    async fn sample_and_publish(&mut self) {
        self.stats.cycles += 1;

        let samples = match self.sampler.sample(self.config.channel_count()) {
            Ok(samples) => samples,
            Err(e) => {
                self.stats.dropped += 1;
                warn!(error = %e, "Sampling failed, skipping cycle");
                return;
            }
        };

        let timestamp = format_timestamp(&self.clock.now());
        match self
            .publisher
            .publish(&mut self.session, timestamp, &samples)
            .await
        {
            Ok(()) => self.stats.published += 1,
            Err(e) => {
                // Transport failures were already logged by the session.
                self.stats.dropped += 1;
                debug!(error = %e, "Telemetry dropped");
            }
        }
    }

    fn handle_inbound(&self, message: &InboundMessage) {
        if message.topic == self.config_topic {
            info!(
                payload = %message.payload_str(),
                "Configuration message ignored, node is already configured"
            );
        } else {
            debug!(topic = %message.topic, "Ignoring message on unrelated topic");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::config::ChannelBinding;
    use crate::error::{NodeError, Result};
    use fieldnode_common::{Format, MAX_CHANNELS};
    use fieldnode_transport::{MemoryBroker, MemoryTransport};

    struct FlakySource {
        fail_every: u64,
        reads: u64,
    }

    impl AnalogSource for FlakySource {
        fn name(&self) -> &'static str {
            "flaky"
        }

        fn read(&mut self, input: u16) -> Result<u16> {
            self.reads += 1;
            if self.reads % self.fail_every == 0 {
                Err(NodeError::sampling(input, "timeout"))
            } else {
                Ok(2048)
            }
        }
    }

    async fn node(
        broker: &MemoryBroker,
        source: FlakySource,
        channels: u64,
        period_ms: u64,
    ) -> Node<MemoryTransport, FlakySource, SystemClock> {
        node_with_topics(broker, source, channels, period_ms, &Topics::default()).await
    }

    async fn node_with_topics(
        broker: &MemoryBroker,
        source: FlakySource,
        channels: u64,
        period_ms: u64,
        topics: &Topics,
    ) -> Node<MemoryTransport, FlakySource, SystemClock> {
        let identity = NodeIdentity::parse("AABBCCDDEEFF").unwrap();
        let mut session = Session::new(broker.transport(), identity.as_str());
        session.ensure_connected().await;
        session
            .subscribe(&topics.config_topic(identity.as_str()))
            .await
            .unwrap();

        Node::new(
            session,
            identity,
            NodeConfig::new(channels, period_ms).unwrap(),
            topics,
            Sampler::new(source, [ChannelBinding::default(); MAX_CHANNELS]),
            TelemetryPublisher::new("AABBCCDDEEFF", "/temp", Format::Json),
            SystemClock::local(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_iteration_samples() {
        let broker = MemoryBroker::new();
        let source = FlakySource { fail_every: u64::MAX, reads: 0 };
        let mut node = node(&broker, source, 2, 1000).await;

        assert_eq!(node.step().await, Step::Sampled);
        assert_eq!(node.step().await, Step::Idle);
        assert_eq!(broker.published("/temp").len(), 1);
        assert_eq!(node.stats().published, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_failure_keeps_cadence() {
        let broker = MemoryBroker::new();
        // Every third read fails: with 3 channels every cycle's last read fails.
        let source = FlakySource { fail_every: 3, reads: 0 };
        let mut node = node(&broker, source, 3, 100).await;

        let start = Instant::now();
        while start.elapsed() < Duration::from_millis(1000) {
            node.step().await;
        }

        let stats = node.stats();
        assert_eq!(stats.cycles, 10);
        assert_eq!(stats.dropped, 10);
        assert!(broker.published("/temp").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_config_message_is_ignored() {
        let broker = MemoryBroker::new();
        let source = FlakySource { fail_every: u64::MAX, reads: 0 };
        let mut node = node(&broker, source, 1, 1000).await;

        broker.publish("/config/AABBCCDDEEFF", br#"{"channels":4,"samplingPeriod":10}"#.to_vec());
        node.step().await;
        node.step().await;

        assert_eq!(node.session().stats().received, 1);
        assert_eq!(node.config().channel_count(), 1);
        assert_eq!(node.config().sampling_period_ms(), 1000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_config_topic_follows_prefix() {
        let broker = MemoryBroker::new();
        let source = FlakySource { fail_every: u64::MAX, reads: 0 };
        let topics = Topics {
            config_prefix: "site1/config/".to_string(),
            ..Topics::default()
        };
        let mut node = node_with_topics(&broker, source, 1, 1000, &topics).await;
        assert_eq!(node.config_topic(), "site1/config/AABBCCDDEEFF");

        broker.publish("site1/config/AABBCCDDEEFF", br#"{"channels":4,"samplingPeriod":10}"#.to_vec());
        node.step().await;
        node.step().await;

        assert_eq!(node.session().stats().received, 1);
        assert_eq!(node.config().channel_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_counted() {
        let broker = MemoryBroker::new();
        let source = FlakySource { fail_every: u64::MAX, reads: 0 };
        let mut node = node(&broker, source, 1, 1000).await;

        node.step().await;
        broker.disconnect_all();
        node.step().await;
        node.step().await;

        assert_eq!(node.stats().reconnects, 1);
        assert!(node.session().is_usable());
    }
}
