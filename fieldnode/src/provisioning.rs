//! Configuration acquisition.
//!
//! A node learns its channel count and sampling period from the broker:
//!
//! 1. Subscribe to `/config/<id>`.
//! 2. Service the session for a grace window so a retained configuration
//!    can arrive on its own.
//! 3. If none did, announce the identity on `/firstConnect`.
//! 4. Keep servicing the session until a usable configuration arrives.
//!
//! There is no timeout: a node that has no configuration never samples.

use std::time::Duration;

use fieldnode_common::{NodeConfig, Topics};
use fieldnode_transport::{InboundMessage, Session, Transport};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::ProvisioningConfig;
use crate::identity::NodeIdentity;

/// How a configuration was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionPath {
    /// Arrived inside the grace window, without announcing.
    Retained,
    /// Arrived after the first-connect announcement.
    Announced,
}

/// Result of [`acquire_config`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Acquisition {
    /// The accepted configuration.
    pub config: NodeConfig,
    /// Whether the announcement was needed.
    pub path: AcquisitionPath,
    /// Messages on the configuration topic that were ignored.
    pub ignored: u32,
    /// Time from start of acquisition to acceptance.
    pub elapsed: Duration,
}

struct Acquirer<'a> {
    topic: String,
    identity: &'a NodeIdentity,
    ignored: u32,
}

impl Acquirer<'_> {
    /// Accept a message if it is a complete, in-range configuration.
    fn accept(&mut self, message: &InboundMessage) -> Option<NodeConfig> {
        if message.topic != self.topic {
            debug!(topic = %message.topic, "Ignoring message on unrelated topic");
            return None;
        }

        match NodeConfig::from_message(&message.payload) {
            Ok(config) => {
                info!(
                    node_id = %self.identity,
                    channels = config.channel_count(),
                    sampling_period_ms = config.sampling_period_ms(),
                    "Configuration received"
                );
                Some(config)
            }
            Err(reason) => {
                self.ignored += 1;
                debug!(
                    topic = %message.topic,
                    payload = %message.payload_str(),
                    reason = %reason,
                    "Ignoring configuration message"
                );
                None
            }
        }
    }

    async fn service<T: Transport>(
        &mut self,
        session: &mut Session<T>,
        timeout: Duration,
    ) -> Option<NodeConfig> {
        if !session.is_usable() {
            session.ensure_connected().await;
        }
        let message = session.service(timeout).await?;
        self.accept(&message)
    }
}

/// Obtain this node's configuration, waiting as long as it takes.
pub async fn acquire_config<T: Transport>(
    session: &mut Session<T>,
    identity: &NodeIdentity,
    topics: &Topics,
    timing: &ProvisioningConfig,
) -> Acquisition {
    let start = Instant::now();
    let mut acquirer = Acquirer {
        topic: topics.config_topic(identity.as_str()),
        identity,
        ignored: 0,
    };

    if let Err(e) = session.subscribe(&acquirer.topic).await {
        // The subscription is recorded and retried after the next reconnect.
        warn!(topic = %acquirer.topic, error = %e, "Failed to subscribe to configuration topic");
    }

    info!(topic = %acquirer.topic, grace_ms = timing.grace_window_ms, "Waiting for retained configuration");

    let grace = timing.grace_window();
    while start.elapsed() < grace {
        let remaining = grace.saturating_sub(start.elapsed());
        if let Some(config) = acquirer.service(session, timing.grace_poll().min(remaining)).await {
            return Acquisition {
                config,
                path: AcquisitionPath::Retained,
                ignored: acquirer.ignored,
                elapsed: start.elapsed(),
            };
        }
    }

    let mut announced = false;
    loop {
        if !announced {
            announced = announce(session, identity, &topics.first_connect).await;
        }

        if let Some(config) = acquirer.service(session, timing.wait_poll()).await {
            return Acquisition {
                config,
                path: AcquisitionPath::Announced,
                ignored: acquirer.ignored,
                elapsed: start.elapsed(),
            };
        }
    }
}

/// Publish the identity on the first-connect topic.
///
/// Returns `false` when the publish did not go through, so the caller can
/// try again once the session is back.
async fn announce<T: Transport>(session: &mut Session<T>, identity: &NodeIdentity, topic: &str) -> bool {
    if !session.is_usable() {
        session.ensure_connected().await;
    }

    match session.publish(topic, identity.as_str().as_bytes().to_vec()).await {
        Ok(()) => {
            info!(topic = %topic, node_id = %identity, "No retained configuration, announced node");
            true
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldnode_transport::MemoryBroker;

    fn identity() -> NodeIdentity {
        NodeIdentity::parse("AABBCCDDEEFF").unwrap()
    }

    async fn connected(broker: &MemoryBroker) -> Session<fieldnode_transport::MemoryTransport> {
        let mut session = Session::new(broker.transport(), "AABBCCDDEEFF");
        session.ensure_connected().await;
        session
    }

    #[tokio::test(start_paused = true)]
    async fn test_retained_config_skips_announcement() {
        let broker = MemoryBroker::new();
        broker.retain("/config/AABBCCDDEEFF", br#"{"channels":1,"samplingPeriod":1000}"#.to_vec());
        let mut session = connected(&broker).await;

        let acquisition =
            acquire_config(&mut session, &identity(), &Topics::default(), &ProvisioningConfig::default()).await;

        assert_eq!(acquisition.path, AcquisitionPath::Retained);
        assert_eq!(acquisition.config, NodeConfig::new(1, 1000).unwrap());
        assert!(acquisition.elapsed < Duration::from_millis(3000));
        assert!(broker.published("/firstConnect").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_announces_after_grace_window() {
        let broker = MemoryBroker::new();
        let mut session = connected(&broker).await;

        let provisioning = {
            let broker = broker.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(4000)).await;
                let announced = broker.published("/firstConnect");
                assert_eq!(announced.len(), 1);
                assert_eq!(announced[0].payload_str(), "AABBCCDDEEFF");
                assert!(announced[0].at.elapsed() < Duration::from_millis(1050));
                broker.retain(
                    "/config/AABBCCDDEEFF",
                    br#"{"channels":3,"samplingPeriod":5000}"#.to_vec(),
                );
            }
        };

        let (id, topics, provisioning_config) = (identity(), Topics::default(), ProvisioningConfig::default());
        let (acquisition, ()) = tokio::join!(
            acquire_config(&mut session, &id, &topics, &provisioning_config),
            provisioning
        );

        assert_eq!(acquisition.path, AcquisitionPath::Announced);
        assert_eq!(acquisition.config.channel_count(), 3);
        assert_eq!(acquisition.config.sampling_period_ms(), 5000);
        assert!(acquisition.elapsed >= Duration::from_millis(4000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_messages_keep_waiting() {
        let broker = MemoryBroker::new();
        let mut session = connected(&broker).await;

        let provisioning = {
            let broker = broker.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(500)).await;
                broker.publish("/config/AABBCCDDEEFF", br#"{"channels":3}"#.to_vec());
                broker.publish("/config/AABBCCDDEEFF", b"hello".to_vec());
                broker.publish("/config/AABBCCDDEEFF", br#"{"channels":17,"samplingPeriod":100}"#.to_vec());
                broker.publish("/config/AABBCCDDEEFF", br#"{"channels":2,"samplingPeriod":0}"#.to_vec());
                tokio::time::sleep(Duration::from_millis(500)).await;
                broker.publish("/config/AABBCCDDEEFF", b"channels: 2, samplingPeriod: 750\n".to_vec());
            }
        };

        let (id, topics, provisioning_config) = (identity(), Topics::default(), ProvisioningConfig::default());
        let (acquisition, ()) = tokio::join!(
            acquire_config(&mut session, &id, &topics, &provisioning_config),
            provisioning
        );

        assert_eq!(acquisition.path, AcquisitionPath::Retained);
        assert_eq!(acquisition.ignored, 4);
        assert_eq!(acquisition.config, NodeConfig::new(2, 750).unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_announcement_retried_after_outage() {
        let broker = MemoryBroker::new();
        let mut session = connected(&broker).await;
        let timing = ProvisioningConfig::default();

        let outage = {
            let broker = broker.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(2990)).await;
                broker.set_online(false);
                tokio::time::sleep(Duration::from_millis(3000)).await;
                broker.set_online(true);
                while broker.published("/firstConnect").is_empty() {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
                broker.publish("/config/AABBCCDDEEFF", br#"{"channels":1,"samplingPeriod":200}"#.to_vec());
            }
        };

        let (id, topics) = (identity(), Topics::default());
        let (acquisition, ()) = tokio::join!(
            acquire_config(&mut session, &id, &topics, &timing),
            outage
        );

        assert_eq!(acquisition.path, AcquisitionPath::Announced);
        assert_eq!(broker.published("/firstConnect").len(), 1);
        assert_eq!(acquisition.config.sampling_period_ms(), 200);
    }
}
