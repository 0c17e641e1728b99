//! Demo mode.
//!
//! Runs a complete node against an in-process broker, with a simulated
//! provisioning service answering first-connect announcements and a
//! simulated analog source. No network or hardware is needed.

use std::time::Duration;

use fieldnode_common::{CHANNELS_FIELD, SAMPLING_PERIOD_FIELD, Topics};
use fieldnode_transport::{MemoryBroker, Session};
use tracing::{debug, info};

use crate::clock::SystemClock;
use crate::config::FieldNodeConfig;
use crate::identity::NodeIdentity;
use crate::sampler::SimulatedAdc;
use crate::scheduler::Node;

/// Identity used in demo mode unless one is given.
pub const DEMO_NODE_ID: &str = "AABBCCDDEEFF";

/// Session identity of the simulated provisioning service.
pub const SERVICE_CLIENT_ID: &str = "provisioning-service";

/// Answers first-connect announcements with a retained configuration.
#[derive(Debug, Clone)]
pub struct ProvisioningService {
    broker: MemoryBroker,
    topics: Topics,
    channels: u64,
    sampling_period_ms: u64,
    poll: Duration,
}

impl ProvisioningService {
    /// Create a service that assigns 2 channels every 1000 ms.
    pub fn new(broker: MemoryBroker, topics: Topics) -> Self {
        Self {
            broker,
            topics,
            channels: 2,
            sampling_period_ms: 1000,
            poll: Duration::from_millis(50),
        }
    }

    /// Set the configuration handed to every node.
    pub fn with_assignment(mut self, channels: u64, sampling_period_ms: u64) -> Self {
        self.channels = channels;
        self.sampling_period_ms = sampling_period_ms;
        self
    }

    /// Configuration message body.
    pub fn assignment_payload(&self) -> Vec<u8> {
        let mut body = serde_json::Map::new();
        body.insert(CHANNELS_FIELD.to_string(), self.channels.into());
        body.insert(SAMPLING_PERIOD_FIELD.to_string(), self.sampling_period_ms.into());
        serde_json::Value::Object(body).to_string().into_bytes()
    }

    /// Serve announcements until the task is dropped.
    pub async fn run(self) {
        let mut session = Session::new(self.broker.transport(), SERVICE_CLIENT_ID);
        session.ensure_connected().await;
        if let Err(e) = session.subscribe(&self.topics.first_connect).await {
            debug!(error = %e, "Subscribe deferred to reconnect");
        }

        info!(topic = %self.topics.first_connect, "Provisioning service listening");

        loop {
            if !session.is_usable() {
                session.ensure_connected().await;
            }
            let Some(message) = session.service(self.poll).await else {
                continue;
            };
            if message.topic != self.topics.first_connect {
                continue;
            }

            let node_id = message.payload_str().trim().to_string();
            if node_id.is_empty() {
                continue;
            }

            let topic = self.topics.config_topic(&node_id);
            self.broker.retain(&topic, self.assignment_payload());
            info!(
                node_id = %node_id,
                topic = %topic,
                channels = self.channels,
                sampling_period_ms = self.sampling_period_ms,
                "Provisioned node"
            );
        }
    }
}

/// Run a node and the provisioning service together, forever.
///
/// Nothing reads the broker's publish log here, so it is switched off.
pub async fn run_demo(settings: &FieldNodeConfig, identity: NodeIdentity) {
    let broker = MemoryBroker::with_log_capacity(0);
    let service = ProvisioningService::new(broker.clone(), settings.topics.clone());

    let node = async {
        let clock = SystemClock::local();
        let mut node =
            Node::bootstrap(broker.transport(), identity, SimulatedAdc::new(), clock, settings).await;
        node.run().await;
    };

    tokio::select! {
        _ = service.run() => {}
        _ = node => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldnode_common::NodeConfig;

    #[test]
    fn test_assignment_payload_decodes() {
        let service = ProvisioningService::new(MemoryBroker::new(), Topics::default())
            .with_assignment(3, 5000);
        let config = NodeConfig::from_message(&service.assignment_payload()).unwrap();
        assert_eq!(config, NodeConfig::new(3, 5000).unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_service_answers_announcement() {
        let broker = MemoryBroker::new();
        let service = ProvisioningService::new(broker.clone(), Topics::default());

        let node = async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            broker.publish("/firstConnect", b"0A1B2C3D4E5F".to_vec());
            tokio::time::sleep(Duration::from_millis(200)).await;
            broker.retained("/config/0A1B2C3D4E5F")
        };

        let retained = tokio::select! {
            _ = service.run() => None,
            retained = node => retained,
        };

        let config = NodeConfig::from_message(&retained.unwrap()).unwrap();
        assert_eq!(config, NodeConfig::new(2, 1000).unwrap());
    }
}
