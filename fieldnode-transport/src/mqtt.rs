//! MQTT transport over `rumqttc`.
//!
//! The rumqttc [`EventLoop`] is driven from [`Transport::poll`] rather than
//! from a spawned task, so network I/O, keep-alive and message delivery
//! happen on the caller's task between its own periodic work.

use std::time::Duration;

use fieldnode_common::MqttConfig;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, QoS};
use tracing::{debug, trace};

use crate::error::{Result, TransportError};
use crate::transport::{ConnectionState, InboundMessage, Transport};

/// MQTT client driven by its owner.
pub struct MqttTransport {
    config: MqttConfig,
    client: Option<AsyncClient>,
    event_loop: Option<EventLoop>,
    state: ConnectionState,
}

impl std::fmt::Debug for MqttTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttTransport")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl MqttTransport {
    /// Create a disconnected transport for the configured broker.
    pub fn new(config: MqttConfig) -> Self {
        Self {
            config,
            client: None,
            event_loop: None,
            state: ConnectionState::Disconnected,
        }
    }

    /// Broker settings.
    pub fn config(&self) -> &MqttConfig {
        &self.config
    }

    fn options(&self, client_id: &str) -> MqttOptions {
        let mut options = MqttOptions::new(client_id, self.config.host.clone(), self.config.port);
        options.set_keep_alive(Duration::from_secs(self.config.keep_alive_secs));
        options.set_clean_session(true);

        if let (Some(username), Some(password)) = (&self.config.username, &self.config.password) {
            options.set_credentials(username.clone(), password.clone());
        }

        options
    }

    fn drop_session(&mut self) {
        self.client = None;
        self.event_loop = None;
        self.state = ConnectionState::Disconnected;
    }
}

/// Drive the event loop until the broker acknowledges the connection.
async fn await_connack(event_loop: &mut EventLoop) -> Result<()> {
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                return if ack.code == ConnectReturnCode::Success {
                    Ok(())
                } else {
                    Err(TransportError::Rejected(format!("{:?}", ack.code)))
                };
            }
            Ok(event) => trace!(?event, "Event while connecting"),
            Err(e) => return Err(TransportError::connection(e.to_string())),
        }
    }
}

impl Transport for MqttTransport {
    fn name(&self) -> &'static str {
        "mqtt"
    }

    fn state(&self) -> ConnectionState {
        self.state
    }

    async fn connect(&mut self, client_id: &str) -> Result<()> {
        self.drop_session();
        self.state = ConnectionState::Connecting;

        debug!(
            host = %self.config.host,
            port = self.config.port,
            client_id = %client_id,
            "Connecting to MQTT broker"
        );

        let (client, mut event_loop) = AsyncClient::new(self.options(client_id), self.config.capacity);
        let timeout = Duration::from_millis(self.config.connect_timeout_ms);

        let outcome = match tokio::time::timeout(timeout, await_connack(&mut event_loop)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(timeout)),
        };

        match outcome {
            Ok(()) => {
                self.client = Some(client);
                self.event_loop = Some(event_loop);
                self.state = ConnectionState::Connected;
                Ok(())
            }
            Err(e) => {
                self.state = ConnectionState::Disconnected;
                Err(e)
            }
        }
    }

    async fn subscribe(&mut self, topic: &str) -> Result<()> {
        let client = self.client.as_ref().ok_or(TransportError::NotConnected)?;
        client
            .try_subscribe(topic, QoS::AtMostOnce)
            .map_err(|e| TransportError::Subscribe {
                topic: topic.to_string(),
                message: e.to_string(),
            })
    }

    async fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<()> {
        let client = self.client.as_ref().ok_or_else(|| TransportError::Publish {
            topic: topic.to_string(),
            message: "not connected".to_string(),
        })?;

        client
            .try_publish(topic, QoS::AtMostOnce, false, payload)
            .map_err(|e| TransportError::Publish {
                topic: topic.to_string(),
                message: e.to_string(),
            })
    }

    async fn poll(&mut self, timeout: Duration) -> Result<Option<InboundMessage>> {
        let Some(event_loop) = self.event_loop.as_mut() else {
            tokio::time::sleep(timeout).await;
            return Err(TransportError::NotConnected);
        };

        match tokio::time::timeout(timeout, event_loop.poll()).await {
            Err(_) => Ok(None),
            Ok(Ok(Event::Incoming(Packet::Publish(publish)))) => Ok(Some(InboundMessage::new(
                publish.topic.clone(),
                publish.payload.to_vec(),
            ))),
            Ok(Ok(Event::Incoming(Packet::Disconnect))) => {
                self.drop_session();
                Err(TransportError::lost("disconnected by broker"))
            }
            Ok(Ok(event)) => {
                trace!(?event, "MQTT event");
                Ok(None)
            }
            Ok(Err(e)) => {
                self.drop_session();
                Err(TransportError::lost(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_transport_is_disconnected() {
        let transport = MqttTransport::new(MqttConfig::default());
        assert_eq!(transport.state(), ConnectionState::Disconnected);
        assert_eq!(transport.name(), "mqtt");
        assert_eq!(transport.config().port, 1883);
    }

    #[test]
    fn test_options_carry_identity_and_keep_alive() {
        let transport = MqttTransport::new(MqttConfig {
            host: "192.168.31.90".to_string(),
            port: 1884,
            keep_alive_secs: 20,
            ..MqttConfig::default()
        });

        let options = transport.options("AABBCCDDEEFF");
        assert_eq!(options.client_id(), "AABBCCDDEEFF");
        assert_eq!(
            options.broker_address(),
            ("192.168.31.90".to_string(), 1884)
        );
        assert_eq!(options.keep_alive(), Duration::from_secs(20));
    }

    #[tokio::test]
    async fn test_publish_requires_connection() {
        let mut transport = MqttTransport::new(MqttConfig::default());
        let result = transport.publish("/temp", b"{}".to_vec()).await;
        assert!(matches!(result, Err(TransportError::Publish { .. })));
        assert!(matches!(
            transport.subscribe("/config/01").await,
            Err(TransportError::NotConnected)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_without_connection() {
        let mut transport = MqttTransport::new(MqttConfig::default());
        let result = transport.poll(Duration::from_millis(10)).await;
        assert!(matches!(result, Err(TransportError::NotConnected)));
    }
}
