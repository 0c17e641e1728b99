//! Zenoh transport.
//!
//! Logical topics map onto key expressions under the configured prefix
//! (`/config/AABB` becomes `fieldnode/config/AABB`). Subscriptions are
//! zenoh-ext advanced subscribers with history, so a provisioning service
//! publishing through a caching advanced publisher reaches nodes that
//! subscribe later, the way a retained MQTT message would.

use std::time::Duration;

use fieldnode_common::ZenohConfig;
use fieldnode_common::topics::{from_key_expr, to_key_expr};
use tokio::sync::mpsc;
use tracing::{debug, info};
use zenoh::Session;
use zenoh_ext::{AdvancedSubscriber, AdvancedSubscriberBuilderExt, HistoryConfig};

use crate::error::{Result, TransportError};
use crate::transport::{ConnectionState, InboundMessage, Transport};

/// Open a Zenoh session using the provided configuration.
pub async fn open_session(config: &ZenohConfig) -> Result<Session> {
    let mut zenoh_config = zenoh::Config::default();

    // Set mode
    let mode_str = match config.mode.as_str() {
        "client" | "peer" | "router" => format!("\"{}\"", config.mode),
        other => {
            return Err(TransportError::config(format!(
                "Invalid Zenoh mode: '{}'. Expected 'client', 'peer', or 'router'",
                other
            )));
        }
    };

    zenoh_config
        .insert_json5("mode", &mode_str)
        .map_err(|e| TransportError::config(format!("Failed to set mode: {}", e)))?;

    // Set connect endpoints
    if !config.connect.is_empty() {
        let endpoints_json = serde_json::to_string(&config.connect).map_err(|e| {
            TransportError::config(format!("Failed to serialize connect endpoints: {}", e))
        })?;

        zenoh_config
            .insert_json5("connect/endpoints", &endpoints_json)
            .map_err(|e| TransportError::config(format!("Failed to set connect endpoints: {}", e)))?;
    }

    // Set listen endpoints
    if !config.listen.is_empty() {
        let endpoints_json = serde_json::to_string(&config.listen).map_err(|e| {
            TransportError::config(format!("Failed to serialize listen endpoints: {}", e))
        })?;

        zenoh_config
            .insert_json5("listen/endpoints", &endpoints_json)
            .map_err(|e| TransportError::config(format!("Failed to set listen endpoints: {}", e)))?;
    }

    info!(
        mode = %config.mode,
        connect = ?config.connect,
        listen = ?config.listen,
        "Connecting to Zenoh"
    );

    let session = zenoh::open(zenoh_config).await?;

    info!(zid = %session.zid(), "Connected to Zenoh");

    Ok(session)
}

/// Transport backed by a Zenoh session.
pub struct ZenohTransport {
    config: ZenohConfig,
    session: Option<Session>,
    subscribers: Vec<AdvancedSubscriber<()>>,
    tx: mpsc::UnboundedSender<InboundMessage>,
    rx: mpsc::UnboundedReceiver<InboundMessage>,
}

impl std::fmt::Debug for ZenohTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZenohTransport")
            .field("config", &self.config)
            .field("subscribers", &self.subscribers.len())
            .finish_non_exhaustive()
    }
}

impl ZenohTransport {
    /// Create a transport; the session opens on [`Transport::connect`].
    pub fn new(config: ZenohConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            config,
            session: None,
            subscribers: Vec::new(),
            tx,
            rx,
        }
    }

    /// Key expression for a logical topic.
    pub fn key_expr(&self, topic: &str) -> String {
        to_key_expr(&self.config.key_prefix, topic)
    }

    fn session(&self) -> Result<&Session> {
        self.session
            .as_ref()
            .filter(|s| !s.is_closed())
            .ok_or(TransportError::NotConnected)
    }
}

impl Transport for ZenohTransport {
    fn name(&self) -> &'static str {
        "zenoh"
    }

    fn state(&self) -> ConnectionState {
        match &self.session {
            Some(session) if !session.is_closed() => ConnectionState::Connected,
            _ => ConnectionState::Disconnected,
        }
    }

    async fn connect(&mut self, client_id: &str) -> Result<()> {
        self.subscribers.clear();
        if let Some(old) = self.session.take() {
            let _ = old.close().await;
        }

        let session = open_session(&self.config).await?;
        debug!(client_id = %client_id, zid = %session.zid(), "Zenoh session ready");
        self.session = Some(session);
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str) -> Result<()> {
        let key = self.key_expr(topic);
        let prefix = self.config.key_prefix.clone();
        let tx = self.tx.clone();

        let subscriber = self
            .session()?
            .declare_subscriber(key.clone())
            .history(HistoryConfig::default().detect_late_publishers())
            .callback(move |sample| {
                if let Some(topic) = from_key_expr(&prefix, sample.key_expr().as_str()) {
                    let payload = sample.payload().to_bytes().into_owned();
                    let _ = tx.send(InboundMessage::new(topic, payload));
                }
            })
            .await
            .map_err(|e| TransportError::Subscribe {
                topic: topic.to_string(),
                message: e.to_string(),
            })?;

        debug!(key = %key, "Declared advanced subscriber");
        self.subscribers.push(subscriber);
        Ok(())
    }

    async fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<()> {
        let key = self.key_expr(topic);
        let session = self.session().map_err(|_| TransportError::Publish {
            topic: topic.to_string(),
            message: "not connected".to_string(),
        })?;

        session
            .put(key.as_str(), payload)
            .await
            .map_err(|e| TransportError::Publish {
                topic: topic.to_string(),
                message: e.to_string(),
            })
    }

    async fn poll(&mut self, timeout: Duration) -> Result<Option<InboundMessage>> {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(message) => Ok(message),
            Err(_) if self.state().is_usable() => Ok(None),
            Err(_) => Err(TransportError::NotConnected),
        }
    }
}
