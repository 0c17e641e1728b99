//! Reconnecting broker session.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::transport::{ConnectionState, InboundMessage, Transport};

/// Default delay between connect attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(2000);

/// Counters kept by a [`Session`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    /// Successful connects, including the first one.
    pub connects: u64,
    /// Failed connect attempts.
    pub failed_attempts: u64,
    /// Publishes handed to the transport.
    pub published: u64,
    /// Publishes the transport refused.
    pub publish_failures: u64,
    /// Inbound messages delivered.
    pub received: u64,
}

/// A transport plus the policy that keeps it connected.
///
/// The session remembers every topic it was asked to subscribe to and
/// subscribes again after each successful reconnect.
#[derive(Debug)]
pub struct Session<T: Transport> {
    transport: T,
    client_id: String,
    subscriptions: Vec<String>,
    retry_delay: Duration,
    stats: SessionStats,
}

impl<T: Transport> Session<T> {
    /// Create a session that connects as `client_id`.
    pub fn new(transport: T, client_id: impl Into<String>) -> Self {
        Self {
            transport,
            client_id: client_id.into(),
            subscriptions: Vec::new(),
            retry_delay: DEFAULT_RETRY_DELAY,
            stats: SessionStats::default(),
        }
    }

    /// Set the delay between connect attempts.
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Session identity presented to the broker.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Current connection state of the transport.
    pub fn state(&self) -> ConnectionState {
        self.transport.state()
    }

    /// Whether publishes can currently go through.
    pub fn is_usable(&self) -> bool {
        self.state().is_usable()
    }

    /// Topics re-subscribed after every reconnect.
    pub fn subscriptions(&self) -> &[String] {
        &self.subscriptions
    }

    /// Session counters.
    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Get a reference to the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Connect, retrying forever with a fixed delay.
    ///
    /// Returns immediately when already connected. Each failed attempt is
    /// logged with its reason; none of them is ever escalated.
    pub async fn ensure_connected(&mut self) {
        while !self.is_usable() {
            info!(
                client_id = %self.client_id,
                transport = self.transport.name(),
                "Attempting broker connection"
            );

            match self.transport.connect(&self.client_id).await {
                Ok(()) => {
                    self.stats.connects += 1;
                    info!(client_id = %self.client_id, "Connected to broker");
                    self.resubscribe().await;
                }
                Err(e) => {
                    self.stats.failed_attempts += 1;
                    warn!(
                        error = %e,
                        retry_in_ms = self.retry_delay.as_millis() as u64,
                        "Broker connection failed, retrying"
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
            }
        }
    }

    async fn resubscribe(&mut self) {
        for topic in &self.subscriptions {
            match self.transport.subscribe(topic).await {
                Ok(()) => debug!(topic = %topic, "Subscribed"),
                Err(e) => warn!(topic = %topic, error = %e, "Failed to subscribe"),
            }
        }
    }

    /// Subscribe to a topic now (if connected) and after every reconnect.
    pub async fn subscribe(&mut self, topic: &str) -> Result<()> {
        if !self.subscriptions.iter().any(|s| s == topic) {
            self.subscriptions.push(topic.to_string());
        }
        if !self.is_usable() {
            return Ok(());
        }
        self.transport.subscribe(topic).await?;
        debug!(topic = %topic, "Subscribed");
        Ok(())
    }

    /// Fire-and-forget publish.
    ///
    /// A failure is counted and logged; the next reconnection check is what
    /// recovers from it.
    pub async fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<()> {
        match self.transport.publish(topic, payload).await {
            Ok(()) => {
                self.stats.published += 1;
                Ok(())
            }
            Err(e) => {
                self.stats.publish_failures += 1;
                warn!(topic = %topic, error = %e, "Publish failed");
                Err(e)
            }
        }
    }

    /// Service the transport for at most `timeout`.
    ///
    /// Returns the next inbound message if one arrived. Connection loss is
    /// logged and leaves the session unusable until
    /// [`ensure_connected`](Self::ensure_connected) runs again.
    pub async fn service(&mut self, timeout: Duration) -> Option<InboundMessage> {
        match self.transport.poll(timeout).await {
            Ok(Some(message)) => {
                self.stats.received += 1;
                debug!(topic = %message.topic, bytes = message.payload.len(), "Message received");
                Some(message)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, state = %self.state(), "Broker session lost");
                None
            }
        }
    }
}
