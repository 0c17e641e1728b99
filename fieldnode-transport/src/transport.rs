//! The seam between a node and its message broker.

use std::fmt;
use std::time::Duration;

use crate::error::Result;

/// Connection state of a transport.
///
/// Owned by the transport; everything else only asks whether the session
/// is usable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No connection, or the last one was lost.
    #[default]
    Disconnected,
    /// A connect attempt is in progress.
    Connecting,
    /// Connected and able to publish and receive.
    Connected,
}

impl ConnectionState {
    /// Get the string representation used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        }
    }

    /// Whether publishes and subscriptions can go through.
    pub fn is_usable(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A message delivered on a subscribed topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Logical topic the message arrived on.
    pub topic: String,
    /// Raw payload.
    pub payload: Vec<u8>,
}

impl InboundMessage {
    /// Create a new inbound message.
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    /// Payload as text, replacing invalid UTF-8.
    pub fn payload_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

/// A publish/subscribe transport driven from a single task.
///
/// Implementations never run background work of their own: network I/O,
/// keep-alive and delivery of inbound messages all happen inside
/// [`poll`](Transport::poll), so the caller decides when the transport
/// gets serviced.
#[allow(async_fn_in_trait)]
pub trait Transport {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Current connection state.
    fn state(&self) -> ConnectionState;

    /// Open a connection using `client_id` as the session identity.
    ///
    /// Any previous connection and its subscriptions are discarded.
    async fn connect(&mut self, client_id: &str) -> Result<()>;

    /// Subscribe to a topic on the current connection.
    async fn subscribe(&mut self, topic: &str) -> Result<()>;

    /// Publish a payload, without waiting for any acknowledgment.
    async fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<()>;

    /// Service the connection for at most `timeout`.
    ///
    /// Returns the next inbound message if one arrives in time. An error
    /// means the connection is gone and [`state`](Transport::state) no
    /// longer reports `Connected`.
    async fn poll(&mut self, timeout: Duration) -> Result<Option<InboundMessage>>;
}
