//! Error types for broker transports.

use std::time::Duration;

use thiserror::Error;

/// Result type alias using [`TransportError`].
pub type Result<T> = std::result::Result<T, TransportError>;

/// Errors raised by a transport or a session.
///
/// None of these are fatal to a node: the session treats every connection
/// problem as recoverable and retries.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Transport configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network or broker unreachable.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Broker answered the connect request with a refusal.
    #[error("Connection rejected by broker: {0}")]
    Rejected(String),

    /// Connect attempt did not complete in time.
    #[error("Connection attempt timed out after {0:?}")]
    Timeout(Duration),

    /// An established connection dropped.
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// Operation requires a connected session.
    #[error("Not connected")]
    NotConnected,

    /// Subscribe request could not be queued.
    #[error("Failed to subscribe to {topic}: {message}")]
    Subscribe { topic: String, message: String },

    /// Publish request could not be queued.
    #[error("Failed to publish to {topic}: {message}")]
    Publish { topic: String, message: String },

    /// Zenoh session could not be opened.
    #[error("Zenoh session error: {0}")]
    ZenohSession(String),
}

impl TransportError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a connection-lost error.
    pub fn lost(msg: impl Into<String>) -> Self {
        Self::ConnectionLost(msg.into())
    }
}

impl From<zenoh::Error> for TransportError {
    fn from(err: zenoh::Error) -> Self {
        Self::ZenohSession(err.to_string())
    }
}
