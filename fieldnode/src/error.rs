//! Error types for the node.

use thiserror::Error;

use fieldnode_transport::TransportError;

/// Result type alias using [`NodeError`].
pub type Result<T> = std::result::Result<T, NodeError>;

/// Errors that can occur in a node.
///
/// Only startup problems are surfaced to the caller. Once the scheduling
/// loop runs, every error is logged and the loop carries on.
#[derive(Error, Debug)]
pub enum NodeError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file not found.
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Configuration parse error.
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),

    /// Configuration validation error.
    #[error("Configuration validation failed: {0}")]
    ConfigValidation(String),

    /// Node identity could not be determined.
    #[error("Identity error: {0}")]
    Identity(String),

    /// Analog input could not be read.
    #[error("Failed to read input {input}: {message}")]
    Sampling { input: u16, message: String },

    /// Broker transport error.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl NodeError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a configuration validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ConfigValidation(msg.into())
    }

    /// Create an identity error.
    pub fn identity(msg: impl Into<String>) -> Self {
        Self::Identity(msg.into())
    }

    /// Create a sampling error for an input.
    pub fn sampling(input: u16, msg: impl Into<String>) -> Self {
        Self::Sampling {
            input,
            message: msg.into(),
        }
    }
}

impl From<json5::Error> for NodeError {
    fn from(err: json5::Error) -> Self {
        Self::ConfigParse(err.to_string())
    }
}

impl From<fieldnode_common::Error> for NodeError {
    fn from(err: fieldnode_common::Error) -> Self {
        match err {
            fieldnode_common::Error::Config(msg) => Self::Config(msg),
            other => Self::Serialization(other.to_string()),
        }
    }
}
