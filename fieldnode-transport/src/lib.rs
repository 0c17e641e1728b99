//! fieldnode Transport Library
//!
//! Broker connectivity for fieldnode sensor nodes:
//!
//! - [`transport`] - The [`Transport`] trait and connection state
//! - [`session`] - Reconnect-forever [`Session`] with re-subscription
//! - [`mqtt`] - MQTT backend over `rumqttc`
//! - [`zenoh_transport`] - Zenoh backend with history-aware subscriptions
//! - [`memory`] - In-process broker for demo mode and tests
//! - [`error`] - Error types
//!
//! # Example
//!
//! ```ignore
//! use fieldnode_transport::{MqttTransport, Session};
//!
//! let mut session = Session::new(MqttTransport::new(config.mqtt), "AABBCCDDEEFF");
//! session.ensure_connected().await;
//! session.subscribe("/config/AABBCCDDEEFF").await?;
//! ```

pub mod error;
pub mod memory;
pub mod mqtt;
pub mod session;
pub mod transport;
pub mod zenoh_transport;

pub use error::{Result, TransportError};
pub use memory::{DEFAULT_LOG_CAPACITY, MemoryBroker, MemoryTransport, PublishedMessage};
pub use mqtt::MqttTransport;
pub use session::{DEFAULT_RETRY_DELAY, Session, SessionStats};
pub use transport::{ConnectionState, InboundMessage, Transport};
pub use zenoh_transport::ZenohTransport;
