//! fieldnode - network-provisioned field sensor node.
//!
//! A node derives its identity from a network hardware address, obtains
//! its channel count and sampling period from a provisioning service over
//! the broker, and then publishes one telemetry record per period:
//!
//! - [`identity`] - Node identity from the hardware address
//! - [`clock`] - Wall-clock source and timestamp format
//! - [`provisioning`] - Configuration acquisition (grace window, announcement)
//! - [`sampler`] - Analog sources and the sampling engine
//! - [`publisher`] - Telemetry record publishing
//! - [`scheduler`] - The main loop
//! - [`config`] - Local configuration file (JSON5)
//! - [`args`] - CLI arguments
//! - [`demo`] - In-process demo with a simulated provisioning service
//! - [`error`] - Error types

pub mod args;
pub mod clock;
pub mod config;
pub mod demo;
pub mod error;
pub mod identity;
pub mod provisioning;
pub mod publisher;
pub mod sampler;
pub mod scheduler;

pub use args::NodeArgs;
pub use clock::{Clock, SystemClock, format_timestamp};
pub use config::{ChannelBinding, FieldNodeConfig, SamplingConfig, SourceConfig};
pub use error::{NodeError, Result};
pub use identity::NodeIdentity;
pub use provisioning::{Acquisition, AcquisitionPath, acquire_config};
pub use publisher::TelemetryPublisher;
pub use sampler::{AnalogSource, ConfiguredSource, Sampler, SimulatedAdc, SysfsAdc};
pub use scheduler::{Node, NodeStats, Step};
