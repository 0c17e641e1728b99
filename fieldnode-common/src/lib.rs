//! fieldnode Common Library
//!
//! Shared types and utilities for fieldnode sensor nodes and the services
//! that provision them:
//!
//! - [`telemetry`] - Sample sets and the telemetry record published on `/temp`
//! - [`node_config`] - Operating parameters and the configuration message decoder
//! - [`topics`] - Topic names and key expression mapping
//! - [`serialization`] - JSON/CBOR payload encoding
//! - [`config`] - Shared configuration sections (JSON5 format)
//! - [`error`] - Error types

pub mod config;
pub mod error;
pub mod node_config;
pub mod serialization;
pub mod telemetry;
pub mod topics;

// Re-export commonly used types at the crate root
pub use config::{LogFormat, LoggingConfig, MqttConfig, TransportConfig, ZenohConfig};
pub use error::{Error, Result};
pub use node_config::{CHANNELS_FIELD, ConfigRejection, NodeConfig, SAMPLING_PERIOD_FIELD};
pub use serialization::{Format, encode};
pub use telemetry::{MAX_CHANNELS, SampleSet, TelemetryRecord, channel_label};
pub use topics::Topics;

/// Initialize tracing with the given configuration.
///
/// `RUST_LOG` takes precedence over the configured level. Supports two
/// output formats:
/// - `LogFormat::Text` (default): Human-readable text format
/// - `LogFormat::Json`: Structured JSON format for log aggregation systems
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
    }

    Ok(())
}
