use serde::{Deserialize, Serialize};

/// Broker transport selection.
///
/// Tagged by `type` in the configuration file:
///
/// ```json5
/// transport: { type: "mqtt", host: "192.168.31.90", port: 1884 }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportConfig {
    /// MQTT broker connection.
    Mqtt(MqttConfig),
    /// Zenoh session.
    Zenoh(ZenohConfig),
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig::Mqtt(MqttConfig::default())
    }
}

impl TransportConfig {
    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            TransportConfig::Mqtt(_) => "mqtt",
            TransportConfig::Zenoh(_) => "zenoh",
        }
    }
}

/// MQTT broker connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MqttConfig {
    /// Broker host name or address.
    #[serde(default = "default_mqtt_host")]
    pub host: String,

    /// Broker TCP port.
    #[serde(default = "default_mqtt_port")]
    pub port: u16,

    /// Optional username.
    #[serde(default)]
    pub username: Option<String>,

    /// Optional password (only used together with `username`).
    #[serde(default)]
    pub password: Option<String>,

    /// MQTT keep-alive interval in seconds.
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,

    /// How long a single connect attempt may take before it counts as failed.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Capacity of the outgoing request queue.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

fn default_mqtt_host() -> String {
    "localhost".to_string()
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_keep_alive_secs() -> u64 {
    15
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

fn default_capacity() -> usize {
    10
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: default_mqtt_host(),
            port: default_mqtt_port(),
            username: None,
            password: None,
            keep_alive_secs: default_keep_alive_secs(),
            connect_timeout_ms: default_connect_timeout_ms(),
            capacity: default_capacity(),
        }
    }
}

/// Zenoh connection configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ZenohConfig {
    /// Zenoh mode: "client", "peer", or "router".
    #[serde(default = "default_mode")]
    pub mode: String,

    /// Endpoints to connect to (for client mode).
    #[serde(default)]
    pub connect: Vec<String>,

    /// Endpoints to listen on (for peer/router mode).
    #[serde(default)]
    pub listen: Vec<String>,

    /// Prefix prepended to logical topics to form key expressions.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

fn default_mode() -> String {
    "peer".to_string()
}

fn default_key_prefix() -> String {
    "fieldnode".to_string()
}

impl Default for ZenohConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            connect: Vec::new(),
            listen: Vec::new(),
            key_prefix: default_key_prefix(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format (default).
    #[default]
    Text,
    /// Structured JSON format.
    Json,
}

/// Common logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format: "text" or "json".
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}
