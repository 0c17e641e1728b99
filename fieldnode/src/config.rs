//! Local configuration file for a node.
//!
//! These are deployment settings only. Channel count and sampling period
//! always come from the provisioning service over the broker.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use fieldnode_common::{Format, LoggingConfig, MAX_CHANNELS, Topics, TransportConfig};

use crate::error::{NodeError, Result};
use crate::identity::{AUTO_NODE_ID, NodeIdentity};

/// Complete node configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldNodeConfig {
    /// Broker connection settings.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Node identity settings.
    #[serde(default)]
    pub node: NodeSection,

    /// Topic names.
    #[serde(default)]
    pub topics: Topics,

    /// Configuration acquisition timing.
    #[serde(default)]
    pub provisioning: ProvisioningConfig,

    /// Scheduling loop timing.
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Analog inputs and per-channel transforms.
    #[serde(default)]
    pub sampling: SamplingConfig,

    /// Wall-clock settings.
    #[serde(default)]
    pub clock: ClockConfig,

    /// Telemetry payload format.
    #[serde(default)]
    pub format: Format,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Node identity settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSection {
    /// Node identity as hex, or "auto" to derive it from the hardware
    /// address (default).
    #[serde(default = "default_node_id")]
    pub node_id: String,

    /// Network interface whose hardware address becomes the identity.
    /// Defaults to the first non-loopback interface with a non-zero address.
    #[serde(default)]
    pub interface: Option<String>,
}

fn default_node_id() -> String {
    AUTO_NODE_ID.to_string()
}

impl Default for NodeSection {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            interface: None,
        }
    }
}

/// Configuration acquisition timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningConfig {
    /// How long to wait for a retained configuration before announcing
    /// on the first-connect topic (default: 3000).
    #[serde(default = "default_grace_window_ms")]
    pub grace_window_ms: u64,

    /// Transport service interval inside the grace window (default: 10).
    #[serde(default = "default_grace_poll_ms")]
    pub grace_poll_ms: u64,

    /// Transport service interval while waiting after the announcement
    /// (default: 50).
    #[serde(default = "default_wait_poll_ms")]
    pub wait_poll_ms: u64,
}

fn default_grace_window_ms() -> u64 {
    3000
}

fn default_grace_poll_ms() -> u64 {
    10
}

fn default_wait_poll_ms() -> u64 {
    50
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            grace_window_ms: default_grace_window_ms(),
            grace_poll_ms: default_grace_poll_ms(),
            wait_poll_ms: default_wait_poll_ms(),
        }
    }
}

impl ProvisioningConfig {
    pub fn grace_window(&self) -> Duration {
        Duration::from_millis(self.grace_window_ms)
    }

    pub fn grace_poll(&self) -> Duration {
        Duration::from_millis(self.grace_poll_ms)
    }

    pub fn wait_poll(&self) -> Duration {
        Duration::from_millis(self.wait_poll_ms)
    }
}

/// Scheduling loop timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Delay between broker connect attempts (default: 2000).
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Upper bound on one transport service call in the main loop
    /// (default: 10).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_reconnect_delay_ms() -> u64 {
    2000
}

fn default_poll_interval_ms() -> u64 {
    10
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: default_reconnect_delay_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl ScheduleConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Where raw readings come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceConfig {
    /// Linux IIO ADC exposed through sysfs.
    Sysfs {
        /// IIO device directory.
        #[serde(default = "default_iio_device")]
        device: PathBuf,
    },
    /// Generated waveform, no hardware needed.
    Simulated,
}

fn default_iio_device() -> PathBuf {
    PathBuf::from("/sys/bus/iio/devices/iio:device0")
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig::Sysfs {
            device: default_iio_device(),
        }
    }
}

/// Physical input and linear transform for one channel.
///
/// A raw reading `r` becomes `r * scale + offset`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelBinding {
    /// Analog input number.
    #[serde(default)]
    pub input: u16,

    /// Multiplier applied to the raw reading.
    #[serde(default = "default_scale")]
    pub scale: f64,

    /// Added after scaling.
    #[serde(default = "default_offset")]
    pub offset: f64,
}

/// Maps the 12-bit range 0..=4095 onto 1800..=-200.
fn default_scale() -> f64 {
    -2000.0 / 4095.0
}

fn default_offset() -> f64 {
    1800.0
}

impl Default for ChannelBinding {
    fn default() -> Self {
        Self {
            input: 0,
            scale: default_scale(),
            offset: default_offset(),
        }
    }
}

impl ChannelBinding {
    /// Convert a raw reading to engineering units.
    pub fn convert(&self, raw: u16) -> f64 {
        f64::from(raw) * self.scale + self.offset
    }
}

/// Sampling settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SamplingConfig {
    /// Analog source.
    #[serde(default)]
    pub source: SourceConfig,

    /// Binding used by every channel without an override.
    #[serde(default)]
    pub default_binding: ChannelBinding,

    /// Per-channel overrides keyed by channel number (1-based, as in
    /// `temp1`).
    #[serde(default, deserialize_with = "channel_keys")]
    pub bindings: BTreeMap<usize, ChannelBinding>,
}

/// Read binding keys as channel numbers, so `"2"`, `" 2"` and `"02"` all
/// name channel 2.
fn channel_keys<'de, D>(
    deserializer: D,
) -> std::result::Result<BTreeMap<usize, ChannelBinding>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error as _;

    let raw = BTreeMap::<String, ChannelBinding>::deserialize(deserializer)?;
    let mut bindings = BTreeMap::new();
    for (key, binding) in raw {
        let channel: usize = key.trim().parse().map_err(|_| {
            D::Error::custom(format!("binding key '{}' is not a channel number", key))
        })?;
        if bindings.insert(channel, binding).is_some() {
            return Err(D::Error::custom(format!("duplicate binding for channel {}", channel)));
        }
    }
    Ok(bindings)
}

impl SamplingConfig {
    /// Binding for a zero-based channel index.
    pub fn binding_for(&self, index: usize) -> ChannelBinding {
        self.bindings
            .get(&(index + 1))
            .copied()
            .unwrap_or(self.default_binding)
    }

    /// Bindings for every channel the node can sample.
    pub fn resolve(&self) -> [ChannelBinding; MAX_CHANNELS] {
        std::array::from_fn(|index| self.binding_for(index))
    }

    fn validate(&self) -> Result<()> {
        for &channel in self.bindings.keys() {
            if !(1..=MAX_CHANNELS).contains(&channel) {
                return Err(NodeError::validation(format!(
                    "binding for channel {} outside 1..={}",
                    channel, MAX_CHANNELS
                )));
            }
        }

        let all = std::iter::once(&self.default_binding).chain(self.bindings.values());
        for binding in all {
            if !binding.scale.is_finite() || !binding.offset.is_finite() {
                return Err(NodeError::validation("binding scale and offset must be finite"));
            }
        }

        Ok(())
    }
}

/// Wall-clock settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockConfig {
    /// Fixed offset from UTC for telemetry timestamps, in seconds.
    /// Defaults to the host's local time zone.
    #[serde(default)]
    pub utc_offset_secs: Option<i32>,

    /// The clock counts as synchronized once it reports this year or later
    /// (default: 2016).
    #[serde(default = "default_min_sync_year")]
    pub min_sync_year: i32,

    /// How often to re-check an unsynchronized clock (default: 200).
    #[serde(default = "default_sync_poll_ms")]
    pub sync_poll_ms: u64,
}

fn default_min_sync_year() -> i32 {
    2016
}

fn default_sync_poll_ms() -> u64 {
    200
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            utc_offset_secs: None,
            min_sync_year: default_min_sync_year(),
            sync_poll_ms: default_sync_poll_ms(),
        }
    }
}

impl ClockConfig {
    pub fn sync_poll(&self) -> Duration {
        Duration::from_millis(self.sync_poll_ms)
    }
}

impl FieldNodeConfig {
    /// Load configuration from a file path.
    ///
    /// Supports JSON5 format. Calls [`validate`](Self::validate) after loading.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(NodeError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse and validate configuration from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = json5::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.provisioning.grace_window_ms == 0 {
            return Err(NodeError::validation("provisioning.grace_window_ms must be > 0"));
        }
        if self.provisioning.grace_poll_ms == 0 || self.provisioning.wait_poll_ms == 0 {
            return Err(NodeError::validation("provisioning poll intervals must be > 0"));
        }
        if self.schedule.poll_interval_ms == 0 {
            return Err(NodeError::validation("schedule.poll_interval_ms must be > 0"));
        }
        if self.schedule.reconnect_delay_ms == 0 {
            return Err(NodeError::validation("schedule.reconnect_delay_ms must be > 0"));
        }
        if self.clock.sync_poll_ms == 0 {
            return Err(NodeError::validation("clock.sync_poll_ms must be > 0"));
        }

        if self.node.node_id != AUTO_NODE_ID {
            NodeIdentity::parse(&self.node.node_id)
                .map_err(|e| NodeError::validation(format!("node.node_id: {}", e)))?;
        }

        self.sampling.validate()
    }
}
