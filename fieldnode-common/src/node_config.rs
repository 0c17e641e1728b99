//! Operating parameters delivered over the network and the decoder for
//! configuration messages.
//!
//! Configuration messages are decoded in two passes. The structured pass
//! reads the payload as JSON5 and ignores unknown fields. When that fails
//! or leaves a field unset, a free-form pass locates each field name in the
//! text and reads the number between the following `:` and the next
//! terminator (`,`, `}`, `;` or end of line). A message is accepted only
//! when both fields are found and within bounds.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::telemetry::MAX_CHANNELS;

/// Field carrying the channel count.
pub const CHANNELS_FIELD: &str = "channels";

/// Field carrying the sampling period in milliseconds.
pub const SAMPLING_PERIOD_FIELD: &str = "samplingPeriod";

/// Operating parameters of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeConfig {
    channel_count: usize,
    sampling_period_ms: u64,
}

/// Why a configuration message did not produce a [`NodeConfig`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigRejection {
    #[error("missing or unreadable field '{0}'")]
    MissingField(&'static str),

    #[error("channel count {0} outside 1..={max}", max = MAX_CHANNELS)]
    ChannelCount(u64),

    #[error("sampling period must be greater than zero")]
    ZeroPeriod,
}

impl NodeConfig {
    /// Validate and build a configuration.
    pub fn new(channel_count: u64, sampling_period_ms: u64) -> Result<Self, ConfigRejection> {
        if channel_count == 0 || channel_count > MAX_CHANNELS as u64 {
            return Err(ConfigRejection::ChannelCount(channel_count));
        }
        if sampling_period_ms == 0 {
            return Err(ConfigRejection::ZeroPeriod);
        }
        Ok(Self {
            channel_count: channel_count as usize,
            sampling_period_ms,
        })
    }

    /// Number of channels to sample, always in `1..=MAX_CHANNELS`.
    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    /// Sampling period in milliseconds, always non-zero.
    pub fn sampling_period_ms(&self) -> u64 {
        self.sampling_period_ms
    }

    /// Sampling period as a duration.
    pub fn sampling_period(&self) -> Duration {
        Duration::from_millis(self.sampling_period_ms)
    }

    /// Decode a configuration message payload.
    pub fn from_message(payload: &[u8]) -> Result<Self, ConfigRejection> {
        let text = String::from_utf8_lossy(payload);

        let fields = decode_structured(&text)
            .filter(ConfigFields::is_complete)
            .unwrap_or_else(|| scan_fields(&text));

        let channels = fields
            .channels
            .ok_or(ConfigRejection::MissingField(CHANNELS_FIELD))?;
        let period = fields
            .sampling_period
            .ok_or(ConfigRejection::MissingField(SAMPLING_PERIOD_FIELD))?;

        Self::new(channels, period)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigFields {
    #[serde(default)]
    channels: Option<u64>,
    #[serde(default)]
    sampling_period: Option<u64>,
}

impl ConfigFields {
    fn is_complete(&self) -> bool {
        self.channels.is_some() && self.sampling_period.is_some()
    }
}

fn decode_structured(text: &str) -> Option<ConfigFields> {
    json5::from_str(text).ok()
}

fn scan_fields(text: &str) -> ConfigFields {
    ConfigFields {
        channels: scan_field(text, CHANNELS_FIELD),
        sampling_period: scan_field(text, SAMPLING_PERIOD_FIELD),
    }
}

/// Find `name`, skip quotes and whitespace up to `:`, and parse the number
/// that follows up to the next terminator.
fn scan_field(text: &str, name: &str) -> Option<u64> {
    text.match_indices(name).find_map(|(position, _)| {
        let rest = &text[position + name.len()..];
        let colon = rest.find(':')?;
        let between = &rest[..colon];
        if !between.chars().all(|c| c.is_whitespace() || c == '"' || c == '\'') {
            return None;
        }

        let value = &rest[colon + 1..];
        let end = value
            .find(|c: char| matches!(c, ',' | '}' | ';' | '\n'))
            .unwrap_or(value.len());

        value[..end]
            .trim()
            .trim_matches(|c| c == '"' || c == '\'')
            .trim()
            .parse()
            .ok()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_json() {
        let config = NodeConfig::from_message(br#"{"channels":3,"samplingPeriod":5000}"#).unwrap();
        assert_eq!(config.channel_count(), 3);
        assert_eq!(config.sampling_period_ms(), 5000);
        assert_eq!(config.sampling_period(), Duration::from_millis(5000));
    }

    #[test]
    fn test_decode_ignores_unknown_fields() {
        let payload = br#"{"site":"north","samplingPeriod":1000,"unit":"C","channels":1}"#;
        let config = NodeConfig::from_message(payload).unwrap();
        assert_eq!(config.channel_count(), 1);
        assert_eq!(config.sampling_period_ms(), 1000);
    }

    #[test]
    fn test_decode_json5() {
        let config = NodeConfig::from_message(b"{ channels: 4, samplingPeriod: 250, }").unwrap();
        assert_eq!(config.channel_count(), 4);
        assert_eq!(config.sampling_period_ms(), 250);
    }

    #[test]
    fn test_decode_free_form_text() {
        let payload = b"node update: channels: 2; samplingPeriod: 750\n";
        let config = NodeConfig::from_message(payload);
        assert_eq!(config, NodeConfig::new(2, 750));
    }

    #[test]
    fn test_decode_nested_object() {
        let payload = br#"{"node":{"channels":6,"samplingPeriod":2000}}"#;
        let config = NodeConfig::from_message(payload).unwrap();
        assert_eq!(config.channel_count(), 6);
        assert_eq!(config.sampling_period_ms(), 2000);
    }

    #[test]
    fn test_decode_quoted_numbers() {
        let payload = br#"{"channels":"5","samplingPeriod":"100"}"#;
        let config = NodeConfig::from_message(payload).unwrap();
        assert_eq!(config.channel_count(), 5);
        assert_eq!(config.sampling_period_ms(), 100);
    }

    #[test]
    fn test_missing_fields() {
        assert_eq!(
            NodeConfig::from_message(br#"{"channels":3}"#),
            Err(ConfigRejection::MissingField(SAMPLING_PERIOD_FIELD))
        );
        assert_eq!(
            NodeConfig::from_message(br#"{"samplingPeriod":3}"#),
            Err(ConfigRejection::MissingField(CHANNELS_FIELD))
        );
        assert!(NodeConfig::from_message(b"").is_err());
        assert!(NodeConfig::from_message(b"hello").is_err());
    }

    #[test]
    fn test_non_numeric_value() {
        let payload = br#"{"channels":"three","samplingPeriod":5000}"#;
        assert_eq!(
            NodeConfig::from_message(payload),
            Err(ConfigRejection::MissingField(CHANNELS_FIELD))
        );
    }

    #[test]
    fn test_out_of_range() {
        assert_eq!(
            NodeConfig::from_message(br#"{"channels":17,"samplingPeriod":5000}"#),
            Err(ConfigRejection::ChannelCount(17))
        );
        assert_eq!(
            NodeConfig::from_message(br#"{"channels":0,"samplingPeriod":5000}"#),
            Err(ConfigRejection::ChannelCount(0))
        );
        assert_eq!(
            NodeConfig::from_message(br#"{"channels":2,"samplingPeriod":0}"#),
            Err(ConfigRejection::ZeroPeriod)
        );
        assert!(NodeConfig::new(16, 1).is_ok());
    }

    #[test]
    fn test_scan_skips_mismatched_occurrence() {
        // The first "channels" is prose, the second carries the value.
        let payload = b"all channels ok -> channels: 8, samplingPeriod: 10";
        let config = NodeConfig::from_message(payload).unwrap();
        assert_eq!(config.channel_count(), 8);
    }
}
