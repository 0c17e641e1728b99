use std::fmt;

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Hard upper bound on the number of analog channels a node can sample.
pub const MAX_CHANNELS: usize = 16;

/// Wire field carrying the record timestamp.
pub const TIME_FIELD: &str = "time";

/// Wire field carrying the node identity.
pub const NODE_ID_FIELD: &str = "mac";

/// Prefix of the per-channel reading fields (`temp1`, `temp2`, ...).
pub const CHANNEL_LABEL_PREFIX: &str = "temp";

/// Fixed-capacity, ordered set of readings indexed by channel number.
///
/// The backing storage never grows past [`MAX_CHANNELS`]; writes beyond
/// the capacity are refused instead of wrapping or panicking.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleSet {
    values: [f64; MAX_CHANNELS],
    len: usize,
}

impl Default for SampleSet {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleSet {
    /// Create an empty sample set.
    pub fn new() -> Self {
        Self {
            values: [0.0; MAX_CHANNELS],
            len: 0,
        }
    }

    /// Build a sample set from a slice, keeping at most [`MAX_CHANNELS`] values.
    pub fn from_slice(values: &[f64]) -> Self {
        let mut set = Self::new();
        for &value in values.iter().take(MAX_CHANNELS) {
            set.push(value);
        }
        set
    }

    /// Drop all readings, keeping the storage.
    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Append a reading. Returns `false` when the set is full.
    pub fn push(&mut self, value: f64) -> bool {
        if self.len >= MAX_CHANNELS {
            return false;
        }
        self.values[self.len] = value;
        self.len += 1;
        true
    }

    /// Number of readings held.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the set holds no readings.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Reading for a channel index, if present.
    pub fn get(&self, index: usize) -> Option<f64> {
        self.as_slice().get(index).copied()
    }

    /// Readings as a slice, in channel order.
    pub fn as_slice(&self) -> &[f64] {
        &self.values[..self.len]
    }

    /// Iterate `(label, value)` pairs in channel order.
    pub fn labeled(&self) -> impl Iterator<Item = (String, f64)> + '_ {
        self.as_slice()
            .iter()
            .enumerate()
            .map(|(index, value)| (channel_label(index), *value))
    }
}

/// Wire label for a zero-based channel index: `temp1` for index 0.
pub fn channel_label(index: usize) -> String {
    format!("{}{}", CHANNEL_LABEL_PREFIX, index + 1)
}

/// Parse a wire label back into a zero-based channel index.
///
/// # Example
/// ```
/// use fieldnode_common::telemetry::parse_channel_label;
///
/// assert_eq!(parse_channel_label("temp1"), Some(0));
/// assert_eq!(parse_channel_label("temp16"), Some(15));
/// assert_eq!(parse_channel_label("temp0"), None);
/// assert_eq!(parse_channel_label("mac"), None);
/// ```
pub fn parse_channel_label(label: &str) -> Option<usize> {
    let number: usize = label.strip_prefix(CHANNEL_LABEL_PREFIX)?.parse().ok()?;
    (1..=MAX_CHANNELS).contains(&number).then(|| number - 1)
}

/// One telemetry message: timestamp, node identity and one field per channel.
///
/// Serializes as a flat map:
///
/// ```json
/// {"time":"2025-01-01 12:00:00.000","mac":"AABBCCDDEEFF","temp1":21.5,"temp2":22.0}
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryRecord {
    /// Local time of the sample, `YYYY-MM-DD HH:MM:SS.mmm`.
    pub timestamp: String,

    /// Identity of the publishing node.
    pub node_id: String,

    /// Readings in channel order.
    pub readings: SampleSet,
}

impl TelemetryRecord {
    /// Create a record from a sample set.
    pub fn new(timestamp: impl Into<String>, node_id: impl Into<String>, readings: SampleSet) -> Self {
        Self {
            timestamp: timestamp.into(),
            node_id: node_id.into(),
            readings,
        }
    }

    /// Reading for a wire label such as `temp2`.
    pub fn reading(&self, label: &str) -> Option<f64> {
        parse_channel_label(label).and_then(|index| self.readings.get(index))
    }
}

impl Serialize for TelemetryRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2 + self.readings.len()))?;
        map.serialize_entry(TIME_FIELD, &self.timestamp)?;
        map.serialize_entry(NODE_ID_FIELD, &self.node_id)?;
        for (label, value) in self.readings.labeled() {
            map.serialize_entry(&label, &value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for TelemetryRecord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(RecordVisitor)
    }
}

struct RecordVisitor;

impl<'de> Visitor<'de> for RecordVisitor {
    type Value = TelemetryRecord;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a telemetry record map")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut timestamp = None;
        let mut node_id = None;
        let mut slots: [Option<f64>; MAX_CHANNELS] = [None; MAX_CHANNELS];

        while let Some(key) = access.next_key::<String>()? {
            if key == TIME_FIELD {
                timestamp = Some(access.next_value::<String>()?);
            } else if key == NODE_ID_FIELD {
                node_id = Some(access.next_value::<String>()?);
            } else if let Some(index) = parse_channel_label(&key) {
                slots[index] = Some(access.next_value::<f64>()?);
            } else {
                access.next_value::<de::IgnoredAny>()?;
            }
        }

        // Channels are contiguous from temp1; a gap ends the set.
        let mut readings = SampleSet::new();
        for value in slots.iter().map_while(|slot| *slot) {
            readings.push(value);
        }

        Ok(TelemetryRecord {
            timestamp: timestamp.ok_or_else(|| de::Error::missing_field(TIME_FIELD))?,
            node_id: node_id.ok_or_else(|| de::Error::missing_field(NODE_ID_FIELD))?,
            readings,
        })
    }
}
