//! Telemetry publisher.

use fieldnode_common::{Format, SampleSet, TelemetryRecord, encode};
use fieldnode_transport::{Session, Transport};
use tracing::debug;

use crate::error::{NodeError, Result};

/// Builds telemetry records for one node and publishes them.
///
/// Publishing is fire-and-forget: nothing is awaited from the broker and a
/// failed publish is never retried. The scheduling loop's reconnection
/// check is what recovers from it.
#[derive(Debug, Clone)]
pub struct TelemetryPublisher {
    node_id: String,
    topic: String,
    format: Format,
}

impl TelemetryPublisher {
    /// Create a new publisher.
    pub fn new(node_id: impl Into<String>, topic: impl Into<String>, format: Format) -> Self {
        Self {
            node_id: node_id.into(),
            topic: topic.into(),
            format,
        }
    }

    /// Get the telemetry topic.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Get the serialization format.
    pub fn format(&self) -> Format {
        self.format
    }

    /// Build a record with one `tempN` field per sample.
    pub fn build_record(&self, timestamp: impl Into<String>, samples: &SampleSet) -> TelemetryRecord {
        TelemetryRecord::new(timestamp, self.node_id.clone(), *samples)
    }

    /// Serialize a record for the wire.
    pub fn encode(&self, record: &TelemetryRecord) -> Result<Vec<u8>> {
        encode(record, self.format).map_err(|e| NodeError::Serialization(e.to_string()))
    }

    /// Publish one sample set.
    pub async fn publish<T: Transport>(
        &self,
        session: &mut Session<T>,
        timestamp: impl Into<String>,
        samples: &SampleSet,
    ) -> Result<()> {
        let record = self.build_record(timestamp, samples);
        let payload = self.encode(&record)?;
        let bytes = payload.len();

        session.publish(&self.topic, payload).await?;

        debug!(
            topic = %self.topic,
            time = %record.timestamp,
            channels = samples.len(),
            bytes,
            "Published telemetry"
        );
        Ok(())
    }
}
