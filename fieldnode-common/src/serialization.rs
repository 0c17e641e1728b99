use serde::Serialize;

use crate::error::{Error, Result};

/// Serialization format for telemetry payloads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// JSON format (compact, what existing consumers of `/temp` expect).
    #[default]
    Json,

    /// CBOR format (compact binary, smaller on constrained links).
    Cbor,
}

/// Encode a value to bytes using the specified format.
pub fn encode<T: Serialize>(value: &T, format: Format) -> Result<Vec<u8>> {
    match format {
        Format::Json => serde_json::to_vec(value).map_err(Error::from),
        Format::Cbor => {
            let mut buf = Vec::new();
            ciborium::into_writer(value, &mut buf)?;
            Ok(buf)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{SampleSet, TelemetryRecord};

    fn record() -> TelemetryRecord {
        TelemetryRecord::new(
            "2025-03-01 08:15:30.250",
            "AABBCCDDEEFF",
            SampleSet::from_slice(&[21.5, 22.25, -3.0]),
        )
    }

    #[test]
    fn test_json_encoding() {
        let encoded = encode(&record(), Format::Json).unwrap();
        assert_eq!(encoded.first(), Some(&b'{'));
        let decoded: TelemetryRecord = serde_json::from_slice(&encoded).unwrap();
        assert_eq!(decoded, record());
    }

    #[test]
    fn test_cbor_encoding() {
        let encoded = encode(&record(), Format::Cbor).unwrap();
        assert_ne!(encoded.first(), Some(&b'{'));
        let decoded: TelemetryRecord = ciborium::from_reader(encoded.as_slice()).unwrap();
        assert_eq!(decoded, record());
    }

    #[test]
    fn test_format_from_config() {
        let format: Format = serde_json::from_str("\"cbor\"").unwrap();
        assert_eq!(format, Format::Cbor);
        assert_eq!(Format::default(), Format::Json);
    }
}
