//! Wire payload - the bit-exact transport document.
//!
//! Field-tagged so schema evolution does not break older consumers; decimal
//! strings for all timestamps; the literal `"unavailable"` marks a missing
//! clock offset, which consumers must distinguish from a zero offset.

use serde::{Deserialize, Serialize};

use contracts::{DecimalTimestamp, RelayError, Sample, SamplePayload, TemporalRecord};

/// Structured transport payload for one sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WirePayload {
    /// Originating stream
    pub stream_id: String,

    /// Acquisition timestamp, decimal string, nanosecond resolution
    pub source_timestamp: DecimalTimestamp,

    /// Offset estimate or the literal "unavailable"
    #[serde(with = "clock_offset_field")]
    pub clock_offset: Option<DecimalTimestamp>,

    /// Reference-clock time at formatting
    pub relay_send_time: DecimalTimestamp,

    /// Per-stream capture sequence number
    pub sequence_number: u64,

    /// Channel values, or one event string
    pub payload: SamplePayload,
}

impl WirePayload {
    /// Validate and assemble the wire document for one sample.
    pub fn build(sample: &Sample, record: &TemporalRecord) -> Result<Self, RelayError> {
        if sample.stream_id.is_empty() {
            return Err(RelayError::encoding(
                sample.stream_id.as_str(),
                "empty stream id",
            ));
        }
        if !sample.payload.is_finite() {
            return Err(RelayError::encoding(
                sample.stream_id.as_str(),
                "payload contains non-finite values",
            ));
        }

        Ok(Self {
            stream_id: sample.stream_id.to_string(),
            source_timestamp: record.source_timestamp,
            clock_offset: record.clock_offset,
            relay_send_time: record.relay_send_time,
            sequence_number: sample.sequence_number,
            payload: sample.payload.clone(),
        })
    }

    /// Acquisition time mapped onto the reference clock, when an offset
    /// estimate was available. Consumers use this for cross-stream
    /// alignment; the raw `source_timestamp` stays untouched either way.
    pub fn corrected_timestamp(&self) -> Option<DecimalTimestamp> {
        self.clock_offset
            .map(|offset| self.source_timestamp.saturating_add(offset))
    }
}

/// Serde adapter mapping `None` to the `"unavailable"` literal.
mod clock_offset_field {
    use super::DecimalTimestamp;
    use serde::{Deserialize, Deserializer, Serializer};

    const UNAVAILABLE: &str = "unavailable";

    pub fn serialize<S>(value: &Option<DecimalTimestamp>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(offset) => serializer.collect_str(offset),
            None => serializer.serialize_str(UNAVAILABLE),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DecimalTimestamp>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        if s == UNAVAILABLE {
            return Ok(None);
        }
        s.parse().map(Some).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_literal_round_trip() {
        let payload = WirePayload {
            stream_id: "EEG_1".to_string(),
            source_timestamp: "1.000000000".parse().unwrap(),
            clock_offset: None,
            relay_send_time: "2.000000000".parse().unwrap(),
            sequence_number: 0,
            payload: SamplePayload::Channels(vec![1.0]),
        };

        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains("\"clock_offset\":\"unavailable\""));

        let back: WirePayload = serde_json::from_str(&json).unwrap();
        assert_eq!(back.clock_offset, None);
    }

    #[test]
    fn test_build_copies_temporal_record() {
        let sample = Sample {
            stream_id: "EEG_1".into(),
            acquisition_timestamp: "3.000000003".parse().unwrap(),
            sequence_number: 9,
            payload: SamplePayload::Channels(vec![0.25]),
        };
        let record = TemporalRecord {
            source_timestamp: sample.acquisition_timestamp,
            clock_offset: Some("0.000000100".parse().unwrap()),
            relay_send_time: "4.000000000".parse().unwrap(),
        };

        let wire = WirePayload::build(&sample, &record).unwrap();
        assert_eq!(wire.source_timestamp, record.source_timestamp);
        assert_eq!(wire.clock_offset, record.clock_offset);
        assert_eq!(wire.sequence_number, 9);
    }

    #[test]
    fn test_corrected_timestamp_applies_offset() {
        let sample = Sample {
            stream_id: "EEG_1".into(),
            acquisition_timestamp: "3.000000003".parse().unwrap(),
            sequence_number: 1,
            payload: SamplePayload::Channels(vec![0.0]),
        };
        let record = TemporalRecord {
            source_timestamp: sample.acquisition_timestamp,
            clock_offset: Some("-0.000000003".parse().unwrap()),
            relay_send_time: "4.000000000".parse().unwrap(),
        };

        let wire = WirePayload::build(&sample, &record).unwrap();
        assert_eq!(
            wire.corrected_timestamp().unwrap().to_string(),
            "3.000000000"
        );

        let unsynced = WirePayload {
            clock_offset: None,
            ..wire
        };
        assert_eq!(unsynced.corrected_timestamp(), None);
    }
}
