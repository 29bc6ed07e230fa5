//! Sample - one unit of acquired stream data.

use serde::{Deserialize, Serialize};

use crate::{DecimalTimestamp, StreamId};

/// One sample pulled from a local real-time stream.
///
/// Within a stream, sequence numbers are strictly increasing and acquisition
/// timestamps are non-decreasing; the relay forwards samples without ever
/// reordering them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sample {
    /// Stable stream identifier
    pub stream_id: StreamId,

    /// Monotonic high-resolution timestamp from the source clock domain
    /// (not wall-clock)
    pub acquisition_timestamp: DecimalTimestamp,

    /// Per-stream sequence number assigned at capture
    pub sequence_number: u64,

    /// Channel values, or a single event string for marker streams
    pub payload: SamplePayload,
}

/// Sample payload variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SamplePayload {
    /// Ordered numeric channel values (regular-rate streams)
    Channels(Vec<f64>),

    /// Single event string (irregular/marker streams)
    Event(String),
}

impl SamplePayload {
    /// Whether every numeric value is finite. Event payloads are always
    /// considered finite.
    pub fn is_finite(&self) -> bool {
        match self {
            Self::Channels(values) => values.iter().all(|v| v.is_finite()),
            Self::Event(_) => true,
        }
    }

    /// Number of channels, 1 for event payloads.
    pub fn channel_count(&self) -> usize {
        match self {
            Self::Channels(values) => values.len(),
            Self::Event(_) => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_finite_check() {
        assert!(SamplePayload::Channels(vec![1.0, -2.5, 0.0]).is_finite());
        assert!(!SamplePayload::Channels(vec![1.0, f64::NAN]).is_finite());
        assert!(!SamplePayload::Channels(vec![f64::INFINITY]).is_finite());
        assert!(SamplePayload::Event("stimulus_onset".to_string()).is_finite());
    }

    #[test]
    fn test_payload_serde_untagged() {
        let channels = SamplePayload::Channels(vec![1.5, 2.5]);
        assert_eq!(serde_json::to_string(&channels).unwrap(), "[1.5,2.5]");

        let event = SamplePayload::Event("blink".to_string());
        assert_eq!(serde_json::to_string(&event).unwrap(), "\"blink\"");
    }
}
