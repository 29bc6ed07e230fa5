//! # Formatter
//!
//! Message formatting: serializes a sample plus its temporal record into the
//! field-tagged wire payload handed to the broker.
//!
//! The encoding is deterministic (identical input yields byte-identical
//! output, which idempotent-retry handling depends on) and every timestamp
//! travels as a decimal string so no consumer runtime can truncate it.

mod wire;

pub use wire::WirePayload;

use bytes::Bytes;
use contracts::{RelayError, Sample, TemporalRecord};

/// Stateless sample-to-payload encoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageFormatter;

impl MessageFormatter {
    pub fn new() -> Self {
        Self
    }

    /// Encode one sample with its temporal record.
    ///
    /// # Errors
    /// `RelayError::Encoding` when the stream id is empty or the payload
    /// contains non-finite values. Such samples are dropped and counted by
    /// the caller, never coerced.
    pub fn encode(&self, sample: &Sample, record: &TemporalRecord) -> Result<Bytes, RelayError> {
        let payload = WirePayload::build(sample, record)?;
        let bytes = serde_json::to_vec(&payload).map_err(|e| {
            RelayError::encoding(sample.stream_id.as_str(), format!("serialize error: {e}"))
        })?;
        Ok(Bytes::from(bytes))
    }

    /// Encode several samples as one JSON array payload.
    pub fn encode_batch<'a, I>(&self, items: I) -> Result<Bytes, RelayError>
    where
        I: IntoIterator<Item = (&'a Sample, &'a TemporalRecord)>,
    {
        let payloads: Vec<WirePayload> = items
            .into_iter()
            .map(|(sample, record)| WirePayload::build(sample, record))
            .collect::<Result<_, _>>()?;

        let bytes = serde_json::to_vec(&payloads)
            .map_err(|e| RelayError::encoding("<batch>", format!("serialize error: {e}")))?;
        Ok(Bytes::from(bytes))
    }

    /// Decode a wire payload back into its structured form. Used by the
    /// consumer side and by precision round-trip tests.
    pub fn decode(&self, bytes: &[u8]) -> Result<WirePayload, RelayError> {
        serde_json::from_slice(bytes)
            .map_err(|e| RelayError::encoding("<decode>", format!("invalid wire payload: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{DecimalTimestamp, SamplePayload};

    fn sample() -> Sample {
        Sample {
            stream_id: "EEG_1".into(),
            acquisition_timestamp: "12345.123456789".parse().unwrap(),
            sequence_number: 42,
            payload: SamplePayload::Channels(vec![1.5, -2.25, 0.0]),
        }
    }

    fn record() -> TemporalRecord {
        TemporalRecord {
            source_timestamp: "12345.123456789".parse().unwrap(),
            clock_offset: Some("-0.000001500".parse().unwrap()),
            relay_send_time: "1700000000.000000001".parse().unwrap(),
        }
    }

    #[test]
    fn test_encode_is_idempotent() {
        let formatter = MessageFormatter::new();
        let (s, r) = (sample(), record());

        let a = formatter.encode(&s, &r).unwrap();
        let b = formatter.encode(&s, &r).unwrap();
        assert_eq!(a, b, "same input must yield byte-identical payloads");
    }

    #[test]
    fn test_wire_fields() {
        let formatter = MessageFormatter::new();
        let bytes = formatter.encode(&sample(), &record()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(value["stream_id"], "EEG_1");
        assert_eq!(value["source_timestamp"], "12345.123456789");
        assert_eq!(value["clock_offset"], "-0.000001500");
        assert_eq!(value["relay_send_time"], "1700000000.000000001");
        assert_eq!(value["sequence_number"], 42);
        assert_eq!(value["payload"][1], -2.25);
    }

    #[test]
    fn test_missing_offset_encodes_unavailable() {
        let formatter = MessageFormatter::new();
        let mut r = record();
        r.clock_offset = None;

        let bytes = formatter.encode(&sample(), &r).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["clock_offset"], "unavailable");
    }

    #[test]
    fn test_precision_round_trip() {
        let formatter = MessageFormatter::new();
        let bytes = formatter.encode(&sample(), &record()).unwrap();
        let decoded = formatter.decode(&bytes).unwrap();

        // 9 fractional digits survive exactly
        assert_eq!(decoded.source_timestamp.to_string(), "12345.123456789");
        assert_eq!(
            decoded.clock_offset.unwrap().to_string(),
            "-0.000001500"
        );
        assert_eq!(decoded.sequence_number, 42);
    }

    #[test]
    fn test_event_payload() {
        let formatter = MessageFormatter::new();
        let s = Sample {
            stream_id: "Markers".into(),
            acquisition_timestamp: "5.000000000".parse().unwrap(),
            sequence_number: 1,
            payload: SamplePayload::Event("stimulus_onset".to_string()),
        };

        let bytes = formatter.encode(&s, &record()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["payload"], "stimulus_onset");
    }

    #[test]
    fn test_non_finite_rejected() {
        let formatter = MessageFormatter::new();
        let mut s = sample();
        s.payload = SamplePayload::Channels(vec![1.0, f64::NAN]);

        let err = formatter.encode(&s, &record()).unwrap_err();
        assert!(matches!(err, RelayError::Encoding { .. }));
        assert!(err.is_sample_local());
    }

    #[test]
    fn test_empty_stream_id_rejected() {
        let formatter = MessageFormatter::new();
        let mut s = sample();
        s.stream_id = "".into();

        let err = formatter.encode(&s, &record()).unwrap_err();
        assert!(matches!(err, RelayError::Encoding { .. }));
    }

    #[test]
    fn test_encode_batch() {
        let formatter = MessageFormatter::new();
        let (s, r) = (sample(), record());

        let bytes = formatter.encode_batch([(&s, &r), (&s, &r)]).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value.as_array().unwrap().len(), 2);
        assert_eq!(value[0]["stream_id"], "EEG_1");
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let formatter = MessageFormatter::new();
        assert!(formatter.decode(b"not json").is_err());
        assert!(formatter.decode(b"{}").is_err());
    }
}
