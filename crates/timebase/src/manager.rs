//! TimestampManager - temporal record construction.

use std::sync::Arc;

use contracts::{DecimalTimestamp, Sample, TemporalRecord};

use crate::ClockSyncRegistry;

/// Builds the `TemporalRecord` carried with every relayed sample.
///
/// This is a pure transform over the sample and the registry; it holds no
/// per-sample state and performs no I/O.
#[derive(Debug, Clone)]
pub struct TimestampManager {
    registry: Arc<ClockSyncRegistry>,
}

impl TimestampManager {
    pub fn new(registry: Arc<ClockSyncRegistry>) -> Self {
        Self { registry }
    }

    /// Annotate a sample, stamping the relay send time from the reference
    /// clock.
    pub fn annotate(&self, sample: &Sample) -> TemporalRecord {
        self.annotate_at(sample, DecimalTimestamp::now_utc())
    }

    /// Annotate with an explicit send time. Deterministic; the production
    /// path goes through [`annotate`](Self::annotate).
    pub fn annotate_at(&self, sample: &Sample, send_time: DecimalTimestamp) -> TemporalRecord {
        let clock_offset = self
            .registry
            .get(&sample.stream_id)
            .map(|record| record.offset);

        TemporalRecord {
            source_timestamp: sample.acquisition_timestamp,
            clock_offset,
            relay_send_time: send_time,
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{ClockSyncRecord, SamplePayload};

    fn sample(stream: &str) -> Sample {
        Sample {
            stream_id: stream.into(),
            acquisition_timestamp: "12345.000000678".parse().unwrap(),
            sequence_number: 1,
            payload: SamplePayload::Channels(vec![0.5]),
        }
    }

    #[test]
    fn test_annotate_without_sync_record() {
        let manager = TimestampManager::new(Arc::new(ClockSyncRegistry::new()));
        let record = manager.annotate_at(&sample("EEG_1"), DecimalTimestamp::from_parts(100, 0));

        // Missing sync data is observable, not a silent zero
        assert_eq!(record.clock_offset, None);
        assert_eq!(record.source_timestamp.to_string(), "12345.000000678");
        assert_eq!(record.relay_send_time, DecimalTimestamp::from_parts(100, 0));
    }

    #[test]
    fn test_annotate_with_sync_record() {
        let registry = Arc::new(ClockSyncRegistry::new());
        registry.update(
            "EEG_1".into(),
            ClockSyncRecord {
                offset: DecimalTimestamp::from_nanos(-42),
                uncertainty: DecimalTimestamp::from_nanos(3),
                measured_at: DecimalTimestamp::from_parts(99, 0),
            },
        );

        let manager = TimestampManager::new(registry);
        let record = manager.annotate_at(&sample("EEG_1"), DecimalTimestamp::from_parts(100, 0));

        assert_eq!(record.clock_offset, Some(DecimalTimestamp::from_nanos(-42)));
    }

    #[test]
    fn test_source_timestamp_is_lossless() {
        let manager = TimestampManager::new(Arc::new(ClockSyncRegistry::new()));
        let mut s = sample("EEG_1");
        s.acquisition_timestamp = "123456789.987654321".parse().unwrap();

        let record = manager.annotate_at(&s, DecimalTimestamp::ZERO);
        assert_eq!(record.source_timestamp.to_string(), "123456789.987654321");
    }

    #[test]
    fn test_offset_tracks_registry_updates() {
        let registry = Arc::new(ClockSyncRegistry::new());
        let manager = TimestampManager::new(Arc::clone(&registry));
        let s = sample("Gaze");

        assert!(manager.annotate_at(&s, DecimalTimestamp::ZERO).clock_offset.is_none());

        registry.update(
            "Gaze".into(),
            ClockSyncRecord {
                offset: DecimalTimestamp::from_nanos(7),
                uncertainty: DecimalTimestamp::ZERO,
                measured_at: DecimalTimestamp::ZERO,
            },
        );

        assert_eq!(
            manager.annotate_at(&s, DecimalTimestamp::ZERO).clock_offset,
            Some(DecimalTimestamp::from_nanos(7))
        );
    }
}
