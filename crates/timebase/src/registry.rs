//! ClockSyncRegistry - latest per-stream offset estimates.

use std::collections::HashMap;
use std::sync::RwLock;

use contracts::{ClockSyncRecord, StreamId};
use tracing::debug;

/// Shared store of the latest `ClockSyncRecord` per stream.
///
/// Written by the external clock-sync collaborator, read by the
/// `TimestampManager` on every sample. Reads vastly outnumber writes (one
/// write every few seconds against one read per sample), hence the RwLock.
#[derive(Debug, Default)]
pub struct ClockSyncRegistry {
    records: RwLock<HashMap<StreamId, ClockSyncRecord>>,
}

impl ClockSyncRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the latest offset estimate for a stream.
    pub fn update(&self, stream_id: StreamId, record: ClockSyncRecord) {
        debug!(
            stream = %stream_id,
            offset = %record.offset,
            uncertainty = %record.uncertainty,
            "Clock sync record updated"
        );
        self.records
            .write()
            .expect("clock sync registry lock poisoned")
            .insert(stream_id, record);
    }

    /// Latest estimate for a stream, `None` until the first measurement
    /// arrives.
    pub fn get(&self, stream_id: &StreamId) -> Option<ClockSyncRecord> {
        self.records
            .read()
            .expect("clock sync registry lock poisoned")
            .get(stream_id)
            .copied()
    }

    /// Drop a stream's record when its source detaches.
    pub fn remove(&self, stream_id: &StreamId) {
        self.records
            .write()
            .expect("clock sync registry lock poisoned")
            .remove(stream_id);
    }

    /// Number of streams with a known offset.
    pub fn len(&self) -> usize {
        self.records
            .read()
            .expect("clock sync registry lock poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::DecimalTimestamp;

    fn record(offset_nanos: i64) -> ClockSyncRecord {
        ClockSyncRecord {
            offset: DecimalTimestamp::from_nanos(offset_nanos),
            uncertainty: DecimalTimestamp::from_nanos(500),
            measured_at: DecimalTimestamp::now_utc(),
        }
    }

    #[test]
    fn test_get_before_first_update_is_none() {
        let registry = ClockSyncRegistry::new();
        assert!(registry.get(&"EEG_1".into()).is_none());
    }

    #[test]
    fn test_update_replaces_previous() {
        let registry = ClockSyncRegistry::new();
        let id: StreamId = "EEG_1".into();

        registry.update(id.clone(), record(100));
        registry.update(id.clone(), record(250));

        let latest = registry.get(&id).unwrap();
        assert_eq!(latest.offset.as_nanos(), 250);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove() {
        let registry = ClockSyncRegistry::new();
        let id: StreamId = "Gaze".into();
        registry.update(id.clone(), record(1));
        registry.remove(&id);
        assert!(registry.get(&id).is_none());
        assert!(registry.is_empty());
    }
}
