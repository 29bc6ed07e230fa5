//! Mock sample sources for broker-less testing.
//!
//! Generates deterministic synthetic feeds (sine channels or marker
//! events) at a fixed rate. Test facility only; the relay itself never
//! synthesizes data.

use std::time::Duration;

use contracts::{DecimalTimestamp, RelayError, Sample, SamplePayload, SampleSource, StreamId};

/// What a mock source emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockStreamKind {
    /// Numeric multi-channel samples (sine waves, phase-shifted per channel)
    Channels { count: usize },
    /// String marker events
    Markers,
}

/// Mock source configuration.
#[derive(Debug, Clone)]
pub struct MockSourceConfig {
    pub stream_id: String,
    pub kind: MockStreamKind,
    pub frequency_hz: f64,
    /// End the stream after this many samples (`None` = endless)
    pub sample_limit: Option<u64>,
}

impl Default for MockSourceConfig {
    fn default() -> Self {
        Self {
            stream_id: "mock_stream".to_string(),
            kind: MockStreamKind::Channels { count: 8 },
            frequency_hz: 100.0,
            sample_limit: None,
        }
    }
}

/// Synthetic sample source.
pub struct MockSampleSource {
    stream_id: StreamId,
    kind: MockStreamKind,
    interval: Duration,
    remaining: Option<u64>,
    sequence: u64,
}

impl MockSampleSource {
    pub fn new(config: MockSourceConfig) -> Self {
        let interval = if config.frequency_hz > 0.0 {
            Duration::from_secs_f64(1.0 / config.frequency_hz)
        } else {
            Duration::ZERO
        };
        Self {
            stream_id: StreamId::from(config.stream_id),
            kind: config.kind,
            interval,
            remaining: config.sample_limit,
            sequence: 0,
        }
    }

    /// Sine-wave channel source.
    pub fn channels(stream_id: &str, frequency_hz: f64, channel_count: usize) -> Self {
        Self::new(MockSourceConfig {
            stream_id: stream_id.to_string(),
            kind: MockStreamKind::Channels {
                count: channel_count,
            },
            frequency_hz,
            ..Default::default()
        })
    }

    /// Marker event source.
    pub fn markers(stream_id: &str, frequency_hz: f64) -> Self {
        Self::new(MockSourceConfig {
            stream_id: stream_id.to_string(),
            kind: MockStreamKind::Markers,
            frequency_hz,
            ..Default::default()
        })
    }

    /// End the stream after `limit` samples.
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.remaining = Some(limit);
        self
    }

    fn make_payload(&self) -> SamplePayload {
        match self.kind {
            MockStreamKind::Channels { count } => {
                let t = self.sequence as f64 * self.interval.as_secs_f64();
                let values = (0..count)
                    .map(|ch| (2.0 * std::f64::consts::PI * (t + ch as f64 * 0.1)).sin())
                    .collect();
                SamplePayload::Channels(values)
            }
            MockStreamKind::Markers => SamplePayload::Event(format!("marker_{}", self.sequence)),
        }
    }
}

impl SampleSource for MockSampleSource {
    fn stream_id(&self) -> &StreamId {
        &self.stream_id
    }

    async fn next_sample(&mut self) -> Result<Option<Sample>, RelayError> {
        match self.remaining.as_mut() {
            Some(0) => return Ok(None),
            Some(n) => *n -= 1,
            None => {}
        }
        tokio::time::sleep(self.interval).await;
        self.sequence += 1;

        Ok(Some(Sample {
            stream_id: self.stream_id.clone(),
            acquisition_timestamp: DecimalTimestamp::now_utc(),
            sequence_number: self.sequence,
            payload: self.make_payload(),
        }))
    }
}
