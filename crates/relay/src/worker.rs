//! Per-stream relay worker.

use std::sync::Arc;

use contracts::{OutboundMessage, RelayError, Sample, SampleSource};
use formatter::MessageFormatter;
use reliability::{ReliabilityHandle, StreamMetrics};
use timebase::TimestampManager;
use tracing::{debug, info, instrument, warn};

/// Pulls samples from one source and pushes them through
/// annotate → encode → submit until the source ends or faults.
pub struct StreamWorker<S: SampleSource> {
    source: S,
    topic: String,
    timestamps: TimestampManager,
    formatter: MessageFormatter,
    handle: ReliabilityHandle,
    metrics: Arc<StreamMetrics>,
}

impl<S: SampleSource> StreamWorker<S> {
    pub fn new(
        source: S,
        topic: String,
        timestamps: TimestampManager,
        handle: ReliabilityHandle,
        metrics: Arc<StreamMetrics>,
    ) -> Self {
        Self {
            source,
            topic,
            timestamps,
            formatter: MessageFormatter::new(),
            handle,
            metrics,
        }
    }

    /// Run until end-of-stream (clean) or a source fault (error). A fault
    /// on one stream never unwinds the rest of the relay; the caller only
    /// logs the returned error.
    #[instrument(skip_all, fields(stream = %self.source.stream_id(), topic = %self.topic))]
    pub async fn run(mut self) -> Result<(), RelayError> {
        info!("stream worker started");
        loop {
            match self.source.next_sample().await {
                Ok(Some(sample)) => {
                    if let Err(e) = self.relay_sample(sample).await {
                        if matches!(e, RelayError::ShuttingDown) {
                            debug!("controller gone, worker stopping");
                            return Ok(());
                        }
                        return Err(e);
                    }
                }
                Ok(None) => {
                    info!("end of stream");
                    let _ = self
                        .handle
                        .close_stream(self.source.stream_id().clone())
                        .await;
                    return Ok(());
                }
                Err(e) => {
                    warn!(error = %e, "sample source fault");
                    let _ = self
                        .handle
                        .close_stream(self.source.stream_id().clone())
                        .await;
                    return Err(e);
                }
            }
        }
    }

    async fn relay_sample(&mut self, sample: Sample) -> Result<(), RelayError> {
        self.metrics.mark_seen(now_unix_nanos());

        let record = self.timestamps.annotate(&sample);
        let payload = match self.formatter.encode(&sample, &record) {
            Ok(bytes) => bytes,
            // Malformed samples are dropped and counted, never fatal
            Err(e) if e.is_sample_local() => {
                warn!(
                    sequence = sample.sequence_number,
                    error = %e,
                    "malformed sample dropped"
                );
                self.metrics.inc_dropped();
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let msg = OutboundMessage::new(
            sample.stream_id.clone(),
            self.topic.clone(),
            sample.sequence_number,
            payload,
            record.relay_send_time,
        );
        self.handle.submit(msg).await.map(|_| ())
    }
}

fn now_unix_nanos() -> u64 {
    contracts::DecimalTimestamp::now_utc().as_nanos().max(0) as u64
}
