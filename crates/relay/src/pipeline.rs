//! RelayCore: worker assembly and lifecycle.

use std::sync::Arc;

use contracts::{RelayError, SampleSource, StreamConfig, StreamId};
use reliability::{ReliabilityHandle, StreamMetrics};
use timebase::{ClockSyncRegistry, TimestampManager};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::router::resolve_topic;
use crate::worker::StreamWorker;

/// Owns the per-stream worker tasks and the shared temporal annotator.
pub struct RelayCore {
    handle: ReliabilityHandle,
    timestamps: TimestampManager,
    namespace: String,
    workers: Vec<(StreamId, JoinHandle<Result<(), RelayError>>)>,
    metrics: Vec<(StreamId, Arc<StreamMetrics>)>,
}

impl RelayCore {
    pub fn new(
        handle: ReliabilityHandle,
        registry: Arc<ClockSyncRegistry>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            handle,
            timestamps: TimestampManager::new(registry),
            namespace: namespace.into(),
            workers: Vec::new(),
            metrics: Vec::new(),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Metrics handles of every attached stream. They outlive the
    /// controller, so final totals stay readable after shutdown.
    pub fn metrics_handles(&self) -> Vec<(StreamId, Arc<StreamMetrics>)> {
        self.metrics.clone()
    }

    /// Register the stream with the controller and spawn its worker.
    ///
    /// # Errors
    /// `RelayError::ShuttingDown` when the controller already stopped.
    pub async fn attach<S>(&mut self, config: &StreamConfig, source: S) -> Result<(), RelayError>
    where
        S: SampleSource + 'static,
    {
        let metrics = self
            .handle
            .register_stream(config.id.clone(), config.priority)
            .await?;
        let topic = resolve_topic(&self.namespace, config);
        debug!(stream = %config.id, %topic, priority = config.priority, "stream attached");

        self.metrics
            .push((config.id.clone(), Arc::clone(&metrics)));
        let worker = StreamWorker::new(
            source,
            topic,
            self.timestamps.clone(),
            self.handle.clone(),
            metrics,
        );
        self.workers
            .push((config.id.clone(), tokio::spawn(worker.run())));
        Ok(())
    }

    /// Wait for every worker to finish. Panicked workers are reported as
    /// errors, not propagated.
    pub async fn join_all(self) -> Vec<(StreamId, Result<(), RelayError>)> {
        let mut results = Vec::with_capacity(self.workers.len());
        for (id, join) in self.workers {
            let result = match join.await {
                Ok(r) => r,
                Err(e) => Err(RelayError::Other(format!("worker task died: {e}"))),
            };
            results.push((id, result));
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{
        BrokerCredentials, ClockSyncRecord, DecimalTimestamp, QosLevel, ReliabilityConfig,
    };
    use reliability::ReliabilityController;
    use transport::MockBroker;

    use crate::mock::MockSampleSource;

    fn stream_config(id: &str, priority: u8) -> StreamConfig {
        StreamConfig {
            id: id.into(),
            priority,
            topic: None,
        }
    }

    fn fast_config() -> ReliabilityConfig {
        ReliabilityConfig {
            queue_budget: 100,
            ack_timeout_ms: 200,
            max_retries: 3,
            max_connect_failures: 5,
            backoff_initial_ms: 5,
            backoff_max_ms: 20,
            backoff_jitter: 0.0,
            backpressure_window_ms: 60_000,
            shutdown_grace_ms: 1_000,
        }
    }

    #[tokio::test]
    async fn test_mock_pipeline_relays_all_samples() {
        let broker = MockBroker::new();
        let (controller, handle) = ReliabilityController::new(
            broker.clone(),
            BrokerCredentials::default(),
            QosLevel::AtLeastOnce,
            fast_config(),
        );
        let controller_task = tokio::spawn(controller.run());

        let registry = Arc::new(ClockSyncRegistry::new());
        registry.update(
            "EEG_1".into(),
            ClockSyncRecord {
                offset: DecimalTimestamp::from_nanos(250),
                uncertainty: DecimalTimestamp::from_nanos(10),
                measured_at: DecimalTimestamp::now_utc(),
            },
        );

        let mut core = RelayCore::new(handle.clone(), registry, "lsl");
        core.attach(
            &stream_config("EEG_1", 0),
            MockSampleSource::channels("EEG_1", 500.0, 4).with_limit(5),
        )
        .await
        .unwrap();

        for (id, result) in core.join_all().await {
            result.unwrap_or_else(|e| panic!("worker {id} failed: {e}"));
        }

        handle.shutdown().await.unwrap();
        controller_task.await.unwrap().unwrap();

        let published = broker.published();
        assert_eq!(published.len(), 5);
        assert!(published.iter().all(|r| r.topic == "lsl/EEG_1"));

        // Clock offset must ride along on the wire
        let decoded = formatter::MessageFormatter::new()
            .decode(&published[0].payload)
            .unwrap();
        assert_eq!(decoded.stream_id, "EEG_1");
        assert_eq!(decoded.clock_offset, Some(DecimalTimestamp::from_nanos(250)));
        assert_eq!(decoded.sequence_number, 1);
    }

    #[tokio::test]
    async fn test_worker_ends_cleanly_when_controller_closes() {
        let broker = MockBroker::new();
        let (controller, handle) = ReliabilityController::new(
            broker,
            BrokerCredentials::default(),
            QosLevel::AtLeastOnce,
            fast_config(),
        );
        let controller_task = tokio::spawn(controller.run());

        let registry = Arc::new(ClockSyncRegistry::new());
        let mut core = RelayCore::new(handle.clone(), registry, "lsl");
        core.attach(
            &stream_config("Gaze", 1),
            MockSampleSource::markers("Gaze", 100.0),
        )
        .await
        .unwrap();

        handle.shutdown().await.unwrap();
        controller_task.await.unwrap().unwrap();

        // An endless source must still wind down once the controller is gone
        for (_, result) in core.join_all().await {
            result.unwrap();
        }
    }
}
