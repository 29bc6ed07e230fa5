//! Pipeline orchestrator - wires sources, relay core, controller and
//! transport together.
//!
//! The broker side is real MQTT by default; `--mock-broker` (or building
//! without the `mqtt` feature) swaps in the in-process broker. Sample
//! sources are synthetic demo feeds; live acquisition attaches through the
//! same `SampleSource` seam.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use contracts::{
    BrokerCredentials, BrokerTransport, ClockSyncRecord, DecimalTimestamp, QosLevel,
    RelayBlueprint, RelayError, StreamConfig, StreamId,
};
use observability::{record_snapshot, RelayMetricsAggregator};
use relay::{MockSampleSource, RelayCore};
use reliability::ReliabilityController;
use timebase::ClockSyncRegistry;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::PipelineStats;

const STATS_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// The relay blueprint
    pub blueprint: RelayBlueprint,

    /// Stop after this wall-clock duration (None = until interrupted)
    pub duration: Option<Duration>,

    /// Samples per stream before the feed ends (None = unlimited)
    pub max_samples: Option<u64>,

    /// Synthetic feed rate in Hz
    pub feed_rate_hz: f64,

    /// Use the in-process mock broker
    pub mock_broker: bool,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,
}

/// Main pipeline orchestrator
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run the pipeline to completion.
    pub async fn run(self) -> Result<PipelineStats> {
        if let Some(port) = self.config.metrics_port {
            observability::init_metrics_only(port)?;
            info!(port, "Metrics endpoint available");
        }

        let broker = &self.config.blueprint.broker;
        let credentials = BrokerCredentials {
            client_id: broker
                .client_id
                .clone()
                .unwrap_or_else(|| format!("lsl-relay-{}", std::process::id())),
            username: broker.username.clone(),
            password: broker.password.clone(),
        };
        let qos = broker.guarantee.qos();

        #[cfg(feature = "mqtt")]
        {
            if self.config.mock_broker {
                info!("Using in-process mock broker");
                self.run_with_transport(transport::MockBroker::new(), credentials, qos)
                    .await
            } else {
                info!(
                    host = %broker.host,
                    port = broker.port,
                    tls = broker.tls,
                    "Using MQTT broker session"
                );
                let session = transport::MqttTransport::new(broker);
                self.run_with_transport(session, credentials, qos).await
            }
        }

        #[cfg(not(feature = "mqtt"))]
        {
            if !self.config.mock_broker {
                warn!("Built without the mqtt feature, falling back to the mock broker");
            }
            self.run_with_transport(transport::MockBroker::new(), credentials, qos)
                .await
        }
    }

    async fn run_with_transport<T>(
        &self,
        session: T,
        credentials: BrokerCredentials,
        qos: QosLevel,
    ) -> Result<PipelineStats>
    where
        T: BrokerTransport + 'static,
    {
        let start_time = Instant::now();
        let blueprint = &self.config.blueprint;

        let (controller, handle) =
            ReliabilityController::new(session, credentials, qos, blueprint.reliability.clone());
        let controller_task = tokio::spawn(controller.run());

        // Clock-sync collaborator stand-in: the demo feeds share the local
        // clock, so their measured offset is zero
        let registry = Arc::new(ClockSyncRegistry::new());
        let sync_task = spawn_sync_refresh(
            Arc::clone(&registry),
            blueprint.streams.iter().map(|s| s.id.clone()).collect(),
            Duration::from_secs(blueprint.clock_sync.refresh_interval_secs),
        );

        let mut core = RelayCore::new(handle.clone(), registry, &blueprint.broker.namespace);
        for stream in &blueprint.streams {
            let source = self.build_source(stream);
            core.attach(stream, source)
                .await
                .with_context(|| format!("Failed to attach stream '{}'", stream.id))?;
        }

        let metrics_handles = core.metrics_handles();
        let active_streams = core.worker_count();
        info!(active_streams, "Relay pipeline running");

        // Periodic snapshot export for Prometheus and the final summary
        let aggregator = Arc::new(Mutex::new(RelayMetricsAggregator::new()));
        let stats_task = {
            let handle = handle.clone();
            let aggregator = Arc::clone(&aggregator);
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(STATS_POLL_INTERVAL);
                loop {
                    ticker.tick().await;
                    let Ok(snapshot) = handle.snapshot().await else {
                        break;
                    };
                    record_snapshot(&snapshot);
                    aggregator.lock().unwrap().update(&snapshot);
                }
            })
        };

        let run_deadline = async {
            match self.config.duration {
                Some(duration) => tokio::time::sleep(duration).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            results = core.join_all() => {
                for (stream_id, result) in results {
                    if let Err(e) = result {
                        warn!(stream = %stream_id, error = %e, "Stream worker ended with error");
                    }
                }
                info!("All stream workers finished");
            }
            _ = shutdown_signal() => {
                info!("Shutdown signal received, draining...");
            }
            _ = run_deadline => {
                info!("Configured duration elapsed, draining...");
            }
        }

        stats_task.abort();
        sync_task.abort();

        // Last snapshot before the controller closes its channels
        if let Ok(snapshot) = handle.snapshot().await {
            record_snapshot(&snapshot);
            aggregator.lock().unwrap().update(&snapshot);
        }

        if let Err(e) = handle.shutdown().await {
            warn!(error = %e, "Shutdown request failed");
        }
        match controller_task.await {
            Ok(Ok(())) => {}
            Ok(Err(e @ RelayError::ConnectExhausted { .. })) => {
                warn!(error = %e, "Relay gave up on the broker connection");
            }
            Ok(Err(e)) => warn!(error = %e, "Controller ended with error"),
            Err(e) => warn!(error = %e, "Controller task died"),
        }

        // Final per-stream totals come straight from the metrics handles,
        // which include drops accounted during the shutdown drain
        let mut stats = PipelineStats {
            active_streams,
            duration: start_time.elapsed(),
            relay_metrics: aggregator.lock().unwrap().clone(),
            ..Default::default()
        };
        for (_, metrics) in &metrics_handles {
            let snap = metrics.snapshot();
            stats.samples_published += snap.published;
            stats.samples_dropped += snap.dropped + snap.dropped_on_shutdown;
            stats.samples_failed += snap.failed;
        }

        info!(
            duration_secs = stats.duration.as_secs_f64(),
            published = stats.samples_published,
            "Pipeline shutdown complete"
        );

        Ok(stats)
    }

    /// Synthetic demo feed for one configured stream. Marker-style streams
    /// get event payloads, everything else numeric channels.
    fn build_source(&self, stream: &StreamConfig) -> MockSampleSource {
        let id = stream.id.as_str();
        let mut source = if id.to_ascii_lowercase().contains("marker") {
            MockSampleSource::markers(id, self.config.feed_rate_hz)
        } else {
            MockSampleSource::channels(id, self.config.feed_rate_hz, 8)
        };
        if let Some(limit) = self.config.max_samples {
            source = source.with_limit(limit);
        }
        source
    }
}

fn spawn_sync_refresh(
    registry: Arc<ClockSyncRegistry>,
    stream_ids: Vec<StreamId>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            for stream_id in &stream_ids {
                registry.update(
                    stream_id.clone(),
                    ClockSyncRecord {
                        offset: DecimalTimestamp::ZERO,
                        uncertainty: DecimalTimestamp::from_nanos(1_000),
                        measured_at: DecimalTimestamp::now_utc(),
                    },
                );
            }
            debug!(streams = stream_ids.len(), "Clock sync records refreshed");
        }
    })
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
