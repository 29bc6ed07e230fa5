//! Relay metrics: snapshot export helpers and in-memory aggregation.
//!
//! The controller emits hot-path counters itself; the helpers here turn
//! periodic [`RelaySnapshot`]s into labeled gauges and feed the aggregator
//! behind the end-of-run summary.

use std::collections::HashMap;
use std::time::Instant;

use contracts::ConnectionState;
use metrics::gauge;
use reliability::RelaySnapshot;

/// Export the connection state as a numeric gauge
/// (0 disconnected, 1 connecting, 2 connected, 3 reconnecting, 4 closed).
pub fn record_connection_state(state: ConnectionState) {
    let code = match state {
        ConnectionState::Disconnected => 0.0,
        ConnectionState::Connecting => 1.0,
        ConnectionState::Connected => 2.0,
        ConnectionState::Reconnecting => 3.0,
        ConnectionState::Closed => 4.0,
    };
    gauge!("lsl_relay_connection_state").set(code);
}

/// Export per-stream gauges from one controller snapshot.
pub fn record_snapshot(snapshot: &RelaySnapshot) {
    record_connection_state(snapshot.connection);
    gauge!("lsl_relay_streams_active").set(snapshot.streams.len() as f64);

    for stream in &snapshot.streams {
        let id = stream.stream_id.to_string();
        gauge!("lsl_relay_stream_queue_depth", "stream" => id.clone())
            .set(stream.metrics.queue_depth as f64);
        gauge!("lsl_relay_stream_published_total", "stream" => id.clone())
            .set(stream.metrics.published as f64);
        gauge!("lsl_relay_stream_dropped_total", "stream" => id.clone())
            .set(stream.metrics.dropped as f64);
        gauge!("lsl_relay_stream_latency_avg_ms", "stream" => id)
            .set(stream.metrics.average_latency_ms);
    }
}

/// Aggregates controller snapshots into run-wide statistics.
#[derive(Debug, Clone)]
pub struct RelayMetricsAggregator {
    started_at: Instant,
    connection: ConnectionState,
    latency_stats: RunningStats,
    queue_stats: RunningStats,
    /// Latest per-stream counters, keyed by stream id
    streams: HashMap<String, StreamTotals>,
}

#[derive(Debug, Clone, Copy, Default)]
struct StreamTotals {
    published: u64,
    dropped: u64,
    dropped_on_shutdown: u64,
    failed: u64,
}

impl RelayMetricsAggregator {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            connection: ConnectionState::Disconnected,
            latency_stats: RunningStats::default(),
            queue_stats: RunningStats::default(),
            streams: HashMap::new(),
        }
    }

    /// Fold one snapshot in. Counters are absolute, so the latest value
    /// per stream wins; latency and depth feed the running statistics.
    pub fn update(&mut self, snapshot: &RelaySnapshot) {
        self.connection = snapshot.connection;
        self.queue_stats.push(snapshot.total_queued as f64);

        for stream in &snapshot.streams {
            if stream.metrics.average_latency_ms > 0.0 {
                self.latency_stats.push(stream.metrics.average_latency_ms);
            }
            self.streams.insert(
                stream.stream_id.to_string(),
                StreamTotals {
                    published: stream.metrics.published,
                    dropped: stream.metrics.dropped,
                    dropped_on_shutdown: stream.metrics.dropped_on_shutdown,
                    failed: stream.metrics.failed,
                },
            );
        }
    }

    /// Produce the run summary.
    pub fn summary(&self) -> MetricsSummary {
        let uptime_secs = self.started_at.elapsed().as_secs_f64();
        let total_published: u64 = self.streams.values().map(|s| s.published).sum();
        let total_dropped: u64 = self
            .streams
            .values()
            .map(|s| s.dropped + s.dropped_on_shutdown)
            .sum();
        let total_failed: u64 = self.streams.values().map(|s| s.failed).sum();
        let attempted = total_published + total_dropped + total_failed;

        MetricsSummary {
            uptime_secs,
            connection: self.connection,
            total_published,
            total_dropped,
            total_failed,
            delivery_rate: if attempted > 0 {
                total_published as f64 / attempted as f64 * 100.0
            } else {
                0.0
            },
            throughput_hz: if uptime_secs > 0.0 {
                total_published as f64 / uptime_secs
            } else {
                0.0
            },
            latency_ms: StatsSummary::from(&self.latency_stats),
            queue_depth: StatsSummary::from(&self.queue_stats),
            stream_published: self
                .streams
                .iter()
                .map(|(id, totals)| (id.clone(), totals.published))
                .collect(),
        }
    }

}

impl Default for RelayMetricsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

/// Human-readable run summary.
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub uptime_secs: f64,
    pub connection: ConnectionState,
    pub total_published: u64,
    pub total_dropped: u64,
    pub total_failed: u64,
    pub delivery_rate: f64,
    pub throughput_hz: f64,
    pub latency_ms: StatsSummary,
    pub queue_depth: StatsSummary,
    pub stream_published: HashMap<String, u64>,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Relay Summary ===")?;
        writeln!(f, "Uptime: {:.1}s", self.uptime_secs)?;
        writeln!(f, "Connection: {}", self.connection)?;
        writeln!(
            f,
            "Published: {} ({:.2}% delivered, {:.1} msg/s)",
            self.total_published, self.delivery_rate, self.throughput_hz
        )?;
        writeln!(f, "Dropped: {}", self.total_dropped)?;
        writeln!(f, "Failed: {}", self.total_failed)?;
        writeln!(f, "Publish latency (ms): {}", self.latency_ms)?;
        writeln!(f, "Queue depth: {}", self.queue_depth)?;

        if !self.stream_published.is_empty() {
            writeln!(f, "Per-stream published:")?;
            let mut streams: Vec<_> = self.stream_published.iter().collect();
            streams.sort_by(|a, b| a.0.cmp(b.0));
            for (stream, count) in streams {
                writeln!(f, "  {stream}: {count}")?;
            }
        }

        Ok(())
    }
}

/// Statistics summary of one running series.
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count(),
            min: stats.min(),
            max: stats.max(),
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// Online statistics (Welford's algorithm).
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
            return;
        }

        self.min = self.min.min(value);
        self.max = self.max.max(value);

        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        let delta2 = value - self.mean;
        self.m2 += delta * delta2;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }
}
