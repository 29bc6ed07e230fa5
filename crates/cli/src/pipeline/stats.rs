//! Pipeline run statistics.

use std::time::Duration;

use observability::RelayMetricsAggregator;

/// Final statistics for one pipeline run
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Samples acknowledged by the broker
    pub samples_published: u64,

    /// Samples dropped by queue policy, encoding rejection or shutdown
    pub samples_dropped: u64,

    /// Samples that exhausted their retry budget
    pub samples_failed: u64,

    /// Wall-clock duration of the run
    pub duration: Duration,

    /// Number of streams that were attached
    pub active_streams: usize,

    /// Aggregated relay metrics collected while running
    pub relay_metrics: RelayMetricsAggregator,
}

impl PipelineStats {
    /// Published samples per second over the whole run.
    pub fn throughput(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.samples_published as f64 / secs
        } else {
            0.0
        }
    }

    /// Fraction of submitted samples that reached the broker.
    pub fn delivery_rate(&self) -> f64 {
        let total = self.samples_published + self.samples_dropped + self.samples_failed;
        if total > 0 {
            self.samples_published as f64 / total as f64
        } else {
            1.0
        }
    }

    /// Print the run summary to stdout.
    pub fn print_summary(&self) {
        println!("\n=== Pipeline Statistics ===");
        println!("Duration:          {:.2}s", self.duration.as_secs_f64());
        println!("Active streams:    {}", self.active_streams);
        println!("Samples published: {}", self.samples_published);
        println!("Samples dropped:   {}", self.samples_dropped);
        println!("Samples failed:    {}", self.samples_failed);
        println!("Throughput:        {:.1} samples/s", self.throughput());
        println!("Delivery rate:     {:.2}%", self.delivery_rate() * 100.0);
        println!("{}", self.relay_metrics.summary());
    }
}
