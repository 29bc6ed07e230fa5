//! Per-stream delivery metrics.
//!
//! Updated from the publish path with atomics so a snapshot request can
//! never stall delivery.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Rolling latency window size (matches the measurement horizon of the
/// original deployment).
const LATENCY_WINDOW: usize = 1000;

/// Metrics for a single stream channel
#[derive(Debug, Default)]
pub struct StreamMetrics {
    /// Current queue depth
    queue_depth: AtomicUsize,
    /// Messages acknowledged by the broker
    published: AtomicU64,
    /// Messages dropped by queue policy or encoding rejection
    dropped: AtomicU64,
    /// Messages discarded because shutdown grace expired
    dropped_on_shutdown: AtomicU64,
    /// Messages that exhausted their retry budget
    failed: AtomicU64,
    /// Rolling end-to-end latency samples (seconds, send to ack)
    latency: Mutex<VecDeque<f64>>,
    /// Last sample arrival, nanoseconds since the Unix epoch (0 = never)
    last_seen_nanos: AtomicU64,
}

impl StreamMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_depth(&self) -> usize {
        self.queue_depth.load(Ordering::Relaxed)
    }

    pub fn set_queue_depth(&self, depth: usize) {
        self.queue_depth.store(depth, Ordering::Relaxed);
    }

    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    pub fn inc_published(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn inc_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dropped_on_shutdown(&self) -> u64 {
        self.dropped_on_shutdown.load(Ordering::Relaxed)
    }

    pub fn inc_dropped_on_shutdown(&self) {
        self.dropped_on_shutdown.fetch_add(1, Ordering::Relaxed);
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn inc_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one delivery latency measurement (seconds).
    pub fn record_latency(&self, seconds: f64) {
        let mut window = self.latency.lock().expect("latency window poisoned");
        if window.len() == LATENCY_WINDOW {
            window.pop_front();
        }
        window.push_back(seconds);
    }

    /// Rolling average latency in seconds, 0.0 when no samples yet.
    pub fn average_latency(&self) -> f64 {
        let window = self.latency.lock().expect("latency window poisoned");
        if window.is_empty() {
            0.0
        } else {
            window.iter().sum::<f64>() / window.len() as f64
        }
    }

    /// Note a sample arrival, for stalled-source detection.
    pub fn mark_seen(&self, nanos_since_epoch: u64) {
        self.last_seen_nanos
            .store(nanos_since_epoch, Ordering::Relaxed);
    }

    pub fn last_seen_nanos(&self) -> Option<u64> {
        match self.last_seen_nanos.load(Ordering::Relaxed) {
            0 => None,
            n => Some(n),
        }
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> StreamMetricsSnapshot {
        StreamMetricsSnapshot {
            queue_depth: self.queue_depth(),
            published: self.published(),
            dropped: self.dropped(),
            dropped_on_shutdown: self.dropped_on_shutdown(),
            failed: self.failed(),
            average_latency_ms: self.average_latency() * 1000.0,
            last_seen_nanos: self.last_seen_nanos(),
        }
    }
}

/// Snapshot of stream metrics (for reporting)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamMetricsSnapshot {
    pub queue_depth: usize,
    pub published: u64,
    pub dropped: u64,
    pub dropped_on_shutdown: u64,
    pub failed: u64,
    pub average_latency_ms: f64,
    pub last_seen_nanos: Option<u64>,
}
