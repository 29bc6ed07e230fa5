//! # Reliability
//!
//! The connection and delivery state machine: per-stream bounded queues,
//! priority-aware eviction, reconnect backoff, per-message retry, and
//! buffering-under-disconnection.
//!
//! The broker connection handle is exclusively owned by the controller task
//! spawned here; producers interact only through [`ReliabilityHandle`].

mod backoff;
mod channel;
mod controller;
mod metrics;

pub use backoff::Backoff;
pub use controller::{
    RelaySnapshot, ReliabilityController, ReliabilityHandle, StreamSnapshot, SubmitOutcome,
};
pub use metrics::{StreamMetrics, StreamMetricsSnapshot};
