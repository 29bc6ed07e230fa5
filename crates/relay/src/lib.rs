//! # Relay Core
//!
//! Binds sample sources to the reliability controller: one worker task per
//! stream pulls samples, annotates them with temporal metadata, encodes the
//! wire payload and submits the result for delivery.
//!
//! Responsibilities:
//! - Per-stream worker lifecycle (attach, run, end-of-stream teardown)
//! - Topic routing `{namespace}/{stream_id}` with per-stream overrides
//! - Last-seen activity tracking per stream
//!
//! Malformed samples are dropped and counted; they never stop a worker.

mod mock;
mod pipeline;
mod router;
mod worker;

pub use pipeline::RelayCore;
pub use mock::{MockSampleSource, MockSourceConfig, MockStreamKind};
pub use router::resolve_topic;
pub use worker::StreamWorker;
