//! SampleSource trait - stream data source abstraction
//!
//! Stream discovery and acquisition live outside the relay; this trait is the
//! pull interface the relay consumes. Real LSL inlets and mock sources
//! implement the same contract.

use crate::{RelayError, Sample, StreamId};

/// Per-stream sample feed.
///
/// # Termination
/// - `Ok(Some(sample))` - next sample, in capture order
/// - `Ok(None)` - normal end-of-stream; the stream's channel drains and is
///   torn down
/// - `Err(_)` - source disconnect or fault, explicitly distinct from normal
///   termination
#[trait_variant::make(SampleSource: Send)]
pub trait LocalSampleSource {
    /// Stream this source feeds
    fn stream_id(&self) -> &StreamId;

    /// Wait for and return the next sample
    async fn next_sample(&mut self) -> Result<Option<Sample>, RelayError>;
}
