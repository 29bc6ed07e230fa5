//! # Contracts
//!
//! Frozen interface contracts (ICD), defining inter-module data structures and traits.
//! All business crates can only depend on this crate, reverse dependencies are prohibited.
//!
//! ## Time Model
//! - Acquisition timestamps come from the source's monotonic clock (LSL local clock)
//! - They are carried as `DecimalTimestamp` (integer nanoseconds) end to end and
//!   encoded as decimal strings on the wire, never as binary floats

mod blueprint;
mod error;
mod message;
mod sample;
mod source;
mod stream_id;
mod timestamp;
mod transport;

pub use blueprint::*;
pub use error::*;
pub use message::*;
pub use sample::*;
pub use source::{LocalSampleSource, SampleSource};
pub use stream_id::StreamId;
pub use timestamp::*;
pub use transport::*;
