//! # Timebase
//!
//! Timestamp management: converts raw acquisition timestamps plus the local
//! clock-offset estimate into canonical, precision-preserving temporal
//! records.
//!
//! The clock-sync collaborator writes `ClockSyncRecord`s into the
//! `ClockSyncRegistry` on its own cadence; the `TimestampManager` only ever
//! reads them. A stream without a record yet is annotated with an explicitly
//! unavailable offset, never a fabricated zero.

mod manager;
mod registry;

pub use manager::TimestampManager;
pub use registry::ClockSyncRegistry;
