//! Lossless timestamp representation and clock-sync records.
//!
//! Acquisition timestamps must survive the trip to the cloud without
//! precision loss, so they are carried as integer nanoseconds and encoded as
//! decimal strings ("12345.000000789") on the wire. A binary f64 would
//! silently truncate beyond ~15 significant digits.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

const NANOS_PER_SEC: i64 = 1_000_000_000;

/// A signed timestamp (or clock offset) with exactly nanosecond resolution.
///
/// Internally a single `i64` nanosecond count, which covers roughly ±292
/// years around zero. Offsets between a source clock and the reference clock
/// can be negative, so the sign is part of the representation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DecimalTimestamp {
    nanos: i64,
}

impl DecimalTimestamp {
    pub const ZERO: Self = Self { nanos: 0 };

    /// Construct from a raw nanosecond count.
    #[inline]
    pub const fn from_nanos(nanos: i64) -> Self {
        Self { nanos }
    }

    /// Construct from whole seconds plus a sub-second nanosecond part.
    ///
    /// `subsec_nanos` must be below one second; the sign of `secs` applies to
    /// the whole value.
    pub const fn from_parts(secs: i64, subsec_nanos: u32) -> Self {
        let sub = subsec_nanos as i64;
        let nanos = if secs < 0 {
            secs * NANOS_PER_SEC - sub
        } else {
            secs * NANOS_PER_SEC + sub
        };
        Self { nanos }
    }

    /// Lossy conversion from floating seconds, rounded to the nearest
    /// nanosecond. Only meant for interop with float-based source clocks;
    /// once converted, the value is exact.
    pub fn from_secs_f64(secs: f64) -> Self {
        Self {
            nanos: (secs * NANOS_PER_SEC as f64).round() as i64,
        }
    }

    /// Reference-clock "now" as nanoseconds since the Unix epoch.
    pub fn now_utc() -> Self {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(d) => Self {
                nanos: d.as_nanos() as i64,
            },
            // Clock before epoch, only possible on a badly set system clock
            Err(e) => Self {
                nanos: -(e.duration().as_nanos() as i64),
            },
        }
    }

    #[inline]
    pub const fn as_nanos(&self) -> i64 {
        self.nanos
    }

    /// Lossy view as floating seconds, for metrics and logging only.
    #[inline]
    pub fn as_secs_f64(&self) -> f64 {
        self.nanos as f64 / NANOS_PER_SEC as f64
    }

    pub const fn saturating_add(self, other: Self) -> Self {
        Self {
            nanos: self.nanos.saturating_add(other.nanos),
        }
    }

    pub const fn saturating_sub(self, other: Self) -> Self {
        Self {
            nanos: self.nanos.saturating_sub(other.nanos),
        }
    }

}

impl fmt::Display for DecimalTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let abs = self.nanos.unsigned_abs();
        let sign = if self.nanos < 0 { "-" } else { "" };
        write!(
            f,
            "{}{}.{:09}",
            sign,
            abs / NANOS_PER_SEC as u64,
            abs % NANOS_PER_SEC as u64
        )
    }
}

/// Error parsing a decimal timestamp string.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid decimal timestamp '{input}': {reason}")]
pub struct ParseTimestampError {
    pub input: String,
    pub reason: String,
}

impl ParseTimestampError {
    fn new(input: &str, reason: impl Into<String>) -> Self {
        Self {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}

impl FromStr for DecimalTimestamp {
    type Err = ParseTimestampError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (sign, body) = match s.strip_prefix('-') {
            Some(rest) => (-1i64, rest),
            None => (1i64, s),
        };
        if body.is_empty() {
            return Err(ParseTimestampError::new(s, "empty"));
        }

        let (int_part, frac_part) = match body.split_once('.') {
            Some((i, f)) => (i, f),
            None => (body, ""),
        };

        if frac_part.len() > 9 {
            return Err(ParseTimestampError::new(
                s,
                "more than 9 fractional digits (sub-nanosecond)",
            ));
        }
        if !int_part.chars().all(|c| c.is_ascii_digit())
            || !frac_part.chars().all(|c| c.is_ascii_digit())
        {
            return Err(ParseTimestampError::new(s, "non-digit character"));
        }

        let secs: i64 = int_part
            .parse()
            .map_err(|_| ParseTimestampError::new(s, "seconds out of range"))?;

        // Right-pad the fractional digits to a full nanosecond count
        let mut frac: i64 = 0;
        if !frac_part.is_empty() {
            frac = frac_part
                .parse()
                .map_err(|_| ParseTimestampError::new(s, "bad fractional part"))?;
            frac *= 10i64.pow(9 - frac_part.len() as u32);
        }

        let nanos = secs
            .checked_mul(NANOS_PER_SEC)
            .and_then(|n| n.checked_add(frac))
            .and_then(|n| n.checked_mul(sign))
            .ok_or_else(|| ParseTimestampError::new(s, "out of range"))?;

        Ok(Self { nanos })
    }
}

// Wire encoding is the decimal string, never a JSON number
impl Serialize for DecimalTimestamp {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DecimalTimestamp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Per-stream clock synchronization estimate.
///
/// Produced periodically by the clock-sync collaborator (the LSL time
/// correction machinery), read-only for the relay.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ClockSyncRecord {
    /// Estimated source-clock minus reference-clock difference
    pub offset: DecimalTimestamp,

    /// Uncertainty of the offset estimate
    pub uncertainty: DecimalTimestamp,

    /// Reference-clock time when the estimate was measured
    pub measured_at: DecimalTimestamp,
}

/// Canonical temporal annotation attached to every relayed sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemporalRecord {
    /// Original acquisition timestamp from the source clock, lossless
    pub source_timestamp: DecimalTimestamp,

    /// Clock offset at annotation time; `None` means no sync record existed
    /// yet for the stream, which consumers must be able to distinguish from
    /// a zero offset
    pub clock_offset: Option<DecimalTimestamp>,

    /// Reference-clock time at the moment of formatting, used downstream to
    /// compute one-way transport latency
    pub relay_send_time: DecimalTimestamp,
}
