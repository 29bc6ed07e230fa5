//! Layered error definitions
//!
//! Categorized by source: config / encoding / transport / delivery / source

use thiserror::Error;

/// Unified error type
#[derive(Debug, Error)]
pub enum RelayError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Encoding Errors =====
    /// Malformed sample (non-finite values, empty stream id). Dropped and
    /// counted, never fatal.
    #[error("encoding error for stream '{stream_id}': {message}")]
    Encoding { stream_id: String, message: String },

    // ===== Transport Errors =====
    /// Broker unreachable or auth rejected
    #[error("broker connect error: {message}")]
    Connect { message: String },

    /// Consecutive connect failures exceeded the configured budget; the
    /// relay reports this once and enters the terminal Closed state
    #[error("broker unreachable after {attempts} consecutive attempts")]
    ConnectExhausted { attempts: u32 },

    /// Transport-level fault during an established session
    #[error("transport error: {message}")]
    Transport { message: String },

    // ===== Delivery Errors =====
    /// Acknowledgment did not arrive inside the timeout; retried up to the
    /// configured limit, then the message is marked failed
    #[error("delivery timeout for stream '{stream_id}' seq {sequence}")]
    DeliveryTimeout { stream_id: String, sequence: u64 },

    /// Message evicted by the bounded-queue policy
    #[error("queue overflow on stream '{stream_id}': dropped seq {sequence}")]
    QueueOverflow { stream_id: String, sequence: u64 },

    // ===== Source Errors =====
    /// Sample source fault, distinct from normal end-of-stream
    #[error("source error on stream '{stream_id}': {message}")]
    Source { stream_id: String, message: String },

    // ===== Lifecycle =====
    /// Operation rejected because shutdown is in progress
    #[error("relay is shutting down")]
    ShuttingDown,

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl RelayError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create encoding error
    pub fn encoding(stream_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Encoding {
            stream_id: stream_id.into(),
            message: message.into(),
        }
    }

    /// Create broker connect error
    pub fn connect(message: impl Into<String>) -> Self {
        Self::Connect {
            message: message.into(),
        }
    }

    /// Create transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create source error
    pub fn source(stream_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Source {
            stream_id: stream_id.into(),
            message: message.into(),
        }
    }

    /// Whether this failure is local to a single sample or message and must
    /// never unwind the relay
    pub fn is_sample_local(&self) -> bool {
        matches!(
            self,
            Self::Encoding { .. } | Self::DeliveryTimeout { .. } | Self::QueueOverflow { .. }
        )
    }
}
