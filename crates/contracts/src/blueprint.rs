//! RelayBlueprint - Config Loader output
//!
//! Describes the complete relay configuration: broker endpoint, stream
//! routing and priorities, reliability policy, clock-sync cadence. The relay
//! treats all of this as externally supplied and validated before start.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{QosLevel, StreamId};

/// Configuration version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete relay configuration blueprint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayBlueprint {
    /// Configuration version
    #[serde(default)]
    pub version: ConfigVersion,

    /// Broker endpoint and session settings
    pub broker: BrokerConfig,

    /// Stream routing definitions
    #[serde(default)]
    pub streams: Vec<StreamConfig>,

    /// Reliability / buffering policy
    #[serde(default)]
    pub reliability: ReliabilityConfig,

    /// Clock-sync collaborator cadence
    #[serde(default)]
    pub clock_sync: ClockSyncConfig,
}

/// Broker endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Broker hostname or IP
    pub host: String,

    /// Broker port
    #[serde(default = "default_broker_port")]
    pub port: u16,

    /// Optional authentication
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,

    /// TLS toggle
    #[serde(default)]
    pub tls: bool,

    /// Keep-alive interval (seconds)
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,

    /// Client id; generated from the process id when absent
    #[serde(default)]
    pub client_id: Option<String>,

    /// Topic namespace prefix: topic = "{namespace}/{stream_id}"
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Delivery guarantee level
    #[serde(default)]
    pub guarantee: GuaranteeLevel,
}

fn default_broker_port() -> u16 {
    1883
}

fn default_keepalive_secs() -> u64 {
    60
}

fn default_namespace() -> String {
    "lsl".to_string()
}

/// Delivery guarantee level, fixed by configuration before start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuaranteeLevel {
    /// Local send counts as delivery
    AtMostOnce,
    /// Broker acknowledgment required (default, matches MQTT QoS 1)
    #[default]
    AtLeastOnce,
}

impl GuaranteeLevel {
    /// Map to the per-publish QoS level.
    pub fn qos(self) -> QosLevel {
        match self {
            Self::AtMostOnce => QosLevel::AtMostOnce,
            Self::AtLeastOnce => QosLevel::AtLeastOnce,
        }
    }
}

/// Per-stream routing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Stream identifier
    pub id: StreamId,

    /// Scheduling priority; lower consumes bandwidth first
    #[serde(default)]
    pub priority: u8,

    /// Explicit topic override; defaults to "{namespace}/{stream_id}"
    #[serde(default)]
    pub topic: Option<String>,
}

/// Reliability controller policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReliabilityConfig {
    /// Shared outbound slot budget across all stream queues
    #[serde(default = "default_queue_budget")]
    pub queue_budget: usize,

    /// Per-message acknowledgment timeout (milliseconds)
    #[serde(default = "default_ack_timeout_ms")]
    pub ack_timeout_ms: u64,

    /// Retry budget per message before it becomes Failed
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Consecutive connect failures before the channel closes terminally
    #[serde(default = "default_max_connect_failures")]
    pub max_connect_failures: u32,

    /// Reconnect backoff lower bound (milliseconds)
    #[serde(default = "default_backoff_initial_ms")]
    pub backoff_initial_ms: u64,

    /// Reconnect backoff upper bound (milliseconds)
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// Uniform jitter fraction applied to each backoff delay (0.0 - 1.0)
    #[serde(default = "default_backoff_jitter")]
    pub backoff_jitter: f64,

    /// Sustained-full window before upstream backpressure engages
    /// (milliseconds)
    #[serde(default = "default_backpressure_window_ms")]
    pub backpressure_window_ms: u64,

    /// Grace period for in-flight messages at shutdown (milliseconds)
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

fn default_queue_budget() -> usize {
    1000
}

fn default_ack_timeout_ms() -> u64 {
    5000
}

fn default_max_retries() -> u32 {
    3
}

fn default_max_connect_failures() -> u32 {
    5
}

fn default_backoff_initial_ms() -> u64 {
    1000
}

fn default_backoff_max_ms() -> u64 {
    60_000
}

fn default_backoff_jitter() -> f64 {
    0.2
}

fn default_backpressure_window_ms() -> u64 {
    2000
}

fn default_shutdown_grace_ms() -> u64 {
    5000
}

impl Default for ReliabilityConfig {
    fn default() -> Self {
        Self {
            queue_budget: default_queue_budget(),
            ack_timeout_ms: default_ack_timeout_ms(),
            max_retries: default_max_retries(),
            max_connect_failures: default_max_connect_failures(),
            backoff_initial_ms: default_backoff_initial_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            backoff_jitter: default_backoff_jitter(),
            backpressure_window_ms: default_backpressure_window_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

impl ReliabilityConfig {
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn backoff_initial(&self) -> Duration {
        Duration::from_millis(self.backoff_initial_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }

    pub fn backpressure_window(&self) -> Duration {
        Duration::from_millis(self.backpressure_window_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

/// Clock-sync collaborator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClockSyncConfig {
    /// Refresh interval for per-stream offset estimates (seconds)
    #[serde(default = "default_sync_refresh_secs")]
    pub refresh_interval_secs: u64,
}

fn default_sync_refresh_secs() -> u64 {
    5
}

impl Default for ClockSyncConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_sync_refresh_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reliability_defaults() {
        let config = ReliabilityConfig::default();
        assert_eq!(config.queue_budget, 1000);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.backoff_initial(), Duration::from_secs(1));
        assert_eq!(config.backoff_max(), Duration::from_secs(60));
        assert!((config.backoff_jitter - 0.2).abs() < f64::EPSILON);
    }

    #[test]
    fn test_guarantee_default_is_at_least_once() {
        assert_eq!(GuaranteeLevel::default(), GuaranteeLevel::AtLeastOnce);
        assert_eq!(GuaranteeLevel::default().qos(), QosLevel::AtLeastOnce);
    }

    #[test]
    fn test_blueprint_minimal_json() {
        let json = r#"{ "broker": { "host": "localhost" } }"#;
        let bp: RelayBlueprint = serde_json::from_str(json).unwrap();
        assert_eq!(bp.broker.port, 1883);
        assert_eq!(bp.broker.namespace, "lsl");
        assert!(bp.streams.is_empty());
        assert_eq!(bp.reliability.queue_budget, 1000);
        assert_eq!(bp.clock_sync.refresh_interval_secs, 5);
    }
}
