//! # Transport
//!
//! Broker transport implementations behind the `BrokerTransport` contract.
//!
//! - [`MockBroker`]: scriptable in-memory broker for tests without network
//! - [`MqttTransport`]: MQTT 3.1.1 session (feature `mqtt`, on by default)
//!
//! The reliability controller owns whichever transport is chosen; nothing
//! else in the relay performs network I/O.

mod mock;

#[cfg(feature = "mqtt")]
mod mqtt;

pub use mock::{MockBroker, PublishedRecord};

#[cfg(feature = "mqtt")]
pub use mqtt::MqttTransport;
