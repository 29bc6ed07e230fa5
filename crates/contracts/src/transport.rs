//! BrokerTransport trait - pub/sub client capability consumed by the relay.
//!
//! The relay never implements the broker protocol; it drives a transport
//! through this interface. The connection handle is exclusively owned by the
//! reliability controller, no other component issues network I/O.

use bytes::Bytes;
use tokio::sync::{oneshot, watch};

use crate::RelayError;

/// Credentials and identity for the broker session.
#[derive(Debug, Clone, Default)]
pub struct BrokerCredentials {
    /// Client identifier presented to the broker
    pub client_id: String,

    /// Optional username/password pair
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Delivery guarantee requested for a single publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QosLevel {
    /// Fire-and-forget; local send counts as confirmation
    AtMostOnce,
    /// Broker acknowledgment required
    AtLeastOnce,
}

/// Link status reported by the transport, including unsolicited disconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Up,
    Down,
}

/// Connection lifecycle of the reliability controller.
///
/// `Closed` is terminal: explicit shutdown, or the consecutive connect
/// failure budget was exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Closed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Resolves when the broker acknowledges a published message.
///
/// For `QosLevel::AtMostOnce` the transport resolves the receipt immediately
/// after the local send.
#[derive(Debug)]
pub struct DeliveryReceipt {
    rx: oneshot::Receiver<()>,
}

impl DeliveryReceipt {
    /// Create a linked ticket/receipt pair. The transport keeps the ticket
    /// and resolves it when the acknowledgment arrives.
    pub fn pair() -> (DeliveryTicket, DeliveryReceipt) {
        let (tx, rx) = oneshot::channel();
        (DeliveryTicket { tx }, DeliveryReceipt { rx })
    }

    /// A receipt that is already acknowledged (at-most-once sends).
    pub fn acknowledged() -> DeliveryReceipt {
        let (ticket, receipt) = Self::pair();
        ticket.acknowledge();
        receipt
    }

    /// Wait for the acknowledgment. Returns `false` if the transport dropped
    /// the ticket without acknowledging (connection lost mid-flight).
    pub async fn wait(self) -> bool {
        self.rx.await.is_ok()
    }
}

/// Transport-side half of a delivery receipt.
#[derive(Debug)]
pub struct DeliveryTicket {
    tx: oneshot::Sender<()>,
}

impl DeliveryTicket {
    /// Mark the message acknowledged.
    pub fn acknowledge(self) {
        let _ = self.tx.send(());
    }
}

/// Async pub/sub transport capability.
#[trait_variant::make(BrokerTransport: Send)]
pub trait LocalBrokerTransport {
    /// Establish (or re-establish) the broker session.
    ///
    /// # Errors
    /// `RelayError::Connect` on unreachable broker or rejected auth.
    async fn connect(&mut self, credentials: &BrokerCredentials) -> Result<(), RelayError>;

    /// Publish one payload. Returns a receipt resolving on acknowledgment.
    ///
    /// # Errors
    /// `RelayError::Transport` when the link is down or the send fails.
    async fn publish(
        &mut self,
        topic: &str,
        payload: Bytes,
        qos: QosLevel,
    ) -> Result<DeliveryReceipt, RelayError>;

    /// Tear down the session.
    async fn disconnect(&mut self) -> Result<(), RelayError>;

    /// Watch channel carrying the link status; flips to `Down` on
    /// unsolicited disconnects.
    fn link_status(&self) -> watch::Receiver<LinkStatus>;
}
