//! Scriptable in-memory broker for tests without a network.
//!
//! Clones share state, so a test keeps one handle for scripting
//! (`go_down`, `withhold_acks`, `fail_connects`) while the controller owns
//! another as its transport.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use contracts::{
    BrokerCredentials, BrokerTransport, DeliveryReceipt, DeliveryTicket, LinkStatus, QosLevel,
    RelayError,
};
use tokio::sync::watch;
use tracing::debug;

/// One captured publish.
#[derive(Debug, Clone)]
pub struct PublishedRecord {
    pub topic: String,
    pub payload: Bytes,
    pub qos: QosLevel,
}

#[derive(Debug)]
struct MockState {
    published: Vec<PublishedRecord>,
    withhold_acks: bool,
    connect_failures_left: u32,
    down: bool,
    /// Tickets held back while acks are withheld; dropped on link loss so
    /// receipts resolve unacknowledged, exactly like a dying session
    pending: VecDeque<DeliveryTicket>,
}

/// In-memory broker double.
#[derive(Debug, Clone)]
pub struct MockBroker {
    state: Arc<Mutex<MockState>>,
    link_tx: Arc<watch::Sender<LinkStatus>>,
}

impl MockBroker {
    pub fn new() -> Self {
        let (link_tx, _) = watch::channel(LinkStatus::Down);
        Self {
            state: Arc::new(Mutex::new(MockState {
                published: Vec::new(),
                withhold_acks: false,
                connect_failures_left: 0,
                down: false,
                pending: VecDeque::new(),
            })),
            link_tx: Arc::new(link_tx),
        }
    }

    /// Make the next `n` connect attempts fail (`u32::MAX` for all of them).
    pub fn fail_connects(&self, n: u32) {
        self.state.lock().unwrap().connect_failures_left = n;
    }

    /// Hold acknowledgments back instead of resolving receipts immediately.
    pub fn withhold_acks(&self, withhold: bool) {
        self.state.lock().unwrap().withhold_acks = withhold;
    }

    /// Release every withheld acknowledgment.
    pub fn ack_all(&self) {
        let mut state = self.state.lock().unwrap();
        while let Some(ticket) = state.pending.pop_front() {
            ticket.acknowledge();
        }
    }

    /// Kill the link: pending deliveries die unacknowledged and subsequent
    /// connects fail until [`Self::go_up`].
    pub fn go_down(&self) {
        let mut state = self.state.lock().unwrap();
        state.down = true;
        state.pending.clear();
        self.link_tx.send_replace(LinkStatus::Down);
    }

    /// Restore reachability.
    pub fn go_up(&self) {
        self.state.lock().unwrap().down = false;
    }

    /// Everything published so far, in order.
    pub fn published(&self) -> Vec<PublishedRecord> {
        self.state.lock().unwrap().published.clone()
    }
}

impl Default for MockBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl BrokerTransport for MockBroker {
    async fn connect(&mut self, credentials: &BrokerCredentials) -> Result<(), RelayError> {
        let mut state = self.state.lock().unwrap();
        if state.connect_failures_left > 0 {
            if state.connect_failures_left != u32::MAX {
                state.connect_failures_left -= 1;
            }
            return Err(RelayError::connect("scripted connect failure"));
        }
        if state.down {
            return Err(RelayError::connect("broker unreachable"));
        }
        debug!(client_id = %credentials.client_id, "mock session established");
        self.link_tx.send_replace(LinkStatus::Up);
        Ok(())
    }

    async fn publish(
        &mut self,
        topic: &str,
        payload: Bytes,
        qos: QosLevel,
    ) -> Result<DeliveryReceipt, RelayError> {
        let mut state = self.state.lock().unwrap();
        if state.down {
            return Err(RelayError::transport("link is down"));
        }
        state.published.push(PublishedRecord {
            topic: topic.to_string(),
            payload,
            qos,
        });
        if qos == QosLevel::AtMostOnce || !state.withhold_acks {
            return Ok(DeliveryReceipt::acknowledged());
        }
        let (ticket, receipt) = DeliveryReceipt::pair();
        state.pending.push_back(ticket);
        Ok(receipt)
    }

    async fn disconnect(&mut self) -> Result<(), RelayError> {
        let mut state = self.state.lock().unwrap();
        state.pending.clear();
        self.link_tx.send_replace(LinkStatus::Down);
        Ok(())
    }

    fn link_status(&self) -> watch::Receiver<LinkStatus> {
        self.link_tx.subscribe()
    }
}
