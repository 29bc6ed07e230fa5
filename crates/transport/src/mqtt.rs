//! MQTT 3.1.1 transport on rumqttc.
//!
//! Acknowledgment correlation is FIFO: the controller keeps at most one
//! message in flight, so the next PUBACK always belongs to the oldest
//! pending ticket.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use contracts::{
    BrokerConfig, BrokerCredentials, BrokerTransport, DeliveryReceipt, DeliveryTicket, LinkStatus,
    QosLevel, RelayError,
};
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// MQTT broker session.
pub struct MqttTransport {
    host: String,
    port: u16,
    tls: bool,
    keepalive: Duration,
    client: Option<AsyncClient>,
    event_task: Option<JoinHandle<()>>,
    pending: Arc<Mutex<VecDeque<DeliveryTicket>>>,
    link_tx: Arc<watch::Sender<LinkStatus>>,
}

impl MqttTransport {
    pub fn new(config: &BrokerConfig) -> Self {
        let (link_tx, _) = watch::channel(LinkStatus::Down);
        Self {
            host: config.host.clone(),
            port: config.port,
            tls: config.tls,
            keepalive: Duration::from_secs(config.keepalive_secs),
            client: None,
            event_task: None,
            pending: Arc::new(Mutex::new(VecDeque::new())),
            link_tx: Arc::new(link_tx),
        }
    }

    fn teardown(&mut self) {
        if let Some(task) = self.event_task.take() {
            task.abort();
        }
        self.client = None;
        self.pending.lock().unwrap().clear();
    }

    /// Poll the session event loop until it dies, resolving withheld
    /// tickets as PUBACKs arrive.
    async fn drive(
        mut eventloop: EventLoop,
        pending: Arc<Mutex<VecDeque<DeliveryTicket>>>,
        link_tx: Arc<watch::Sender<LinkStatus>>,
    ) {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::PubAck(ack))) => {
                    let ticket = pending.lock().unwrap().pop_front();
                    match ticket {
                        Some(ticket) => ticket.acknowledge(),
                        None => warn!(pkid = ack.pkid, "puback without a pending delivery"),
                    }
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    info!("broker sent disconnect");
                    break;
                }
                Ok(event) => debug!(?event, "mqtt event"),
                Err(e) => {
                    warn!(error = %e, "mqtt event loop error");
                    break;
                }
            }
        }
        // Dropping the tickets resolves their receipts unacknowledged; the
        // controller re-queues those messages on reconnect.
        pending.lock().unwrap().clear();
        link_tx.send_replace(LinkStatus::Down);
    }
}

impl BrokerTransport for MqttTransport {
    async fn connect(&mut self, credentials: &BrokerCredentials) -> Result<(), RelayError> {
        self.teardown();

        let mut options = MqttOptions::new(&credentials.client_id, &self.host, self.port);
        options.set_keep_alive(self.keepalive);
        if let (Some(user), Some(pass)) = (&credentials.username, &credentials.password) {
            options.set_credentials(user, pass);
        }
        if self.tls {
            options.set_transport(rumqttc::Transport::tls_with_default_config());
        }

        let (client, mut eventloop) = AsyncClient::new(options, 16);

        // Do not hand the session out before the broker accepts it
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    if ack.code == ConnectReturnCode::Success {
                        break;
                    }
                    return Err(RelayError::connect(format!(
                        "broker rejected session: {:?}",
                        ack.code
                    )));
                }
                Ok(_) => continue,
                Err(e) => return Err(RelayError::connect(e.to_string())),
            }
        }

        info!(host = %self.host, port = self.port, tls = self.tls, "mqtt session established");
        self.link_tx.send_replace(LinkStatus::Up);
        self.client = Some(client);
        self.event_task = Some(tokio::spawn(Self::drive(
            eventloop,
            Arc::clone(&self.pending),
            Arc::clone(&self.link_tx),
        )));
        Ok(())
    }

    async fn publish(
        &mut self,
        topic: &str,
        payload: Bytes,
        qos: QosLevel,
    ) -> Result<DeliveryReceipt, RelayError> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| RelayError::transport("no active broker session"))?;

        match qos {
            QosLevel::AtMostOnce => {
                client
                    .publish(topic, QoS::AtMostOnce, false, payload.to_vec())
                    .await
                    .map_err(|e| RelayError::transport(e.to_string()))?;
                Ok(DeliveryReceipt::acknowledged())
            }
            QosLevel::AtLeastOnce => {
                let (ticket, receipt) = DeliveryReceipt::pair();
                // Enqueue before sending so the ack cannot race the ticket
                self.pending.lock().unwrap().push_back(ticket);
                if let Err(e) = client
                    .publish(topic, QoS::AtLeastOnce, false, payload.to_vec())
                    .await
                {
                    self.pending.lock().unwrap().pop_back();
                    return Err(RelayError::transport(e.to_string()));
                }
                Ok(receipt)
            }
        }
    }

    async fn disconnect(&mut self) -> Result<(), RelayError> {
        if let Some(client) = self.client.take() {
            if let Err(e) = client.disconnect().await {
                debug!(error = %e, "disconnect request failed, session already gone");
            }
        }
        self.teardown();
        self.link_tx.send_replace(LinkStatus::Down);
        Ok(())
    }

    fn link_status(&self) -> watch::Receiver<LinkStatus> {
        self.link_tx.subscribe()
    }
}

impl Drop for MqttTransport {
    fn drop(&mut self) {
        if let Some(task) = self.event_task.take() {
            task.abort();
        }
    }
}
