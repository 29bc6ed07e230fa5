//! The reliability controller task.
//!
//! Owns the broker transport exclusively. Producers talk to it through a
//! cloneable [`ReliabilityHandle`]; the controller serializes every queue
//! mutation and publish on a single task, so at most one message is in
//! flight and per-stream FIFO order survives reconnects.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use contracts::{
    BrokerCredentials, BrokerTransport, ConnectionState, LinkStatus, OutboundMessage, QosLevel,
    RelayError, ReliabilityConfig, StreamId,
};
use metrics::{counter, gauge, histogram};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{sleep_until, timeout};
use tracing::{debug, error, info, warn};

use crate::backoff::Backoff;
use crate::channel::{ChannelSet, EnqueueOutcome, PublishItem, RetryOutcome};
use crate::metrics::{StreamMetrics, StreamMetricsSnapshot};

const COMMAND_BUFFER: usize = 64;

/// Producer-visible result of a submit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Queued within budget
    Queued,
    /// Queued after displacing another stream's oldest pending message
    QueuedEvicting {
        victim: StreamId,
        evicted_sequence: u64,
    },
    /// The message itself was dropped (outranked, or stream unknown)
    Dropped,
}

/// Point-in-time view of one stream channel.
#[derive(Debug, Clone)]
pub struct StreamSnapshot {
    pub stream_id: StreamId,
    pub priority: u8,
    pub last_ack_sequence: Option<u64>,
    pub metrics: StreamMetricsSnapshot,
}

/// Point-in-time view of the whole relay.
#[derive(Debug, Clone)]
pub struct RelaySnapshot {
    pub connection: ConnectionState,
    pub total_queued: usize,
    pub streams: Vec<StreamSnapshot>,
}

enum Command {
    Register {
        stream_id: StreamId,
        priority: u8,
        reply: oneshot::Sender<Arc<StreamMetrics>>,
    },
    Submit {
        msg: OutboundMessage,
        reply: oneshot::Sender<SubmitOutcome>,
    },
    CloseStream {
        stream_id: StreamId,
    },
    Snapshot {
        reply: oneshot::Sender<RelaySnapshot>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Cloneable handle to the controller task.
#[derive(Clone)]
pub struct ReliabilityHandle {
    tx: mpsc::Sender<Command>,
    state_rx: watch::Receiver<ConnectionState>,
}

impl ReliabilityHandle {
    /// Register a stream channel; returns its metrics for activity marking.
    ///
    /// # Errors
    /// `RelayError::ShuttingDown` when the controller already stopped.
    pub async fn register_stream(
        &self,
        stream_id: StreamId,
        priority: u8,
    ) -> Result<Arc<StreamMetrics>, RelayError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Register {
                stream_id,
                priority,
                reply,
            })
            .await
            .map_err(|_| RelayError::ShuttingDown)?;
        rx.await.map_err(|_| RelayError::ShuttingDown)
    }

    /// Hand a message to the controller. Resolves once the message is
    /// queued or dropped; under sustained backpressure this awaits until a
    /// slot frees, which is what pauses the producer.
    ///
    /// # Errors
    /// `RelayError::ShuttingDown` when the controller already stopped.
    pub async fn submit(&self, msg: OutboundMessage) -> Result<SubmitOutcome, RelayError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Submit { msg, reply })
            .await
            .map_err(|_| RelayError::ShuttingDown)?;
        rx.await.map_err(|_| RelayError::ShuttingDown)
    }

    /// Signal end-of-stream; the channel is removed once drained.
    pub async fn close_stream(&self, stream_id: StreamId) -> Result<(), RelayError> {
        self.tx
            .send(Command::CloseStream { stream_id })
            .await
            .map_err(|_| RelayError::ShuttingDown)
    }

    /// Current snapshot of connection and per-stream state.
    ///
    /// # Errors
    /// `RelayError::ShuttingDown` when the controller already stopped.
    pub async fn snapshot(&self) -> Result<RelaySnapshot, RelayError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Snapshot { reply })
            .await
            .map_err(|_| RelayError::ShuttingDown)?;
        rx.await.map_err(|_| RelayError::ShuttingDown)
    }

    /// Request graceful shutdown and wait for the drain to finish.
    pub async fn shutdown(&self) -> Result<(), RelayError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Shutdown { reply })
            .await
            .map_err(|_| RelayError::ShuttingDown)?;
        // A closed reply means the controller exited first; that still
        // counts as shut down.
        let _ = rx.await;
        Ok(())
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }
}

enum ConnectOutcome {
    Connected,
    Exhausted(u32),
    Shutdown,
}

enum Flow {
    Reconnect,
    Shutdown,
}

enum PublishResult {
    Delivered,
    TimedOut,
    LinkLost,
}

/// Connection and delivery state machine. Construct with [`Self::new`],
/// then drive with [`Self::run`] on its own task.
pub struct ReliabilityController<T: BrokerTransport> {
    transport: T,
    credentials: BrokerCredentials,
    qos: QosLevel,
    config: ReliabilityConfig,
    channels: ChannelSet,
    backoff: Backoff,
    parked: VecDeque<(OutboundMessage, oneshot::Sender<SubmitOutcome>)>,
    rx: mpsc::Receiver<Command>,
    state_tx: watch::Sender<ConnectionState>,
    shutdown_reply: Option<oneshot::Sender<()>>,
}

impl<T: BrokerTransport> ReliabilityController<T> {
    pub fn new(
        transport: T,
        credentials: BrokerCredentials,
        qos: QosLevel,
        config: ReliabilityConfig,
    ) -> (Self, ReliabilityHandle) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let backoff = Backoff::new(
            config.backoff_initial(),
            config.backoff_max(),
            config.backoff_jitter,
        );
        let channels = ChannelSet::new(config.queue_budget);
        let controller = Self {
            transport,
            credentials,
            qos,
            config,
            channels,
            backoff,
            parked: VecDeque::new(),
            rx,
            state_tx,
            shutdown_reply: None,
        };
        (controller, ReliabilityHandle { tx, state_rx })
    }

    /// Drive the controller until shutdown or a terminal connection failure.
    ///
    /// # Errors
    /// `RelayError::ConnectExhausted` once the consecutive connect failure
    /// budget is spent; queued messages are reported dropped exactly once.
    pub async fn run(mut self) -> Result<(), RelayError> {
        self.set_state(ConnectionState::Connecting);
        loop {
            match self.connect_with_backoff().await {
                ConnectOutcome::Connected => {}
                ConnectOutcome::Shutdown => return self.close(false).await,
                ConnectOutcome::Exhausted(attempts) => {
                    let undelivered = self.channels.total_queued() + self.parked.len();
                    error!(
                        attempts,
                        undelivered, "broker unreachable, giving up and discarding queued data"
                    );
                    self.channels.drop_all_remaining();
                    self.fail_parked();
                    self.finish_closed();
                    return Err(RelayError::ConnectExhausted { attempts });
                }
            }

            let mut link_rx = self.transport.link_status();
            link_rx.mark_unchanged();
            self.backoff.reset();
            self.set_state(ConnectionState::Connected);
            info!("broker session established");

            match self.run_connected(&mut link_rx).await {
                Flow::Shutdown => return self.close(true).await,
                Flow::Reconnect => {
                    warn!("broker link lost, reconnecting");
                    self.set_state(ConnectionState::Reconnecting);
                }
            }
        }
    }

    /// Keep attempting to connect, sleeping the backoff delay between
    /// attempts. Commands (including submissions) are serviced while
    /// waiting, so data keeps buffering under disconnection.
    async fn connect_with_backoff(&mut self) -> ConnectOutcome {
        let mut consecutive: u32 = 0;
        loop {
            match self.transport.connect(&self.credentials).await {
                Ok(()) => return ConnectOutcome::Connected,
                Err(e) => {
                    consecutive += 1;
                    counter!("lsl_relay_connect_failures_total").increment(1);
                    if consecutive >= self.config.max_connect_failures {
                        return ConnectOutcome::Exhausted(consecutive);
                    }
                    let delay = self.backoff.next_delay();
                    warn!(
                        error = %e,
                        attempt = consecutive,
                        retry_in_ms = delay.as_millis() as u64,
                        "broker connect failed"
                    );
                    let deadline = tokio::time::Instant::now() + delay;
                    loop {
                        tokio::select! {
                            _ = sleep_until(deadline) => break,
                            cmd = self.rx.recv() => match cmd {
                                Some(cmd) => {
                                    if self.handle_command(cmd) {
                                        return ConnectOutcome::Shutdown;
                                    }
                                }
                                None => return ConnectOutcome::Shutdown,
                            },
                        }
                    }
                }
            }
        }
    }

    /// The connected loop: publish ready messages in priority order and
    /// service commands while idle. Returns on link loss or shutdown.
    async fn run_connected(&mut self, link_rx: &mut watch::Receiver<LinkStatus>) -> Flow {
        loop {
            while let Ok(cmd) = self.rx.try_recv() {
                if self.handle_command(cmd) {
                    return Flow::Shutdown;
                }
            }
            self.retry_parked();

            if *link_rx.borrow_and_update() == LinkStatus::Down {
                return Flow::Reconnect;
            }

            if let Some(item) = self.channels.next_ready() {
                if let PublishResult::LinkLost = self.publish_one(item).await {
                    return Flow::Reconnect;
                }
                continue;
            }

            tokio::select! {
                cmd = self.rx.recv() => match cmd {
                    Some(cmd) => {
                        if self.handle_command(cmd) {
                            return Flow::Shutdown;
                        }
                    }
                    None => return Flow::Shutdown,
                },
                changed = link_rx.changed() => {
                    if changed.is_err() || *link_rx.borrow_and_update() == LinkStatus::Down {
                        return Flow::Reconnect;
                    }
                }
            }
        }
    }

    /// Publish the in-flight front of one stream and settle its outcome.
    async fn publish_one(&mut self, item: PublishItem) -> PublishResult {
        let started = Instant::now();
        let receipt = match self
            .transport
            .publish(&item.topic, item.payload.clone(), self.qos)
            .await
        {
            Ok(receipt) => receipt,
            Err(e) => {
                warn!(stream = %item.stream_id, error = %e, "publish send failed");
                self.channels.release_front(&item.stream_id);
                return PublishResult::LinkLost;
            }
        };

        match timeout(self.config.ack_timeout(), receipt.wait()).await {
            Ok(true) => {
                let elapsed = started.elapsed().as_secs_f64();
                if let Some(m) = self.channels.metrics_of(&item.stream_id) {
                    m.record_latency(elapsed);
                }
                self.channels.complete_front(&item.stream_id);
                counter!("lsl_relay_published_total").increment(1);
                histogram!("lsl_relay_publish_latency_seconds").record(elapsed);
                self.update_depth_gauge();
                debug!(
                    stream = %item.stream_id,
                    sequence = item.sequence_number,
                    "delivery acknowledged"
                );
                PublishResult::Delivered
            }
            // Transport dropped the ticket without acknowledging: the link
            // went away mid-flight. Does not consume the retry budget.
            Ok(false) => {
                self.channels.release_front(&item.stream_id);
                PublishResult::LinkLost
            }
            Err(_) => {
                match self
                    .channels
                    .retry_front(&item.stream_id, self.config.max_retries)
                {
                    Some(RetryOutcome::Retrying { attempt }) => {
                        warn!(
                            stream = %item.stream_id,
                            sequence = item.sequence_number,
                            attempt,
                            "acknowledgment timeout, retrying in place"
                        );
                    }
                    Some(RetryOutcome::Failed(msg)) => {
                        let err = RelayError::DeliveryTimeout {
                            stream_id: item.stream_id.to_string(),
                            sequence: msg.sequence_number,
                        };
                        error!(
                            error = %err,
                            retries = msg.retry_count,
                            "delivery failed after exhausting retries"
                        );
                        counter!("lsl_relay_failed_total").increment(1);
                        self.update_depth_gauge();
                    }
                    None => {}
                }
                PublishResult::TimedOut
            }
        }
    }

    /// Returns true when shutdown was requested.
    fn handle_command(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::Register {
                stream_id,
                priority,
                reply,
            } => {
                let metrics = Arc::new(StreamMetrics::new());
                debug!(stream = %stream_id, priority, "stream channel registered");
                self.channels
                    .register(stream_id, priority, Arc::clone(&metrics));
                let _ = reply.send(metrics);
                false
            }
            Command::Submit { msg, reply } => {
                self.submit(msg, reply);
                false
            }
            Command::CloseStream { stream_id } => {
                debug!(stream = %stream_id, "stream channel closing");
                self.channels.close_stream(&stream_id);
                false
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
                false
            }
            Command::Shutdown { reply } => {
                self.shutdown_reply = Some(reply);
                true
            }
        }
    }

    fn submit(&mut self, msg: OutboundMessage, reply: oneshot::Sender<SubmitOutcome>) {
        let keep = msg.clone();
        match self
            .channels
            .enqueue(msg, self.config.backpressure_window())
        {
            EnqueueOutcome::Queued => {
                self.update_depth_gauge();
                let _ = reply.send(SubmitOutcome::Queued);
            }
            EnqueueOutcome::QueuedEvicting { victim, sequence } => {
                let err = RelayError::QueueOverflow {
                    stream_id: victim.to_string(),
                    sequence,
                };
                warn!(
                    error = %err,
                    incoming = %keep.stream_id,
                    "queue budget exhausted, evicted oldest pending message"
                );
                counter!("lsl_relay_dropped_total").increment(1);
                self.update_depth_gauge();
                let _ = reply.send(SubmitOutcome::QueuedEvicting {
                    victim,
                    evicted_sequence: sequence,
                });
            }
            EnqueueOutcome::Rejected => {
                warn!(
                    stream = %keep.stream_id,
                    sequence = keep.sequence_number,
                    "message dropped, only higher priority data queued"
                );
                counter!("lsl_relay_dropped_total").increment(1);
                let _ = reply.send(SubmitOutcome::Dropped);
            }
            EnqueueOutcome::Backpressure => {
                debug!(stream = %keep.stream_id, "queue sustained full, pausing producer");
                self.parked.push_back((keep, reply));
            }
            EnqueueOutcome::NotRegistered => {
                warn!(stream = %keep.stream_id, "submit for unknown stream");
                let _ = reply.send(SubmitOutcome::Dropped);
            }
        }
    }

    /// Re-admit producers parked under backpressure once slots free up.
    /// Resolving the reply is what unblocks the producer task.
    fn retry_parked(&mut self) {
        while self.channels.has_space() {
            let Some((msg, reply)) = self.parked.pop_front() else {
                break;
            };
            self.submit(msg, reply);
        }
    }

    fn fail_parked(&mut self) {
        for (_, reply) in self.parked.drain(..) {
            let _ = reply.send(SubmitOutcome::Dropped);
        }
    }

    fn snapshot(&self) -> RelaySnapshot {
        let mut streams = Vec::with_capacity(self.channels.stream_count());
        self.channels.for_each(|id, ch| {
            streams.push(StreamSnapshot {
                stream_id: id.clone(),
                priority: ch.priority,
                last_ack_sequence: ch.last_ack_sequence,
                metrics: ch.metrics.snapshot(),
            });
        });
        RelaySnapshot {
            connection: *self.state_tx.borrow(),
            total_queued: self.channels.total_queued(),
            streams,
        }
    }

    /// Graceful close: drain what the grace period allows, then discard
    /// the rest and report it.
    async fn close(&mut self, connected: bool) -> Result<(), RelayError> {
        if connected {
            let deadline = Instant::now() + self.config.shutdown_grace();
            while !self.channels.is_empty() && Instant::now() < deadline {
                let Some(item) = self.channels.next_ready() else {
                    break;
                };
                match self.publish_one(item).await {
                    PublishResult::Delivered => {}
                    PublishResult::TimedOut | PublishResult::LinkLost => break,
                }
            }
            if let Err(e) = self.transport.disconnect().await {
                warn!(error = %e, "broker disconnect failed");
            }
        }
        let dropped = self.channels.drop_all_remaining();
        self.fail_parked();
        if dropped > 0 {
            warn!(dropped, "discarded undelivered messages at shutdown");
        }
        self.finish_closed();
        info!("relay connection closed");
        Ok(())
    }

    fn finish_closed(&mut self) {
        self.set_state(ConnectionState::Closed);
        if let Some(reply) = self.shutdown_reply.take() {
            let _ = reply.send(());
        }
    }

    fn set_state(&self, state: ConnectionState) {
        let prev = *self.state_tx.borrow();
        if prev != state {
            info!(from = %prev, to = %state, "connection state changed");
            self.state_tx.send_replace(state);
        }
    }

    fn update_depth_gauge(&self) {
        gauge!("lsl_relay_queue_depth").set(self.channels.total_queued() as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use contracts::DecimalTimestamp;
    use std::time::Duration;
    use transport::MockBroker;

    fn fast_config() -> ReliabilityConfig {
        ReliabilityConfig {
            queue_budget: 10,
            ack_timeout_ms: 50,
            max_retries: 2,
            max_connect_failures: 3,
            backoff_initial_ms: 5,
            backoff_max_ms: 20,
            backoff_jitter: 0.0,
            backpressure_window_ms: 60_000,
            shutdown_grace_ms: 200,
        }
    }

    fn spawn_controller(
        broker: MockBroker,
        config: ReliabilityConfig,
    ) -> (
        ReliabilityHandle,
        tokio::task::JoinHandle<Result<(), RelayError>>,
    ) {
        let (controller, handle) = ReliabilityController::new(
            broker,
            BrokerCredentials::default(),
            QosLevel::AtLeastOnce,
            config,
        );
        let join = tokio::spawn(controller.run());
        (handle, join)
    }

    fn msg(stream: &str, seq: u64) -> OutboundMessage {
        OutboundMessage::new(
            stream.into(),
            format!("lsl/{stream}"),
            seq,
            Bytes::from_static(b"{\"v\":1}"),
            DecimalTimestamp::ZERO,
        )
    }

    async fn wait_for<F: FnMut() -> bool>(mut cond: F, what: &str) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while !cond() {
            assert!(Instant::now() < deadline, "timed out waiting for {what}");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn test_publish_and_acknowledge() {
        let broker = MockBroker::new();
        let (handle, join) = spawn_controller(broker.clone(), fast_config());

        let metrics = handle.register_stream("EEG".into(), 0).await.unwrap();
        let outcome = handle.submit(msg("EEG", 1)).await.unwrap();
        assert_eq!(outcome, SubmitOutcome::Queued);

        wait_for(|| metrics.published() == 1, "ack").await;

        let published = broker.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].topic, "lsl/EEG");
        assert_eq!(published[0].qos, QosLevel::AtLeastOnce);

        let snap = handle.snapshot().await.unwrap();
        assert_eq!(snap.connection, ConnectionState::Connected);
        assert_eq!(snap.total_queued, 0);
        assert_eq!(snap.streams[0].last_ack_sequence, Some(1));

        handle.shutdown().await.unwrap();
        join.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_buffers_across_link_loss() {
        let broker = MockBroker::new();
        let mut config = fast_config();
        // The link stays down for a while; the connect budget must not be
        // what ends the test
        config.max_connect_failures = 1000;
        let (handle, join) = spawn_controller(broker.clone(), config);

        let metrics = handle.register_stream("Gaze".into(), 0).await.unwrap();
        wait_for(
            || handle.connection_state() == ConnectionState::Connected,
            "initial connect",
        )
        .await;

        broker.go_down();
        // Messages submitted while the link is down must buffer, not drop
        for seq in 1..=3 {
            assert_eq!(
                handle.submit(msg("Gaze", seq)).await.unwrap(),
                SubmitOutcome::Queued
            );
        }
        broker.go_up();

        wait_for(|| metrics.published() == 3, "drain after reconnect").await;
        assert_eq!(metrics.dropped(), 0);

        // FIFO order survives the reconnect: publishes happen in submit order
        let published = broker.published();
        assert_eq!(published.len(), 3);
        assert!(published.iter().all(|r| r.topic == "lsl/Gaze"));

        handle.shutdown().await.unwrap();
        join.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_connect_failure_budget_is_terminal() {
        let broker = MockBroker::new();
        broker.fail_connects(u32::MAX);
        let (handle, join) = spawn_controller(broker.clone(), fast_config());

        let err = join.await.unwrap().unwrap_err();
        match err {
            RelayError::ConnectExhausted { attempts } => assert_eq!(attempts, 3),
            other => panic!("expected ConnectExhausted, got {other}"),
        }
        assert_eq!(handle.connection_state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_retry_budget_marks_failed() {
        let broker = MockBroker::new();
        broker.withhold_acks(true);
        let (handle, join) = spawn_controller(broker.clone(), fast_config());

        let metrics = handle.register_stream("EEG".into(), 0).await.unwrap();
        handle.submit(msg("EEG", 1)).await.unwrap();

        // 1 initial attempt + 2 retries, then the message is failed
        wait_for(|| metrics.failed() == 1, "retry exhaustion").await;
        assert_eq!(broker.published().len(), 3);
        assert_eq!(metrics.published(), 0);

        handle.shutdown().await.unwrap();
        join.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_reports_dropped_messages() {
        let broker = MockBroker::new();
        broker.withhold_acks(true);
        let mut config = fast_config();
        config.shutdown_grace_ms = 1;
        let (handle, join) = spawn_controller(broker.clone(), config);

        let metrics = handle.register_stream("EEG".into(), 0).await.unwrap();
        for seq in 1..=3 {
            handle.submit(msg("EEG", seq)).await.unwrap();
        }

        handle.shutdown().await.unwrap();
        join.await.unwrap().unwrap();

        assert_eq!(
            metrics.published(),
            0,
            "nothing acknowledged while acks withheld"
        );
        assert_eq!(
            metrics.dropped_on_shutdown() + metrics.failed(),
            3,
            "every queued message accounted for at shutdown"
        );
        assert_eq!(handle.connection_state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_submit_after_close_errors() {
        let broker = MockBroker::new();
        let (handle, join) = spawn_controller(broker, fast_config());

        handle.shutdown().await.unwrap();
        join.await.unwrap().unwrap();

        let err = handle.submit(msg("EEG", 1)).await.unwrap_err();
        assert!(matches!(err, RelayError::ShuttingDown));
    }
}
