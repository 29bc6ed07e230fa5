//! StreamChannel and the shared bounded queue set.
//!
//! All queues share one slot budget. Eviction under pressure is
//! priority-aware: the numerically worst-priority stream loses its oldest
//! pending message first, and higher-priority data is never displaced by a
//! lower-priority enqueue.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use contracts::{DecimalTimestamp, DeliveryState, OutboundMessage, StreamId};

use crate::metrics::StreamMetrics;

/// Per-stream queue state, owned by the controller.
#[derive(Debug)]
pub(crate) struct StreamChannel {
    pub priority: u8,
    pub queue: VecDeque<OutboundMessage>,
    pub last_ack_sequence: Option<u64>,
    pub metrics: Arc<StreamMetrics>,
    /// When an enqueue first found the budget exhausted; cleared once space
    /// exists again. Drives the sustained-full backpressure window.
    pub full_since: Option<Instant>,
    /// Source signalled end-of-stream; channel is removed once drained
    pub closing: bool,
}

/// What the writer needs to publish one message; payload bytes are shared,
/// not copied.
#[derive(Debug, Clone)]
pub(crate) struct PublishItem {
    pub stream_id: StreamId,
    pub topic: String,
    pub sequence_number: u64,
    pub payload: Bytes,
    pub relay_send_time: DecimalTimestamp,
}

/// Result of an enqueue attempt.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum EnqueueOutcome {
    /// Accepted within budget
    Queued,
    /// Accepted after evicting the oldest pending message of `victim`
    QueuedEvicting { victim: StreamId, sequence: u64 },
    /// The incoming message itself was the lowest-priority data; dropped
    Rejected,
    /// Budget sustained-full beyond the window; caller must pause upstream
    Backpressure,
    /// Stream unknown or already closing
    NotRegistered,
}

/// Result of a retry decision after a delivery timeout.
#[derive(Debug)]
pub(crate) enum RetryOutcome {
    /// Returned to Pending at the queue front, FIFO preserved
    Retrying { attempt: u32 },
    /// Retry budget exhausted; message removed
    Failed(OutboundMessage),
}

/// The set of all stream channels plus the shared budget accounting.
#[derive(Debug)]
pub(crate) struct ChannelSet {
    channels: HashMap<StreamId, StreamChannel>,
    /// Registration order, the round-robin scan domain
    order: Vec<StreamId>,
    total_queued: usize,
    budget: usize,
    rr_cursor: usize,
}

impl ChannelSet {
    pub fn new(budget: usize) -> Self {
        Self {
            channels: HashMap::new(),
            order: Vec::new(),
            total_queued: 0,
            budget,
            rr_cursor: 0,
        }
    }

    pub fn total_queued(&self) -> usize {
        self.total_queued
    }

    pub fn is_empty(&self) -> bool {
        self.total_queued == 0
    }

    pub fn stream_count(&self) -> usize {
        self.channels.len()
    }

    /// Register a stream channel. Idempotent for an already known id.
    pub fn register(&mut self, stream_id: StreamId, priority: u8, metrics: Arc<StreamMetrics>) {
        if self.channels.contains_key(&stream_id) {
            return;
        }
        self.order.push(stream_id.clone());
        self.channels.insert(
            stream_id,
            StreamChannel {
                priority,
                queue: VecDeque::new(),
                last_ack_sequence: None,
                metrics,
                full_since: None,
                closing: false,
            },
        );
    }

    /// Mark a stream closing; it is torn down once its queue drains.
    pub fn close_stream(&mut self, stream_id: &StreamId) {
        let drained = match self.channels.get_mut(stream_id) {
            Some(ch) => {
                ch.closing = true;
                ch.queue.is_empty()
            }
            None => false,
        };
        if drained {
            self.remove_stream(stream_id);
        }
    }

    fn remove_stream(&mut self, stream_id: &StreamId) {
        self.channels.remove(stream_id);
        self.order.retain(|id| id != stream_id);
        self.rr_cursor = 0;
    }

    fn remove_if_drained(&mut self, stream_id: &StreamId) {
        let drained = self
            .channels
            .get(stream_id)
            .is_some_and(|ch| ch.closing && ch.queue.is_empty());
        if drained {
            self.remove_stream(stream_id);
        }
    }

    /// Try to append a message, applying the eviction / backpressure policy
    /// when the shared budget is exhausted.
    pub fn enqueue(&mut self, msg: OutboundMessage, window: Duration) -> EnqueueOutcome {
        let now = Instant::now();

        let incoming_priority = match self.channels.get(&msg.stream_id) {
            Some(ch) if !ch.closing => ch.priority,
            _ => return EnqueueOutcome::NotRegistered,
        };

        if self.total_queued < self.budget {
            let ch = self
                .channels
                .get_mut(&msg.stream_id)
                .expect("channel checked above");
            ch.full_since = None;
            ch.queue.push_back(msg);
            self.total_queued += 1;
            ch.metrics.set_queue_depth(ch.queue.len());
            return EnqueueOutcome::Queued;
        }

        // Budget exhausted: engage backpressure once fullness is sustained
        {
            let ch = self
                .channels
                .get_mut(&msg.stream_id)
                .expect("channel checked above");
            let since = *ch.full_since.get_or_insert(now);
            if now.duration_since(since) >= window {
                return EnqueueOutcome::Backpressure;
            }
        }

        match self.eviction_victim(&msg.stream_id, incoming_priority) {
            Some(victim) => {
                let evicted = self
                    .evict_oldest_pending(&victim)
                    .expect("victim has an evictable message");
                let ch = self
                    .channels
                    .get_mut(&msg.stream_id)
                    .expect("channel checked above");
                ch.queue.push_back(msg);
                self.total_queued += 1;
                ch.metrics.set_queue_depth(ch.queue.len());
                EnqueueOutcome::QueuedEvicting {
                    victim,
                    sequence: evicted.sequence_number,
                }
            }
            None => {
                // Only strictly higher-priority data is queued; the incoming
                // message is the one that gets dropped
                let ch = self
                    .channels
                    .get_mut(&msg.stream_id)
                    .expect("channel checked above");
                ch.metrics.inc_dropped();
                EnqueueOutcome::Rejected
            }
        }
    }

    /// Pick the stream whose oldest pending message should be evicted:
    /// numerically worst priority wins, the enqueuing stream itself on ties.
    /// Returns `None` when every queued message outranks the incoming one.
    fn eviction_victim(&self, incoming: &StreamId, incoming_priority: u8) -> Option<StreamId> {
        let mut worst: Option<(StreamId, u8)> = None;

        for id in &self.order {
            let Some(ch) = self.channels.get(id) else {
                continue;
            };
            if !ch.queue.iter().any(|m| m.state == DeliveryState::Pending) {
                continue;
            }
            let replace = match &worst {
                None => true,
                Some((_, p)) if ch.priority > *p => true,
                Some((wid, p)) => ch.priority == *p && id == incoming && wid != incoming,
            };
            if replace {
                worst = Some((id.clone(), ch.priority));
            }
        }

        let (victim, priority) = worst?;
        if priority < incoming_priority {
            None
        } else {
            Some(victim)
        }
    }

    /// Remove the oldest pending (never in-flight) message of a stream and
    /// mark it dropped.
    fn evict_oldest_pending(&mut self, stream_id: &StreamId) -> Option<OutboundMessage> {
        let ch = self.channels.get_mut(stream_id)?;
        let idx = ch
            .queue
            .iter()
            .position(|m| m.state == DeliveryState::Pending)?;
        let mut msg = ch.queue.remove(idx)?;
        msg.state = DeliveryState::Dropped;
        self.total_queued -= 1;
        ch.metrics.inc_dropped();
        ch.metrics.set_queue_depth(ch.queue.len());
        self.remove_if_drained(stream_id);
        Some(msg)
    }

    /// Select the next message to publish: lowest priority value first,
    /// round-robin among equal priorities so no stream starves. Marks the
    /// chosen front message in-flight.
    pub fn next_ready(&mut self) -> Option<PublishItem> {
        let best_priority = self
            .order
            .iter()
            .filter_map(|id| self.channels.get(id))
            .filter(|ch| {
                ch.queue
                    .front()
                    .is_some_and(|m| m.state == DeliveryState::Pending)
            })
            .map(|ch| ch.priority)
            .min()?;

        let n = self.order.len();
        let start = (self.rr_cursor + 1) % n;
        for i in 0..n {
            let idx = (start + i) % n;
            let id = self.order[idx].clone();
            let Some(ch) = self.channels.get_mut(&id) else {
                continue;
            };
            if ch.priority != best_priority {
                continue;
            }
            let Some(front) = ch.queue.front_mut() else {
                continue;
            };
            if front.state != DeliveryState::Pending {
                continue;
            }
            front.state = DeliveryState::InFlight;
            self.rr_cursor = idx;
            return Some(PublishItem {
                stream_id: id,
                topic: front.topic.clone(),
                sequence_number: front.sequence_number,
                payload: front.payload.clone(),
                relay_send_time: front.relay_send_time,
            });
        }
        None
    }

    /// Acknowledge the in-flight front message of a stream.
    pub fn complete_front(&mut self, stream_id: &StreamId) -> Option<OutboundMessage> {
        let ch = self.channels.get_mut(stream_id)?;
        debug_assert!(ch
            .queue
            .front()
            .is_some_and(|m| m.state == DeliveryState::InFlight));
        let mut msg = ch.queue.pop_front()?;
        msg.state = DeliveryState::Acknowledged;
        ch.last_ack_sequence = Some(msg.sequence_number);
        self.total_queued -= 1;
        ch.metrics.inc_published();
        ch.metrics.set_queue_depth(ch.queue.len());
        self.remove_if_drained(stream_id);
        Some(msg)
    }

    /// Delivery timed out: retry in place or fail the message once the
    /// budget is exhausted. FIFO order is preserved either way.
    pub fn retry_front(&mut self, stream_id: &StreamId, max_retries: u32) -> Option<RetryOutcome> {
        let ch = self.channels.get_mut(stream_id)?;
        let front = ch.queue.front_mut()?;
        debug_assert_eq!(front.state, DeliveryState::InFlight);

        front.retry_count += 1;
        if front.retry_count > max_retries {
            let mut msg = ch.queue.pop_front()?;
            msg.state = DeliveryState::Failed;
            self.total_queued -= 1;
            ch.metrics.inc_failed();
            ch.metrics.set_queue_depth(ch.queue.len());
            self.remove_if_drained(stream_id);
            Some(RetryOutcome::Failed(msg))
        } else {
            front.state = DeliveryState::Pending;
            Some(RetryOutcome::Retrying {
                attempt: front.retry_count,
            })
        }
    }

    /// Link was lost mid-publish: the attempt does not count against the
    /// retry budget, the message simply becomes pending again.
    pub fn release_front(&mut self, stream_id: &StreamId) {
        if let Some(front) = self
            .channels
            .get_mut(stream_id)
            .and_then(|ch| ch.queue.front_mut())
        {
            if front.state == DeliveryState::InFlight {
                front.state = DeliveryState::Pending;
            }
        }
    }

    /// Shutdown grace expired: everything still queued is reported as
    /// dropped-on-shutdown. Returns the number of discarded messages.
    pub fn drop_all_remaining(&mut self) -> usize {
        let mut dropped = 0;
        for id in self.order.clone() {
            let Some(ch) = self.channels.get_mut(&id) else {
                continue;
            };
            while let Some(mut msg) = ch.queue.pop_front() {
                msg.state = DeliveryState::Dropped;
                ch.metrics.inc_dropped_on_shutdown();
                dropped += 1;
            }
            ch.metrics.set_queue_depth(0);
        }
        self.total_queued = 0;
        dropped
    }

    pub fn has_space(&self) -> bool {
        self.total_queued < self.budget
    }

    pub fn metrics_of(&self, stream_id: &StreamId) -> Option<Arc<StreamMetrics>> {
        self.channels.get(stream_id).map(|ch| Arc::clone(&ch.metrics))
    }

    /// Visit channels for snapshots.
    pub fn for_each<F: FnMut(&StreamId, &StreamChannel)>(&self, mut f: F) {
        for id in &self.order {
            if let Some(ch) = self.channels.get(id) {
                f(id, ch);
            }
        }
    }
}
