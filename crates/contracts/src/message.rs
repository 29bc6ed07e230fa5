//! OutboundMessage - the unit handed to the broker.

use std::time::Instant;

use bytes::Bytes;

use crate::{DecimalTimestamp, StreamId};

/// Delivery lifecycle of an outbound message.
///
/// Owned exclusively by the reliability controller from enqueue until a
/// terminal state is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    /// Queued, not yet attempted (or returned for retry)
    Pending,
    /// Publish attempted, acknowledgment outstanding
    InFlight,
    /// Broker (or local send, depending on guarantee level) confirmed
    Acknowledged,
    /// Retry budget exhausted
    Failed,
    /// Evicted by queue policy or discarded at shutdown
    Dropped,
}

impl DeliveryState {
    /// Terminal states never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Acknowledged | Self::Failed | Self::Dropped)
    }
}

/// A formatted sample waiting for (or undergoing) delivery.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    /// Originating stream
    pub stream_id: StreamId,

    /// Fully resolved broker topic
    pub topic: String,

    /// Per-stream sequence number, carried for ordering checks and ack
    /// bookkeeping
    pub sequence_number: u64,

    /// Serialized wire payload
    pub payload: Bytes,

    /// Reference-clock time stamped at formatting, used for end-to-end
    /// latency once the acknowledgment arrives
    pub relay_send_time: DecimalTimestamp,

    /// Local enqueue instant (monotonic), used for queue-age diagnostics
    pub enqueued_at: Instant,

    /// Current delivery state
    pub state: DeliveryState,

    /// Publish attempts that timed out so far
    pub retry_count: u32,
}

impl OutboundMessage {
    pub fn new(
        stream_id: StreamId,
        topic: String,
        sequence_number: u64,
        payload: Bytes,
        relay_send_time: DecimalTimestamp,
    ) -> Self {
        Self {
            stream_id,
            topic,
            sequence_number,
            payload,
            relay_send_time,
            enqueued_at: Instant::now(),
            state: DeliveryState::Pending,
            retry_count: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!DeliveryState::Pending.is_terminal());
        assert!(!DeliveryState::InFlight.is_terminal());
        assert!(DeliveryState::Acknowledged.is_terminal());
        assert!(DeliveryState::Failed.is_terminal());
        assert!(DeliveryState::Dropped.is_terminal());
    }

    #[test]
    fn test_new_message_starts_pending() {
        let msg = OutboundMessage::new(
            "EEG_1".into(),
            "lsl/EEG_1".to_string(),
            7,
            Bytes::from_static(b"{}"),
            DecimalTimestamp::from_parts(1, 0),
        );
        assert_eq!(msg.state, DeliveryState::Pending);
        assert_eq!(msg.retry_count, 0);
    }
}
