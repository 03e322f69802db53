//! Outbound message queue.
//!
//! Messages wait here until they are handed to an open transport session.
//! Handoff is not a server acknowledgment: a message that was handed off
//! just before a drop may be sent again by the receiver's view, which is why
//! every message carries a [`ClientMessageId`].
//!
//! # Delivery Rules
//!
//! - FIFO: messages leave in enqueue order
//! - A failed handoff puts the message back at the head and stops the drain
//! - [`OutboundQueue::clear`] discards everything (intentional close)
//!
//! Capacity is not enforced here. [`QueueDepth`] gates admission at
//! `send()` time so callers get backpressure synchronously.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::Value;
use tokio::time::Instant;

use crate::error::Result;
use crate::identifiers::ClientMessageId;
use crate::protocol::OutboundEnvelope;

// ============================================================================
// OutboundMessage
// ============================================================================

/// A caller payload waiting for delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    /// Caller-unique id used for de-dup and ack correlation.
    pub client_message_id: ClientMessageId,
    /// Opaque payload.
    pub payload: Value,
    /// When the message entered the queue.
    pub enqueued_at: Instant,
}

impl OutboundMessage {
    /// Creates a message with a freshly generated id.
    #[inline]
    #[must_use]
    pub fn new(payload: Value) -> Self {
        Self {
            client_message_id: ClientMessageId::generate(),
            payload,
            enqueued_at: Instant::now(),
        }
    }

    /// Encodes the wire envelope.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`](crate::Error::Json) if serialization fails.
    pub fn encode(&self) -> Result<String> {
        OutboundEnvelope::new(self.client_message_id, &self.payload).encode()
    }
}

// ============================================================================
// DrainOutcome
// ============================================================================

/// Result of one [`OutboundQueue::drain`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainOutcome {
    /// Messages handed off and removed.
    pub sent: usize,
    /// `true` if a handoff failed and messages remain.
    pub stalled: bool,
}

// ============================================================================
// OutboundQueue
// ============================================================================

/// FIFO of messages not yet handed to a transport.
#[derive(Debug, Default)]
pub struct OutboundQueue {
    messages: VecDeque<OutboundMessage>,
}

impl OutboundQueue {
    /// Creates an empty queue.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a message at the tail.
    #[inline]
    pub fn enqueue(&mut self, message: OutboundMessage) {
        self.messages.push_back(message);
    }

    /// Returns the head without removing it.
    #[inline]
    #[must_use]
    pub fn peek(&self) -> Option<&OutboundMessage> {
        self.messages.front()
    }

    /// Removes and returns the head.
    #[inline]
    pub fn pop(&mut self) -> Option<OutboundMessage> {
        self.messages.pop_front()
    }

    /// Puts a message back at the head after a failed handoff.
    #[inline]
    pub fn requeue_front(&mut self, message: OutboundMessage) {
        self.messages.push_front(message);
    }

    /// Hands messages to `send` in order until it fails or the queue empties.
    ///
    /// `send` returns `false` when the message was not handed off; that
    /// message goes back to the head and draining stops.
    pub fn drain<F>(&mut self, mut send: F) -> DrainOutcome
    where
        F: FnMut(&OutboundMessage) -> bool,
    {
        let mut outcome = DrainOutcome::default();

        while let Some(message) = self.pop() {
            if send(&message) {
                outcome.sent += 1;
            } else {
                self.requeue_front(message);
                outcome.stalled = true;
                break;
            }
        }

        outcome
    }

    /// Discards every message, returning how many were dropped.
    pub fn clear(&mut self) -> usize {
        let count = self.messages.len();
        self.messages.clear();
        count
    }

    /// Number of waiting messages.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Returns `true` if nothing is waiting.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Iterates waiting messages from head to tail.
    pub fn iter(&self) -> impl Iterator<Item = &OutboundMessage> {
        self.messages.iter()
    }
}

// ============================================================================
// QueueDepth
// ============================================================================

/// Admission gauge shared between supervisor handles and the queue owner.
///
/// Handles reserve a slot before posting a message; the owner releases
/// slots as messages are handed off or discarded.
#[derive(Debug)]
pub struct QueueDepth {
    depth: AtomicUsize,
    capacity: usize,
}

impl QueueDepth {
    /// Creates a gauge admitting at most `capacity` messages.
    #[inline]
    #[must_use]
    pub const fn new(capacity: usize) -> Self {
        Self {
            depth: AtomicUsize::new(0),
            capacity,
        }
    }

    /// Reserves one slot; returns `false` when full.
    pub fn try_reserve(&self) -> bool {
        self.depth
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |depth| {
                (depth < self.capacity).then_some(depth + 1)
            })
            .is_ok()
    }

    /// Releases `count` slots.
    pub fn release(&self, count: usize) {
        if count == 0 {
            return;
        }
        let _ = self
            .depth
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |depth| {
                Some(depth.saturating_sub(count))
            });
    }

    /// Currently reserved slots.
    #[inline]
    #[must_use]
    pub fn current(&self) -> usize {
        self.depth.load(Ordering::Acquire)
    }

    /// Maximum slots.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;
    use serde_json::json;

    fn message(n: u64) -> OutboundMessage {
        OutboundMessage::new(json!({ "n": n }))
    }

    fn numbers(queue: &OutboundQueue) -> Vec<u64> {
        queue
            .iter()
            .map(|m| m.payload["n"].as_u64().unwrap())
            .collect()
    }

    #[test]
    fn test_enqueue_preserves_order() {
        let mut queue = OutboundQueue::new();
        for n in 1..=3 {
            queue.enqueue(message(n));
        }
        assert_eq!(numbers(&queue), vec![1, 2, 3]);
        assert_eq!(queue.peek().unwrap().payload["n"], 1);
    }

    #[test]
    fn test_drain_sends_everything_in_order() {
        let mut queue = OutboundQueue::new();
        for n in 1..=4 {
            queue.enqueue(message(n));
        }

        let mut seen = Vec::new();
        let outcome = queue.drain(|m| {
            seen.push(m.payload["n"].as_u64().unwrap());
            true
        });

        assert_eq!(seen, vec![1, 2, 3, 4]);
        assert_eq!(outcome, DrainOutcome { sent: 4, stalled: false });
        assert!(queue.is_empty());
    }

    #[test]
    fn test_failed_send_requeues_at_head() {
        let mut queue = OutboundQueue::new();
        for n in 1..=3 {
            queue.enqueue(message(n));
        }

        let mut calls = 0;
        let outcome = queue.drain(|_| {
            calls += 1;
            calls < 2
        });

        assert_eq!(outcome, DrainOutcome { sent: 1, stalled: true });
        assert_eq!(numbers(&queue), vec![2, 3]);
    }

    #[test]
    fn test_failed_message_is_retried_next_drain() {
        let mut queue = OutboundQueue::new();
        queue.enqueue(message(7));
        let id = queue.peek().unwrap().client_message_id;

        queue.drain(|_| false);
        assert_eq!(queue.peek().unwrap().client_message_id, id);

        let mut retried = None;
        queue.drain(|m| {
            retried = Some(m.client_message_id);
            true
        });
        assert_eq!(retried, Some(id));
    }

    #[test]
    fn test_clear_returns_count() {
        let mut queue = OutboundQueue::new();
        queue.enqueue(message(1));
        queue.enqueue(message(2));
        assert_eq!(queue.clear(), 2);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_encode_carries_id_and_payload() {
        let msg = message(9);
        let value: serde_json::Value = serde_json::from_str(&msg.encode().unwrap()).unwrap();
        assert_eq!(value["client_message_id"], json!(msg.client_message_id.to_string()));
        assert_eq!(value["payload"], json!({ "n": 9 }));
    }

    #[test]
    fn test_depth_rejects_past_capacity() {
        let depth = QueueDepth::new(2);
        assert!(depth.try_reserve());
        assert!(depth.try_reserve());
        assert!(!depth.try_reserve());

        depth.release(1);
        assert_eq!(depth.current(), 1);
        assert!(depth.try_reserve());
    }

    #[test]
    fn test_depth_release_saturates() {
        let depth = QueueDepth::new(4);
        assert!(depth.try_reserve());
        depth.release(10);
        assert_eq!(depth.current(), 0);
    }

    proptest! {
        /// Whatever fails along the way, the transport sees a prefix-preserving
        /// in-order stream with nothing lost.
        #[test]
        fn prop_drain_never_loses_or_reorders(
            count in 1u64..40,
            failures in proptest::collection::vec(any::<bool>(), 1..80),
        ) {
            let mut queue = OutboundQueue::new();
            for n in 0..count {
                queue.enqueue(message(n));
            }

            let mut delivered = Vec::new();
            let mut script = failures.into_iter().cycle();

            // Bounded number of passes; the final pass always succeeds
            for _ in 0..200 {
                if queue.is_empty() {
                    break;
                }
                queue.drain(|m| {
                    let ok = script.next().unwrap_or(true);
                    if ok {
                        delivered.push(m.payload["n"].as_u64().unwrap());
                    }
                    ok
                });
            }
            queue.drain(|m| {
                delivered.push(m.payload["n"].as_u64().unwrap());
                true
            });

            prop_assert_eq!(delivered, (0..count).collect::<Vec<_>>());
        }
    }
}
