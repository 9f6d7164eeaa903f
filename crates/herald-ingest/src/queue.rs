//! Bounded ingest queue with drop-oldest overflow.
//!
//! Relay connections push raw messages here from any thread; the dispatcher
//! drains it in small batches. The lock is held only while splicing the
//! buffer, never while a message is processed.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Default maximum number of queued messages.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// A raw relay message waiting for dispatch.
#[derive(Debug, Clone)]
pub struct QueuedMessage {
    /// Raw message text as received from the relay.
    pub raw: String,
    /// Subscription the connection delivered this message for.
    pub subscription_id: String,
    /// Relay the message came from.
    pub relay_url: String,
    /// When the message was queued.
    pub enqueued_at: Instant,
}

impl QueuedMessage {
    /// Wrap a raw message, stamping it with the current time.
    pub fn new(
        raw: impl Into<String>,
        subscription_id: impl Into<String>,
        relay_url: impl Into<String>,
    ) -> Self {
        Self {
            raw: raw.into(),
            subscription_id: subscription_id.into(),
            relay_url: relay_url.into(),
            enqueued_at: Instant::now(),
        }
    }
}

/// Multi-producer, single-consumer bounded FIFO.
pub struct IngestQueue {
    buffer: Mutex<VecDeque<QueuedMessage>>,
    capacity: usize,
    dropped: AtomicU64,
}

impl IngestQueue {
    /// Create a queue. A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            dropped: AtomicU64::new(0),
        }
    }

    /// Append a message. Never blocks beyond the splice and never fails.
    ///
    /// When the queue is full the oldest message is removed to make room and
    /// returned so the caller can report it.
    pub fn push(&self, message: QueuedMessage) -> Option<QueuedMessage> {
        let evicted = {
            let mut buffer = self.buffer.lock();
            let evicted = if buffer.len() >= self.capacity {
                buffer.pop_front()
            } else {
                None
            };
            buffer.push_back(message);
            evicted
        };

        if evicted.is_some() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        evicted
    }

    /// Remove up to `max` messages from the head of the queue.
    pub fn drain_batch(&self, max: usize) -> Vec<QueuedMessage> {
        let mut buffer = self.buffer.lock();
        let take = buffer.len().min(max);
        buffer.drain(..take).collect()
    }

    /// Messages currently queued.
    pub fn len(&self) -> usize {
        self.buffer.lock().len()
    }

    /// True if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.buffer.lock().is_empty()
    }

    /// Maximum number of queued messages.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Messages discarded by overflow since creation.
    pub fn dropped_total(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Default for IngestQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}
