//! Per-destination output buffering with backpressure.
//!
//! Every distributed phase routes fixed-width records through this
//! router: records accumulate in one fixed-capacity buffer per
//! destination rank and leave as a single batch message. At most one
//! batch per destination may be in flight; a destination stays blocked
//! until its acknowledgement arrives. Together with the caller's pending
//! counter this bounds outbound memory no matter how fast records are
//! produced.
//!
//! The router never talks to the transport directly: flushes append to
//! the turn's [`Outbox`], which keeps flow control testable without any
//! channel behind it.

use crate::message::{MessageTag, Outbox, OutboundMessage};

/// Per-destination record buffers for one builder instance.
pub struct MessageRouter {
    /// Payload capacity per batch, in words.
    capacity_words: usize,
    buffers: Vec<Vec<u64>>,
    outstanding: Vec<bool>,
}

impl MessageRouter {
    /// Create buffers for `world_size` destinations, each bounded by
    /// `max_message_bytes` of payload.
    #[must_use]
    pub fn new(world_size: u16, max_message_bytes: usize) -> MessageRouter {
        let capacity_words = (max_message_bytes / 8).max(1);
        MessageRouter {
            capacity_words,
            buffers: (0..world_size).map(|_| Vec::new()).collect(),
            outstanding: vec![false; world_size as usize],
        }
    }

    /// Payload capacity per batch, in words.
    #[must_use]
    pub fn capacity_words(&self) -> usize {
        self.capacity_words
    }

    /// Whether one more record of `record_words` words would overflow the
    /// destination's buffer.
    #[must_use]
    pub fn is_full(&self, destination: u16, record_words: usize) -> bool {
        self.buffers[destination as usize].len() + record_words > self.capacity_words
    }

    /// Append one fixed-width record to the destination's buffer. The
    /// caller checks [`MessageRouter::is_full`] (and flushes) first.
    pub fn push_record(&mut self, destination: u16, record: &[u64]) {
        debug_assert!(!self.is_full(destination, record.len()));
        self.buffers[destination as usize].extend_from_slice(record);
    }

    /// Package the destination's buffered records as one batch message.
    ///
    /// Returns true when a batch was emitted: the caller then counts one
    /// more pending message. Returns false when the buffer is empty or a
    /// previous batch to this destination is still unacknowledged.
    pub fn flush(&mut self, destination: u16, tag: MessageTag, outbox: &mut Outbox) -> bool {
        let index = destination as usize;
        if self.buffers[index].is_empty() || self.outstanding[index] {
            return false;
        }
        let payload = std::mem::take(&mut self.buffers[index]);
        outbox.push(OutboundMessage { destination, tag, payload });
        self.outstanding[index] = true;
        true
    }

    /// Flush every non-empty destination buffer, subject to the same
    /// one-in-flight rule. Returns how many batches were emitted, for the
    /// caller to add to its pending counter.
    pub fn flush_all(&mut self, tag: MessageTag, outbox: &mut Outbox) -> u32 {
        let mut sent = 0;
        for destination in 0..self.buffers.len() as u16 {
            if self.flush(destination, tag, outbox) {
                sent += 1;
            }
        }
        sent
    }

    /// Record the acknowledgement of the batch in flight to `source`,
    /// unblocking further flushes to it.
    pub fn acknowledge(&mut self, source: u16) {
        self.outstanding[source as usize] = false;
    }

    /// Whether a batch to this destination is awaiting acknowledgement.
    #[must_use]
    pub fn is_outstanding(&self, destination: u16) -> bool {
        self.outstanding[destination as usize]
    }

    /// Whether every destination buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffers.iter().all(Vec::is_empty)
    }
}
