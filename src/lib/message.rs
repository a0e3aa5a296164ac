//! Message kinds exchanged between ranks.
//!
//! One tag per logical message kind, a closed enumeration. Payloads are
//! flat arrays of 64-bit words; each data tag has a matching payload-less
//! acknowledgement tag that drives the sender's flow control.

/// The tag space of the distributed protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageTag {
    /// Batch of canonical k-mers headed for their owner rank.
    KmerBatch,
    /// Acknowledgement for one [`MessageTag::KmerBatch`].
    KmerBatchAck,
    /// Batch of (predecessor, successor) k-mer pairs.
    EdgeBatch,
    /// Acknowledgement for one [`MessageTag::EdgeBatch`].
    EdgeBatchAck,
    /// Batch of (coverage, count) histogram buckets for the aggregator.
    CoverageBatch,
    /// Acknowledgement for one [`MessageTag::CoverageBatch`].
    CoverageBatchAck,
    /// A rank reports its current phase finished.
    PhaseDone,
    /// The coordinator starts the next phase everywhere.
    StartPhase,
    /// The coordinator ends the run.
    Kill,
}

impl MessageTag {
    /// The acknowledgement tag paired with a data tag, if any.
    #[must_use]
    pub fn ack(&self) -> Option<MessageTag> {
        match self {
            MessageTag::KmerBatch => Some(MessageTag::KmerBatchAck),
            MessageTag::EdgeBatch => Some(MessageTag::EdgeBatchAck),
            MessageTag::CoverageBatch => Some(MessageTag::CoverageBatchAck),
            _ => None,
        }
    }
}

/// One delivered message.
#[derive(Debug, Clone)]
pub struct Message {
    /// Rank that sent the message.
    pub source: u16,
    /// Message kind.
    pub tag: MessageTag,
    /// Flat word payload; empty for control and acknowledgement tags.
    pub payload: Vec<u64>,
}

/// One message waiting to be handed to the transport at the end of the
/// current scheduler turn.
#[derive(Debug)]
pub struct OutboundMessage {
    /// Destination rank.
    pub destination: u16,
    /// Message kind.
    pub tag: MessageTag,
    /// Flat word payload.
    pub payload: Vec<u64>,
}

/// Messages produced during one scheduler turn, drained by the rank loop.
pub type Outbox = Vec<OutboundMessage>;

/// Queue a payload-less control or acknowledgement message.
pub fn push_control(outbox: &mut Outbox, destination: u16, tag: MessageTag) {
    outbox.push(OutboundMessage { destination, tag, payload: Vec::new() });
}
