//! The edge distribution phase.
//!
//! After promotion every rank walks its reads once more, this time
//! shipping each adjacent window pair `(predecessor, successor)` to the
//! owner ranks of both endpoints. The receiver records the edge on
//! whichever endpoint it owns, provided that vertex survived promotion;
//! edges to candidates that never made the graph are dropped silently.
//! Flow control and termination follow the same router discipline as the
//! counting phase.

use crate::message::{push_control, Message, MessageTag};
use crate::progress::ProgressTracker;
use crate::rank::{protocol_violation, report_phase_done, Phase, PhaseHandler, RankContext};
use braid_kmer::{Kmer, Strand, KMER_WORDS};
use log::info;

/// Words in one edge record: the two oriented endpoint k-mers.
pub const EDGE_RECORD_WORDS: usize = 2 * KMER_WORDS;

/// Window pairs consumed per scheduler turn before yielding.
const PAIRS_PER_TICK: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkState {
    Idle,
    Streaming,
    Draining,
    Done,
}

/// Phase handler that distributes de Bruijn edges to vertex owners.
pub struct EdgeLinker {
    phase: Phase,
    state: LinkState,
    read_index: usize,
    position: usize,
    pending: u32,
    progress: ProgressTracker,
}

impl EdgeLinker {
    /// Create the linker for one rank.
    #[must_use]
    pub fn new(phase: Phase, rank: u16) -> EdgeLinker {
        EdgeLinker {
            phase,
            state: LinkState::Idle,
            read_index: 0,
            position: 0,
            pending: 0,
            progress: ProgressTracker::new(format!("Rank {rank}: linking edges in reads"))
                .with_interval(10_000),
        }
    }

    fn stream(&mut self, ctx: &mut RankContext<'_>) {
        let word_size = ctx.params.word_size;
        let world_size = ctx.params.world_size;
        let mut budget = PAIRS_PER_TICK;
        while budget > 0 {
            let Some(read) = ctx.reads.get(self.read_index) else {
                self.state = LinkState::Draining;
                return;
            };
            // An edge needs two adjacent full windows.
            if read.len() < word_size + 1 {
                self.next_read();
                continue;
            }
            let text = read.sequence();
            let pair = Kmer::from_sequence(text, self.position, word_size, Strand::Forward)
                .and_then(|a| {
                    Kmer::from_sequence(text, self.position + 1, word_size, Strand::Forward)
                        .map(|b| (a, b))
                });
            if let Ok((predecessor, successor)) = pair {
                let first = predecessor.owner_rank(word_size, world_size);
                let second = successor.owner_rank(word_size, world_size);
                // Both destinations must have room before either push, so
                // a blocked turn never half-emits the record.
                for destination in [Some(first), (second != first).then_some(second)]
                    .into_iter()
                    .flatten()
                {
                    if ctx.router.is_full(destination, EDGE_RECORD_WORDS) {
                        if ctx.router.flush(destination, MessageTag::EdgeBatch, ctx.outbox) {
                            self.pending += 1;
                        } else {
                            return;
                        }
                    }
                }
                let mut record = Vec::with_capacity(EDGE_RECORD_WORDS);
                predecessor.pack_into(&mut record);
                successor.pack_into(&mut record);
                ctx.router.push_record(first, &record);
                if second != first {
                    ctx.router.push_record(second, &record);
                }
                ctx.report.edges_emitted += 1;
            }
            self.advance(read.len(), word_size);
            budget -= 1;
        }
    }

    fn advance(&mut self, read_length: usize, word_size: usize) {
        self.position += 1;
        // The pair needs one symbol past the second window.
        if self.position + word_size + 1 > read_length {
            self.next_read();
        }
    }

    fn next_read(&mut self) {
        self.read_index += 1;
        self.position = 0;
        self.progress.log_if_needed(1);
    }

    fn drain(&mut self, ctx: &mut RankContext<'_>) {
        self.pending += ctx.router.flush_all(MessageTag::EdgeBatch, ctx.outbox);
        if self.pending == 0 && ctx.router.is_empty() {
            report_phase_done(ctx.outbox, self.phase);
            self.state = LinkState::Done;
            self.progress.log_final();
            info!(
                "Rank {}: edge linking finished, {} pairs routed",
                ctx.params.rank, ctx.report.edges_emitted
            );
        }
    }
}

impl PhaseHandler for EdgeLinker {
    fn on_message(&mut self, ctx: &mut RankContext<'_>, message: &Message) {
        match message.tag {
            MessageTag::EdgeBatch => {
                let word_size = ctx.params.word_size;
                let world_size = ctx.params.world_size;
                let rank = ctx.params.rank;
                for chunk in message.payload.chunks_exact(EDGE_RECORD_WORDS) {
                    let predecessor = Kmer::unpack_from(&chunk[..KMER_WORDS]);
                    let successor = Kmer::unpack_from(&chunk[KMER_WORDS..]);
                    if successor.owner_rank(word_size, world_size) == rank {
                        ctx.store.add_ingoing_edge(&successor, &predecessor);
                    }
                    if predecessor.owner_rank(word_size, world_size) == rank {
                        ctx.store.add_outgoing_edge(&predecessor, &successor);
                    }
                }
                push_control(ctx.outbox, message.source, MessageTag::EdgeBatchAck);
            }
            MessageTag::EdgeBatchAck => {
                if self.pending == 0 {
                    protocol_violation(ctx.params.rank, message, "edge linking");
                    return;
                }
                self.pending -= 1;
                ctx.router.acknowledge(message.source);
            }
            _ => protocol_violation(ctx.params.rank, message, "edge linking"),
        }
    }

    fn tick(&mut self, ctx: &mut RankContext<'_>) -> crate::errors::Result<()> {
        if self.state == LinkState::Idle {
            self.state = LinkState::Streaming;
            info!("Rank {}: linking edges in {} reads", ctx.params.rank, ctx.reads.len());
        }
        if self.pending != 0 {
            return Ok(());
        }
        match self.state {
            LinkState::Streaming => self.stream(ctx),
            LinkState::Draining => self.drain(ctx),
            LinkState::Idle | LinkState::Done => {}
        }
        Ok(())
    }
}
