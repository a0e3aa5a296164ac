//! The k-mer counting phase.
//!
//! Each rank slides a window of the configured width across its local
//! reads, canonicalizes every window, and routes the packed words to the
//! owner rank (`hash(canonical) mod world_size`). Arrivals from peers are
//! inserted into the local academy and acknowledged; acknowledgements
//! drive the sender's pending counter. A rank is finished only when its
//! input is exhausted, its buffers are flushed, and its pending counter
//! has drained back to zero; only then does it report to the coordinator,
//! and it keeps serving arrivals until the whole phase ends.

use crate::message::{push_control, Message, MessageTag};
use crate::progress::ProgressTracker;
use crate::rank::{protocol_violation, report_phase_done, Phase, PhaseHandler, RankContext};
use braid_kmer::{Kmer, Strand, KMER_WORDS};
use log::info;

/// Windows consumed per scheduler turn before yielding.
const WINDOWS_PER_TICK: usize = 4096;

/// Reads between progress lines.
const READS_PER_PROGRESS: u64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BuildState {
    Idle,
    Streaming,
    Draining,
    Done,
}

/// Phase handler that counts k-mers into the distributed academy.
pub struct AcademyBuilder {
    phase: Phase,
    state: BuildState,
    read_index: usize,
    position: usize,
    pending: u32,
    progress: ProgressTracker,
}

impl AcademyBuilder {
    /// Create the builder for one rank.
    #[must_use]
    pub fn new(phase: Phase, rank: u16) -> AcademyBuilder {
        AcademyBuilder {
            phase,
            state: BuildState::Idle,
            read_index: 0,
            position: 0,
            pending: 0,
            progress: ProgressTracker::new(format!("Rank {rank}: counting k-mers in reads"))
                .with_interval(READS_PER_PROGRESS),
        }
    }

    /// Messages sent but not yet acknowledged.
    #[must_use]
    pub fn pending_messages(&self) -> u32 {
        self.pending
    }

    fn stream(&mut self, ctx: &mut RankContext<'_>) {
        let word_size = ctx.params.word_size;
        let world_size = ctx.params.world_size;
        let mut budget = WINDOWS_PER_TICK;
        while budget > 0 {
            let Some(read) = ctx.reads.get(self.read_index) else {
                self.state = BuildState::Draining;
                return;
            };
            if read.len() < word_size {
                self.next_read();
                continue;
            }
            match Kmer::from_sequence(read.sequence(), self.position, word_size, Strand::Forward)
            {
                Ok(kmer) => {
                    let canonical = kmer.canonical(word_size);
                    let owner = (canonical.hash_primary() % u64::from(world_size)) as u16;
                    if ctx.router.is_full(owner, KMER_WORDS) {
                        if ctx.router.flush(owner, MessageTag::KmerBatch, ctx.outbox) {
                            self.pending += 1;
                        } else {
                            // Owner still unacknowledged: yield, keep the
                            // cursor so this window is retried next turn.
                            return;
                        }
                    }
                    let mut record = Vec::with_capacity(KMER_WORDS);
                    canonical.pack_into(&mut record);
                    ctx.router.push_record(owner, &record);
                    ctx.report.kmers_observed += 1;
                }
                Err(_) => {
                    // Malformed window: excluded from hashing and storage.
                    ctx.report.invalid_windows += 1;
                }
            }
            self.advance(read.len(), word_size);
            budget -= 1;
        }
    }

    fn advance(&mut self, read_length: usize, word_size: usize) {
        self.position += 1;
        if self.position + word_size > read_length {
            self.next_read();
        }
    }

    fn next_read(&mut self) {
        self.read_index += 1;
        self.position = 0;
        self.progress.log_if_needed(1);
    }

    fn drain(&mut self, ctx: &mut RankContext<'_>) {
        self.pending += ctx.router.flush_all(MessageTag::KmerBatch, ctx.outbox);
        if self.pending == 0 && ctx.router.is_empty() {
            report_phase_done(ctx.outbox, self.phase);
            self.state = BuildState::Done;
            self.progress.log_final();
            info!(
                "Rank {}: k-mer counting finished, {} windows routed",
                ctx.params.rank, ctx.report.kmers_observed
            );
        }
    }
}

impl PhaseHandler for AcademyBuilder {
    fn on_message(&mut self, ctx: &mut RankContext<'_>, message: &Message) {
        match message.tag {
            MessageTag::KmerBatch => {
                for chunk in message.payload.chunks_exact(KMER_WORDS) {
                    let kmer = Kmer::unpack_from(chunk);
                    ctx.store.academy_mut().record_observation(&kmer);
                }
                // The acknowledgement, not any content, unblocks the peer.
                push_control(ctx.outbox, message.source, MessageTag::KmerBatchAck);
            }
            MessageTag::KmerBatchAck => {
                if self.pending == 0 {
                    protocol_violation(ctx.params.rank, message, "k-mer counting");
                    return;
                }
                self.pending -= 1;
                ctx.router.acknowledge(message.source);
            }
            _ => protocol_violation(ctx.params.rank, message, "k-mer counting"),
        }
    }

    fn tick(&mut self, ctx: &mut RankContext<'_>) -> crate::errors::Result<()> {
        if self.state == BuildState::Idle {
            self.state = BuildState::Streaming;
            info!(
                "Rank {}: counting k-mers in {} reads",
                ctx.params.rank,
                ctx.reads.len()
            );
        }
        // Re-entering with sends in flight is a no-op: the cooperative
        // substitute for blocking on the acknowledgements.
        if self.pending != 0 {
            return Ok(());
        }
        match self.state {
            BuildState::Streaming => self.stream(ctx),
            BuildState::Draining => self.drain(ctx),
            BuildState::Idle | BuildState::Done => {}
        }
        Ok(())
    }
}
