//! The coverage gathering phase.
//!
//! Walks every record the rank retained (academy candidates before the
//! graph exists, vertices after) into a local `coverage -> count`
//! histogram, then ships the buckets to the aggregator rank as
//! fixed-size batches of `(coverage, count)` word pairs under the usual
//! one-in-flight router discipline. Optionally writes this rank's share
//! of the diagnostic k-mer listing while it walks the graph.

use crate::errors::Result;
use crate::graph::GraphStore;
use crate::message::{push_control, Message, MessageTag};
use crate::rank::{protocol_violation, report_phase_done, Phase, PhaseHandler, RankContext};
use itertools::Itertools;
use log::info;
use std::collections::BTreeMap;
use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Rank that aggregates the global histogram.
pub const AGGREGATOR_RANK: u16 = 0;

/// Words per histogram record: `(coverage, count)`.
const BUCKET_WORDS: usize = 2;

/// Which population the gatherer walks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverageSource {
    /// Candidate counts, before the graph exists.
    Academy,
    /// Vertex coverage, after promotion.
    Graph,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GatherState {
    Collecting,
    Shipping,
    Draining,
    Done,
}

/// Phase handler that aggregates the coverage histogram on one rank.
pub struct CoverageGatherer {
    phase: Phase,
    source: CoverageSource,
    state: GatherState,
    pending: u32,
    buckets: VecDeque<(u64, u64)>,
    listing_path: Option<PathBuf>,
}

impl CoverageGatherer {
    /// Create the gatherer for one rank. `listing_path`, when set, is
    /// where this rank writes its share of the k-mer listing.
    #[must_use]
    pub fn new(phase: Phase, source: CoverageSource, listing_path: Option<PathBuf>) -> Self {
        CoverageGatherer {
            phase,
            source,
            state: GatherState::Collecting,
            pending: 0,
            buckets: VecDeque::new(),
            listing_path,
        }
    }

    fn collect(&mut self, ctx: &mut RankContext<'_>) -> Result<()> {
        // Finish any half-done rehash before walking the tables.
        while !ctx.store.complete_resizing() {}
        let mut histogram: BTreeMap<u64, u64> = BTreeMap::new();
        match self.source {
            CoverageSource::Academy => {
                for (_, candidate) in ctx.store.academy().iter() {
                    *histogram.entry(u64::from(candidate.count)).or_insert(0) += 1;
                }
                ctx.report.academy_size = ctx.store.academy().size();
            }
            CoverageSource::Graph => {
                for (_, vertex) in ctx.store.iter() {
                    *histogram.entry(u64::from(vertex.coverage)).or_insert(0) += 1;
                }
                ctx.report.graph_size = ctx.store.size();
            }
        }
        if let Some(path) = &self.listing_path {
            debug_assert_eq!(self.source, CoverageSource::Graph);
            let written = write_rank_listing(ctx.store, ctx.params.word_size, path)?;
            info!(
                "Rank {}: wrote {written} k-mers to {}",
                ctx.params.rank,
                path.display()
            );
            ctx.report.kmer_listing = Some(path.clone());
        }
        info!(
            "Rank {}: gathered {} coverage buckets",
            ctx.params.rank,
            histogram.len()
        );
        self.buckets = histogram.into_iter().collect();
        self.state = GatherState::Shipping;
        Ok(())
    }

    fn ship(&mut self, ctx: &mut RankContext<'_>) {
        while let Some(&(coverage, count)) = self.buckets.front() {
            if ctx.router.is_full(AGGREGATOR_RANK, BUCKET_WORDS) {
                if ctx.router.flush(AGGREGATOR_RANK, MessageTag::CoverageBatch, ctx.outbox) {
                    self.pending += 1;
                } else {
                    return;
                }
            }
            ctx.router.push_record(AGGREGATOR_RANK, &[coverage, count]);
            self.buckets.pop_front();
        }
        self.state = GatherState::Draining;
    }

    fn drain(&mut self, ctx: &mut RankContext<'_>) {
        self.pending += ctx.router.flush_all(MessageTag::CoverageBatch, ctx.outbox);
        if self.pending == 0 && ctx.router.is_empty() {
            report_phase_done(ctx.outbox, self.phase);
            self.state = GatherState::Done;
        }
    }
}

impl PhaseHandler for CoverageGatherer {
    fn on_message(&mut self, ctx: &mut RankContext<'_>, message: &Message) {
        match message.tag {
            MessageTag::CoverageBatch => {
                if ctx.params.rank != AGGREGATOR_RANK {
                    protocol_violation(ctx.params.rank, message, "coverage gathering");
                    return;
                }
                let distribution = match self.source {
                    CoverageSource::Academy => &mut ctx.report.academy_distribution,
                    CoverageSource::Graph => &mut ctx.report.graph_distribution,
                };
                for chunk in message.payload.chunks_exact(BUCKET_WORDS) {
                    *distribution.entry(chunk[0]).or_insert(0) += chunk[1];
                }
                push_control(ctx.outbox, message.source, MessageTag::CoverageBatchAck);
            }
            MessageTag::CoverageBatchAck => {
                if self.pending == 0 {
                    protocol_violation(ctx.params.rank, message, "coverage gathering");
                    return;
                }
                self.pending -= 1;
                ctx.router.acknowledge(message.source);
            }
            _ => protocol_violation(ctx.params.rank, message, "coverage gathering"),
        }
    }

    fn tick(&mut self, ctx: &mut RankContext<'_>) -> Result<()> {
        if self.pending != 0 {
            return Ok(());
        }
        match self.state {
            GatherState::Collecting => self.collect(ctx)?,
            GatherState::Shipping => self.ship(ctx),
            GatherState::Draining => self.drain(ctx),
            GatherState::Done => {}
        }
        Ok(())
    }
}

/// Write one rank's share of the k-mer listing.
///
/// One line per retained vertex:
/// `<sequence>;<coverage>;<first symbols of ingoing neighbors>;<last
/// symbols of outgoing neighbors>`, neighbor symbols space-separated.
/// Vertices with a coverage of 1 are excluded from the listing by policy,
/// not from the graph.
pub fn write_rank_listing(store: &GraphStore, word_size: usize, path: &Path) -> Result<u64> {
    let mut writer = BufWriter::new(File::create(path)?);
    let mut written = 0u64;
    for (key, vertex) in store.iter() {
        if vertex.coverage <= 1 {
            continue;
        }
        let parents = store
            .ingoing_edges(key)
            .iter()
            .map(|parent| parent.render(word_size).chars().next().unwrap_or('N'))
            .join(" ");
        let children = store
            .outgoing_edges(key)
            .iter()
            .map(|child| child.render(word_size).chars().last().unwrap_or('N'))
            .join(" ");
        writeln!(
            writer,
            "{};{};{};{}",
            key.render(word_size),
            vertex.coverage,
            parents,
            children
        )?;
        written += 1;
    }
    writer.flush()?;
    Ok(written)
}

/// Concatenate per-rank listings into the final file, preceded by header
/// comments documenting the k-mer length and alphabet. The per-rank
/// files are removed afterwards.
pub fn combine_rank_listings(
    output: &Path,
    word_size: usize,
    color_space: bool,
    rank_listings: &[PathBuf],
) -> Result<()> {
    let mut writer = BufWriter::new(File::create(output)?);
    writeln!(writer, "# The length of k-mers is {word_size}")?;
    if color_space {
        writeln!(writer, "# Alphabet: {{0,1,2,3}} (color space)")?;
    } else {
        writeln!(writer, "# Alphabet: {{A,C,G,T}}")?;
    }
    writeln!(
        writer,
        "# Format: k-mer sequence; coverage value; first symbol of parents; last symbol of children"
    )?;
    writeln!(writer, "# Note that vertices with a coverage of 1 are not considered.")?;
    for listing in rank_listings {
        let content = std::fs::read(listing)?;
        writer.write_all(&content)?;
        std::fs::remove_file(listing)?;
    }
    writer.flush()?;
    Ok(())
}
