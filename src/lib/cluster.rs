//! In-process multi-rank runs.
//!
//! Spawns one thread per rank, wires them into a channel mesh, and runs
//! each rank's event loop to completion. Threads share nothing but the
//! transport: each receives its own read partition, graph shard, and
//! router, exactly as separate processes would.

use crate::config::Parameters;
use crate::errors::Result;
use crate::rank::{RankReport, RankWorker, RunPlan};
use crate::reads::ReadStore;
use crate::transport::channel_mesh;
use std::path::PathBuf;
use std::thread;

/// Configuration for one multi-rank run.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// K-mer width.
    pub word_size: usize,
    /// Number of ranks to spawn.
    pub world_size: u16,
    /// Upper bound on one message payload in bytes.
    pub max_message_bytes: usize,
    /// Minimum candidate count for promotion into the graph.
    pub min_coverage: u32,
    /// Run the full graph build instead of counting only.
    pub build_graph: bool,
    /// Prefix for output files.
    pub output_prefix: Option<PathBuf>,
    /// Whether to write the diagnostic k-mer listing.
    pub write_kmer_listing: bool,
}

/// Run every phase of the configured plan across `world_size` ranks and
/// return the per-rank reports, ordered by rank.
pub fn run_cluster(config: &ClusterConfig, reads: ReadStore) -> Result<Vec<RankReport>> {
    let base = Parameters::new(
        config.word_size,
        config.world_size,
        0,
        config.max_message_bytes,
        config.min_coverage,
    )?;
    let mut plan = if config.build_graph { RunPlan::full_build() } else { RunPlan::counting() };
    plan.output_prefix = config.output_prefix.clone();
    plan.write_kmer_listing = config.write_kmer_listing && config.build_graph;

    let partitions = reads.partition(config.world_size);
    let transports = channel_mesh(config.world_size);

    let mut reports = thread::scope(|scope| {
        let handles: Vec<_> = transports
            .into_iter()
            .zip(partitions)
            .enumerate()
            .map(|(rank, (transport, partition))| {
                let params = base.for_rank(rank as u16);
                let plan = plan.clone();
                scope.spawn(move || {
                    RankWorker::new(params, transport, partition, plan).run()
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| {
                handle.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic))
            })
            .collect::<Result<Vec<RankReport>>>()
    })?;
    reports.sort_by_key(|report| report.rank);
    Ok(reports)
}
