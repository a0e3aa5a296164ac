//! Count k-mers and gather the coverage distribution.

use anyhow::Result;
use braid_lib::logging::OperationTimer;
use braid_lib::reads::ReadStore;
use braid_lib::{run_cluster, ClusterConfig};
use clap::Parser;
use log::info;

use crate::commands::command::Command;
use crate::commands::common::{log_counting_summary, write_coverage_distribution, EngineOptions};

/// Count canonical k-mers across ranks and write the coverage
/// distribution of the candidates.
#[derive(Debug, Parser)]
#[command(
    name = "count",
    about = "Count canonical k-mers and gather their coverage distribution",
    long_about = r#"
Count canonical k-mers in the input reads across a set of ranks.

Each read window is canonicalized (a k-mer and its reverse complement
count as one) and routed to its owner rank by hash. Once every rank has
drained its buffers, the coverage histogram of all candidates is gathered
on rank 0 and written as a tab-separated file:

  <prefix>.coverage-distribution.tsv

Example usage:
  braid count -i reads.fq.gz -k 21 -r 4 -o sample1
"#
)]
pub struct Count {
    /// Shared engine options
    #[command(flatten)]
    pub engine: EngineOptions,
}

impl Command for Count {
    fn execute(&self) -> Result<()> {
        self.engine.validate()?;
        let timer = OperationTimer::new("Counting k-mers");
        info!("Input: {}", self.engine.input.display());
        info!("Word size: {}", self.engine.word_size);
        info!("Ranks: {}", self.engine.ranks);

        let reads = ReadStore::from_path(&self.engine.input)?;
        info!("Loaded {} reads", reads.len());

        let config = ClusterConfig {
            word_size: self.engine.word_size,
            world_size: self.engine.ranks,
            max_message_bytes: self.engine.max_message_bytes,
            min_coverage: 1,
            build_graph: false,
            output_prefix: Some(self.engine.output_prefix.clone()),
            write_kmer_listing: false,
        };
        let reports = run_cluster(&config, reads)?;

        log_counting_summary(&reports);
        let observed: u64 = reports.iter().map(|r| r.kmers_observed).sum();
        write_coverage_distribution(
            &self.engine.output_path(".coverage-distribution.tsv"),
            &reports[0].academy_distribution,
        )?;
        timer.log_completion(observed);
        Ok(())
    }
}
