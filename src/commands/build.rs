//! Build the distributed de Bruijn graph.

use anyhow::Result;
use braid_lib::gatherer::combine_rank_listings;
use braid_lib::logging::{format_count, OperationTimer};
use braid_lib::reads::ReadStore;
use braid_lib::{run_cluster, ClusterConfig};
use clap::Parser;
use log::info;
use std::path::PathBuf;

use crate::commands::command::Command;
use crate::commands::common::{log_counting_summary, write_coverage_distribution, EngineOptions};

/// Build the full de Bruijn graph: count, promote, link edges, and dump.
#[derive(Debug, Parser)]
#[command(
    name = "build",
    about = "Build the distributed de Bruijn graph from reads",
    long_about = r#"
Build the de Bruijn graph from the input reads across a set of ranks.

The run proceeds in phases: canonical k-mers are counted into each rank's
academy; candidates reaching the minimum coverage are promoted into graph
vertices; the reads are walked again to distribute edges to the vertex
owners; finally the vertex coverage histogram is gathered on rank 0 and
the retained k-mers are written as a text listing:

  <prefix>.coverage-distribution.tsv   candidate coverage histogram
  <prefix>.kmers.txt                   one line per retained k-mer

Example usage:
  braid build -i reads.fa -k 21 -r 4 -c 2 -o sample1
"#
)]
pub struct Build {
    /// Shared engine options
    #[command(flatten)]
    pub engine: EngineOptions,

    /// Minimum candidate coverage for promotion into the graph
    #[arg(short = 'c', long = "min-coverage", default_value_t = 2)]
    pub min_coverage: u32,

    /// Skip writing the k-mer listing
    #[arg(long = "no-kmer-listing", default_value_t = false)]
    pub no_kmer_listing: bool,
}

impl Command for Build {
    fn execute(&self) -> Result<()> {
        self.engine.validate()?;
        let timer = OperationTimer::new("Building the graph");
        info!("Input: {}", self.engine.input.display());
        info!("Word size: {}", self.engine.word_size);
        info!("Ranks: {}", self.engine.ranks);
        info!("Minimum coverage: {}", self.min_coverage);

        let reads = ReadStore::from_path(&self.engine.input)?;
        let color_space = reads.any_color_space();
        info!("Loaded {} reads{}", reads.len(), if color_space { " (color space)" } else { "" });

        let config = ClusterConfig {
            word_size: self.engine.word_size,
            world_size: self.engine.ranks,
            max_message_bytes: self.engine.max_message_bytes,
            min_coverage: self.min_coverage,
            build_graph: true,
            output_prefix: Some(self.engine.output_prefix.clone()),
            write_kmer_listing: !self.no_kmer_listing,
        };
        let reports = run_cluster(&config, reads)?;

        log_counting_summary(&reports);
        let vertices: u64 = reports.iter().map(|r| r.graph_size).sum();
        info!("Graph Summary:");
        info!("  Vertices: {}", format_count(vertices));
        info!(
            "  Promoted candidates: {}",
            format_count(reports.iter().map(|r| r.promoted).sum())
        );

        write_coverage_distribution(
            &self.engine.output_path(".coverage-distribution.tsv"),
            &reports[0].academy_distribution,
        )?;

        if !self.no_kmer_listing {
            let rank_listings: Vec<PathBuf> =
                reports.iter().filter_map(|r| r.kmer_listing.clone()).collect();
            let output = self.engine.output_path(".kmers.txt");
            combine_rank_listings(&output, self.engine.word_size, color_space, &rank_listings)?;
            info!("Wrote k-mer listing to {}", output.display());
        }

        timer.log_completion(vertices);
        Ok(())
    }
}
