//! Options and helpers shared by the CLI commands.

use anyhow::{bail, Result};
use braid_lib::logging::format_count;
use braid_lib::RankReport;
use clap::Args;
use log::info;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Engine options common to every command.
#[derive(Debug, Args)]
pub struct EngineOptions {
    /// Input reads: FASTA or FASTQ, optionally gzip-compressed
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,

    /// K-mer width
    #[arg(short = 'k', long = "word-size", default_value_t = 21)]
    pub word_size: usize,

    /// Number of ranks to run in this process
    #[arg(short = 'r', long = "ranks", default_value_t = 1)]
    pub ranks: u16,

    /// Upper bound on one message payload in bytes
    #[arg(long = "max-message-bytes", default_value_t = 4096)]
    pub max_message_bytes: usize,

    /// Prefix for output files
    #[arg(short = 'o', long = "output-prefix", default_value = "braid")]
    pub output_prefix: PathBuf,
}

impl EngineOptions {
    /// Fail early when the input file is missing.
    pub fn validate(&self) -> Result<()> {
        if !self.input.exists() {
            bail!("Input file '{}' does not exist", self.input.display());
        }
        Ok(())
    }

    /// Path derived from the output prefix, e.g. `braid` + `.kmers.txt`.
    #[must_use]
    pub fn output_path(&self, suffix: &str) -> PathBuf {
        let mut name = self.output_prefix.clone().into_os_string();
        name.push(suffix);
        PathBuf::from(name)
    }
}

/// Write a `coverage<TAB>count` distribution file, smallest coverage
/// first.
pub fn write_coverage_distribution(
    path: &Path,
    distribution: &BTreeMap<u64, u64>,
) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    for (coverage, count) in distribution {
        writeln!(writer, "{coverage}\t{count}")?;
    }
    writer.flush()?;
    info!("Wrote coverage distribution to {}", path.display());
    Ok(())
}

/// Log the per-rank counting summary shared by both commands.
pub fn log_counting_summary(reports: &[RankReport]) {
    let observed: u64 = reports.iter().map(|r| r.kmers_observed).sum();
    let invalid: u64 = reports.iter().map(|r| r.invalid_windows).sum();
    let candidates: u64 = reports.iter().map(|r| r.academy_size).sum();
    info!("K-mer Counting Summary:");
    info!("  Windows routed: {}", format_count(observed));
    info!("  Malformed windows skipped: {}", format_count(invalid));
    info!("  Distinct candidates: {}", format_count(candidates));
    for report in reports {
        info!(
            "  Rank {}: {} candidates",
            report.rank,
            format_count(report.academy_size)
        );
    }
}
