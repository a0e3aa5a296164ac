//! End-to-end tests for the `build` command.

use crate::helpers::{run_braid, write_fasta};
use tempfile::TempDir;

#[test]
fn build_writes_listing_and_distribution() {
    let tmp = TempDir::new().unwrap();
    // One read at coverage 3: every window survives the default
    // threshold of 2.
    let read = "AACGGTCTTGA";
    let input = write_fasta(tmp.path(), "reads.fa", &[read, read, read]);
    let prefix = tmp.path().join("asm");

    run_braid(&[
        "build",
        "-i",
        input.to_str().unwrap(),
        "-k",
        "5",
        "-r",
        "3",
        "-o",
        prefix.to_str().unwrap(),
    ]);

    let distribution =
        std::fs::read_to_string(tmp.path().join("asm.coverage-distribution.tsv")).unwrap();
    let windows = read.len() - 5 + 1;
    assert_eq!(distribution, format!("3\t{windows}\n"));

    let listing = std::fs::read_to_string(tmp.path().join("asm.kmers.txt")).unwrap();
    assert!(listing.starts_with("# The length of k-mers is 5"));
    assert!(listing.contains("{A,C,G,T}"));
    let lines: Vec<&str> = listing.lines().filter(|l| !l.starts_with('#')).collect();
    assert_eq!(lines.len(), windows);
    for line in &lines {
        let fields: Vec<&str> = line.split(';').collect();
        assert_eq!(fields.len(), 4, "malformed line: {line}");
        assert_eq!(fields[0].len(), 5);
        assert_eq!(fields[1], "3");
    }
    // Per-rank shards are cleaned up after concatenation.
    for rank in 0..3 {
        assert!(!tmp.path().join(format!("asm.kmers.rank{rank}.txt")).exists());
    }
}

#[test]
fn build_can_skip_the_listing() {
    let tmp = TempDir::new().unwrap();
    let input = write_fasta(tmp.path(), "reads.fa", &["ACGTACGTAC", "ACGTACGTAC"]);
    let prefix = tmp.path().join("nolist");

    run_braid(&[
        "build",
        "-i",
        input.to_str().unwrap(),
        "-k",
        "4",
        "--no-kmer-listing",
        "-o",
        prefix.to_str().unwrap(),
    ]);

    assert!(tmp.path().join("nolist.coverage-distribution.tsv").exists());
    assert!(!tmp.path().join("nolist.kmers.txt").exists());
}

#[test]
fn build_honors_the_coverage_threshold() {
    let tmp = TempDir::new().unwrap();
    // Single-coverage reads with a threshold too high for any of them.
    let input = write_fasta(tmp.path(), "reads.fa", &["ACGTTGCAGG"]);
    let prefix = tmp.path().join("strict");

    run_braid(&[
        "build",
        "-i",
        input.to_str().unwrap(),
        "-k",
        "4",
        "-c",
        "5",
        "-o",
        prefix.to_str().unwrap(),
    ]);

    let listing = std::fs::read_to_string(tmp.path().join("strict.kmers.txt")).unwrap();
    let lines: Vec<&str> = listing.lines().filter(|l| !l.starts_with('#')).collect();
    assert!(lines.is_empty());
}
