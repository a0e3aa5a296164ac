//! End-to-end tests for the `count` command.

use crate::helpers::{run_braid, write_fasta};
use tempfile::TempDir;

#[test]
fn count_writes_the_coverage_distribution() {
    let tmp = TempDir::new().unwrap();
    let input = write_fasta(tmp.path(), "reads.fa", &["AACG", "AACG", "AACG", "GGTC"]);
    let prefix = tmp.path().join("sample");

    run_braid(&[
        "count",
        "-i",
        input.to_str().unwrap(),
        "-k",
        "4",
        "-r",
        "2",
        "-o",
        prefix.to_str().unwrap(),
    ]);

    let distribution = tmp.path().join("sample.coverage-distribution.tsv");
    let content = std::fs::read_to_string(&distribution).unwrap();
    // AACG observed three times, GGTC once.
    assert_eq!(content, "1\t1\n3\t1\n");
}

#[test]
fn count_accepts_gzipped_fastq() {
    use std::io::Write;
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("reads.fq.gz");
    let file = std::fs::File::create(&input).unwrap();
    let mut encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
    encoder.write_all(b"@read1\nACGTACGT\n+\nIIIIIIII\n").unwrap();
    encoder.finish().unwrap();
    let prefix = tmp.path().join("gz");

    run_braid(&[
        "count",
        "-i",
        input.to_str().unwrap(),
        "-k",
        "4",
        "-o",
        prefix.to_str().unwrap(),
    ]);

    assert!(tmp.path().join("gz.coverage-distribution.tsv").exists());
}

#[test]
fn count_rejects_missing_input() {
    let output = std::process::Command::new(crate::helpers::braid_binary_path())
        .args(["count", "-i", "/definitely/not/here.fa"])
        .output()
        .unwrap();
    assert!(!output.status.success());
}
