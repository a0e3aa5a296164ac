//! Helper utilities for integration tests.

use std::path::{Path, PathBuf};
use std::process::Command;

/// Path to the compiled braid binary.
#[must_use]
pub fn braid_binary_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_braid"))
}

/// Write reads to a FASTA file in `dir` and return its path.
pub fn write_fasta(dir: &Path, name: &str, reads: &[&str]) -> PathBuf {
    let path = dir.join(name);
    let mut content = String::new();
    for (index, read) in reads.iter().enumerate() {
        content.push_str(&format!(">read{index}\n{read}\n"));
    }
    std::fs::write(&path, content).expect("failed to write FASTA");
    path
}

/// Run the braid binary with the given arguments, asserting success.
pub fn run_braid(args: &[&str]) {
    let output = Command::new(braid_binary_path())
        .args(args)
        .output()
        .expect("failed to launch braid");
    assert!(
        output.status.success(),
        "braid {:?} failed:\nstdout: {}\nstderr: {}",
        args,
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
}
