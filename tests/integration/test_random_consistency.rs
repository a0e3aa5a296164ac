//! Randomized consistency checks.
//!
//! The candidate population must not depend on how many ranks the work
//! is sharded over: a single-rank run is the reference result for any
//! world size.

use braid_lib::reads::{ReadRecord, ReadStore};
use braid_lib::{run_cluster, ClusterConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;

fn random_read(rng: &mut StdRng, length: usize) -> String {
    (0..length).map(|_| ['A', 'C', 'G', 'T'][rng.gen_range(0..4)]).collect()
}

fn config(world_size: u16, word_size: usize) -> ClusterConfig {
    ClusterConfig {
        word_size,
        world_size,
        max_message_bytes: 512,
        min_coverage: 1,
        build_graph: false,
        output_prefix: None,
        write_kmer_listing: false,
    }
}

fn count(world_size: u16, word_size: usize, reads: &[String]) -> (u64, BTreeMap<u64, u64>) {
    let mut store = ReadStore::new();
    for read in reads {
        store.push(ReadRecord::new(read.as_bytes()));
    }
    let reports = run_cluster(&config(world_size, word_size), store).unwrap();
    let total = reports.iter().map(|r| r.academy_size).sum();
    (total, reports[0].academy_distribution.clone())
}

#[test]
fn world_size_does_not_change_the_candidates() {
    let mut rng = StdRng::seed_from_u64(0x1bad_5eed);
    let reads: Vec<String> = (0..40).map(|_| random_read(&mut rng, 80)).collect();
    let word_size = 15;

    let (reference_total, reference_histogram) = count(1, word_size, &reads);
    assert!(reference_total > 0);
    for world_size in [2, 3, 5] {
        let (total, histogram) = count(world_size, word_size, &reads);
        assert_eq!(total, reference_total, "world size {world_size} lost candidates");
        assert_eq!(histogram, reference_histogram, "world size {world_size} skewed coverage");
    }
}

#[test]
fn reads_with_ambiguous_bases_skip_only_those_windows() {
    let mut rng = StdRng::seed_from_u64(42);
    let clean = random_read(&mut rng, 60);
    // Corrupt one symbol in the middle; windows overlapping it vanish.
    let mut corrupted = clean.clone().into_bytes();
    corrupted[30] = b'N';
    let corrupted = String::from_utf8(corrupted).unwrap();
    let word_size = 9;

    let mut store = ReadStore::new();
    store.push(ReadRecord::new(corrupted.as_bytes()));
    let reports = run_cluster(&config(2, word_size), store).unwrap();

    let windows = (clean.len() - word_size + 1) as u64;
    assert_eq!(reports[0].invalid_windows, word_size as u64);
    assert_eq!(reports[0].kmers_observed, windows - word_size as u64);
}
