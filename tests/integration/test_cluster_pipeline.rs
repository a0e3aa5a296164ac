//! Multi-rank pipeline tests against the library API.

use braid_lib::reads::{ReadRecord, ReadStore};
use braid_lib::{run_cluster, ClusterConfig};
use braid_kmer::{Kmer, Strand};

fn config(world_size: u16, word_size: usize, build_graph: bool) -> ClusterConfig {
    ClusterConfig {
        word_size,
        world_size,
        max_message_bytes: 256,
        min_coverage: 2,
        build_graph,
        output_prefix: None,
        write_kmer_listing: false,
    }
}

fn store_of(reads: &[&str]) -> ReadStore {
    let mut store = ReadStore::new();
    for read in reads {
        store.push(ReadRecord::new(read.as_bytes()));
    }
    store
}

#[test]
fn sharding_splits_candidates_across_ranks() {
    // Many distinct k-mers over four ranks: every candidate lands on the
    // rank given by its canonical hash, each exactly once.
    let read = "ACGTACGGTCAAGCTTACGGATCCTAGGCATCGATCGGA";
    let word_size = 8;
    let reports = run_cluster(&config(4, word_size, false), store_of(&[read])).unwrap();

    let mut expected = std::collections::BTreeSet::new();
    for pos in 0..=read.len() - word_size {
        let kmer =
            Kmer::from_sequence(read.as_bytes(), pos, word_size, Strand::Forward).unwrap();
        expected.insert(kmer.canonical(word_size).render(word_size));
    }
    let total: u64 = reports.iter().map(|r| r.academy_size).sum();
    assert_eq!(total, expected.len() as u64);
}

#[test]
fn complementary_reads_meet_on_one_rank() {
    // A read and its reverse complement contribute the same canonical
    // candidates, so candidate counts double instead of splitting.
    let forward = "ACGGTCAAGCTTAC";
    let reverse: String = forward
        .bytes()
        .rev()
        .map(|b| braid_kmer::codec::complement_base(b) as char)
        .collect();
    let word_size = 6;

    let single = run_cluster(&config(3, word_size, false), store_of(&[forward])).unwrap();
    let both =
        run_cluster(&config(3, word_size, false), store_of(&[forward, &reverse])).unwrap();

    let single_total: u64 = single.iter().map(|r| r.academy_size).sum();
    let both_total: u64 = both.iter().map(|r| r.academy_size).sum();
    assert_eq!(single_total, both_total);

    // Every candidate is now seen exactly twice.
    let histogram = &both[0].academy_distribution;
    assert_eq!(histogram.len(), 1);
    assert_eq!(histogram.get(&2), Some(&single_total));
}

#[test]
fn small_messages_force_many_batches() {
    // A payload cap of one record per batch exercises the
    // one-in-flight-per-destination backpressure heavily.
    let config = ClusterConfig {
        word_size: 4,
        world_size: 2,
        max_message_bytes: braid_kmer::KMER_WORDS * 8 * 2,
        min_coverage: 1,
        build_graph: false,
        output_prefix: None,
        write_kmer_listing: false,
    };
    let reports = run_cluster(&config, store_of(&["ACGTACGTACGTACGT", "TTGGCCAATTGGCCAA"]))
        .unwrap();
    let observed: u64 = reports.iter().map(|r| r.kmers_observed).sum();
    assert_eq!(observed, 13 + 13);
    assert!(reports[0].academy_distribution.values().sum::<u64>() > 0);
}

#[test]
fn full_build_links_edges_across_ranks() {
    // A unique-k-mer read at coverage 2: interior vertices must carry
    // both an ingoing and an outgoing edge on whichever rank owns them.
    let read = "AACGGTCTTGA";
    let word_size = 5;
    let config = ClusterConfig {
        word_size,
        world_size: 3,
        max_message_bytes: 256,
        min_coverage: 2,
        build_graph: true,
        output_prefix: None,
        write_kmer_listing: false,
    };
    let reports = run_cluster(&config, store_of(&[read, read])).unwrap();

    let windows = read.len() - word_size + 1;
    let promoted: u64 = reports.iter().map(|r| r.promoted).sum();
    assert_eq!(promoted, windows as u64);
    let edges: u64 = reports.iter().map(|r| r.edges_emitted).sum();
    assert_eq!(edges, 2 * (windows as u64 - 1));
    // The graph histogram sits entirely in the coverage-2 bucket.
    assert_eq!(reports[0].graph_distribution.get(&2), Some(&(windows as u64)));
}

#[test]
fn below_threshold_candidates_never_materialize() {
    let reports =
        run_cluster(&config(2, 4, true), store_of(&["ACGTTGCA"])).unwrap();
    // Single coverage everywhere, threshold 2: empty graph.
    let graph: u64 = reports.iter().map(|r| r.graph_size).sum();
    assert_eq!(graph, 0);
    let academy_total: u64 = reports[0].academy_distribution.values().sum();
    assert!(academy_total > 0);
}
