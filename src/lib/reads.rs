//! In-memory read storage and FASTA/FASTQ loading.
//!
//! Reads are loaded once, normalized, and handed to the engine through an
//! index/length interface. A multi-rank run partitions the store
//! round-robin so every read belongs to exactly one rank.

use crate::errors::{BraidError, Result};
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// One sequencing read.
#[derive(Debug, Clone)]
pub struct ReadRecord {
    sequence: Box<[u8]>,
    color_space: bool,
}

impl ReadRecord {
    /// Store a read, normalizing symbols to upper case.
    #[must_use]
    pub fn new(sequence: &[u8]) -> ReadRecord {
        let normalized: Vec<u8> = sequence.iter().map(u8::to_ascii_uppercase).collect();
        let color_space = braid_kmer::codec::is_color_space(&normalized);
        ReadRecord { sequence: normalized.into_boxed_slice(), color_space }
    }

    /// The read text.
    #[must_use]
    pub fn sequence(&self) -> &[u8] {
        &self.sequence
    }

    /// Length of the read in symbols.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    /// Whether the read is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    /// Whether the read is SOLiD color space.
    #[must_use]
    pub fn is_color_space(&self) -> bool {
        self.color_space
    }
}

/// An indexed collection of reads owned by one rank.
#[derive(Debug, Default)]
pub struct ReadStore {
    reads: Vec<ReadRecord>,
}

impl ReadStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> ReadStore {
        ReadStore { reads: Vec::new() }
    }

    /// Load reads from a FASTA or FASTQ file, optionally gzip-compressed.
    /// The format is chosen by file extension.
    pub fn from_path(path: &Path) -> Result<ReadStore> {
        let display = path.display().to_string();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        let stem = name.strip_suffix(".gz").unwrap_or(&name);
        let file = File::open(path)?;
        let reader: Box<dyn Read> = if name.ends_with(".gz") {
            Box::new(MultiGzDecoder::new(file))
        } else {
            Box::new(file)
        };
        if stem.ends_with(".fa") || stem.ends_with(".fasta") || stem.ends_with(".fna") {
            Self::from_fasta(reader, &display)
        } else if stem.ends_with(".fq") || stem.ends_with(".fastq") {
            Self::from_fastq(reader, &display)
        } else {
            Err(BraidError::InvalidFileFormat {
                file_type: "read".to_string(),
                path: display,
                reason: "unrecognized extension (expected .fa/.fasta/.fna/.fq/.fastq, optionally .gz)"
                    .to_string(),
            })
        }
    }

    fn from_fasta(reader: impl Read, path: &str) -> Result<ReadStore> {
        let mut store = ReadStore::new();
        let mut parser = seq_io::fasta::Reader::new(reader);
        #[allow(unused_imports)]
        use seq_io::fasta::Record as _;
        while let Some(record) = parser.next() {
            let record = record.map_err(|error| BraidError::InvalidFileFormat {
                file_type: "FASTA".to_string(),
                path: path.to_string(),
                reason: error.to_string(),
            })?;
            store.push(ReadRecord::new(&record.full_seq()));
        }
        Ok(store)
    }

    fn from_fastq(reader: impl Read, path: &str) -> Result<ReadStore> {
        let mut store = ReadStore::new();
        let mut parser = seq_io::fastq::Reader::new(reader);
        use seq_io::fastq::Record;
        while let Some(record) = parser.next() {
            let record = record.map_err(|error| BraidError::InvalidFileFormat {
                file_type: "FASTQ".to_string(),
                path: path.to_string(),
                reason: error.to_string(),
            })?;
            store.push(ReadRecord::new(record.seq()));
        }
        Ok(store)
    }

    /// Append one read.
    pub fn push(&mut self, read: ReadRecord) {
        self.reads.push(read);
    }

    /// Number of reads held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.reads.len()
    }

    /// Whether the store holds no reads.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reads.is_empty()
    }

    /// The read at `index`, if any.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&ReadRecord> {
        self.reads.get(index)
    }

    /// Whether any read is SOLiD color space.
    #[must_use]
    pub fn any_color_space(&self) -> bool {
        self.reads.iter().any(ReadRecord::is_color_space)
    }

    /// Split the store round-robin into one store per rank. Every read
    /// lands in exactly one partition.
    #[must_use]
    pub fn partition(self, world_size: u16) -> Vec<ReadStore> {
        let mut partitions: Vec<ReadStore> =
            (0..world_size).map(|_| ReadStore::new()).collect();
        for (index, read) in self.reads.into_iter().enumerate() {
            partitions[index % world_size as usize].push(read);
        }
        partitions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_normalize_to_upper_case() {
        let read = ReadRecord::new(b"acgtN");
        assert_eq!(read.sequence(), b"ACGTN");
        assert!(!read.is_color_space());
        let solid = ReadRecord::new(b"T01230");
        assert!(solid.is_color_space());
    }

    #[test]
    fn partition_is_round_robin_and_lossless() {
        let mut store = ReadStore::new();
        for index in 0..10 {
            store.push(ReadRecord::new(format!("ACGT{}", "A".repeat(index)).as_bytes()));
        }
        let partitions = store.partition(3);
        assert_eq!(partitions.len(), 3);
        let total: usize = partitions.iter().map(ReadStore::len).sum();
        assert_eq!(total, 10);
        assert_eq!(partitions[0].len(), 4);
        assert_eq!(partitions[1].len(), 3);
        assert_eq!(partitions[2].len(), 3);
    }

    #[test]
    fn loads_fasta_with_wrapped_lines() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("reads.fa");
        let mut file = File::create(&path).unwrap();
        writeln!(file, ">read1\nACGT\nACGT\n>read2\nTTTT").unwrap();
        drop(file);
        let store = ReadStore::from_path(&path).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(0).unwrap().sequence(), b"ACGTACGT");
        assert_eq!(store.get(1).unwrap().sequence(), b"TTTT");
    }

    #[test]
    fn loads_fastq() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("reads.fq");
        let mut file = File::create(&path).unwrap();
        writeln!(file, "@read1\nACGTACGT\n+\nIIIIIIII").unwrap();
        drop(file);
        let store = ReadStore::from_path(&path).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(0).unwrap().sequence(), b"ACGTACGT");
    }

    #[test]
    fn loads_gzipped_fasta() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("reads.fa.gz");
        let file = File::create(&path).unwrap();
        let mut encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        encoder.write_all(b">read1\nGATTACA\n").unwrap();
        encoder.finish().unwrap();
        let store = ReadStore::from_path(&path).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(0).unwrap().sequence(), b"GATTACA");
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("reads.bin");
        std::fs::write(&path, b"junk").unwrap();
        assert!(matches!(
            ReadStore::from_path(&path),
            Err(BraidError::InvalidFileFormat { .. })
        ));
    }
}
