//! Bit-packed k-mer values for distributed de Bruijn graph construction.
//!
//! This crate holds the value types shared by every rank of the
//! assembler: the 2-bit symbol codecs for base space and SOLiD color
//! space, and the fixed-width [`Kmer`] with canonicalization, reverse
//! complement, deterministic hashing, and edge extension. Everything here
//! is plain data, no I/O and no messaging, so the distributed layers can
//! move these values across rank boundaries as raw words.

pub mod codec;
pub mod kmer;

pub use kmer::{Kmer, KmerError, Strand, KMER_WORDS, MAX_KMER_LENGTH};
