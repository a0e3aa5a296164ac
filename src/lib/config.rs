//! Engine configuration shared by every component of a rank.

use crate::errors::{BraidError, Result};
use braid_kmer::{KMER_WORDS, MAX_KMER_LENGTH};

/// Default cap on one message payload, in bytes. Drives the per-destination
/// buffer size and therefore the per-rank outbound memory bound.
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 4096;

/// Configuration surface consumed by the distributed engine.
///
/// One instance per rank; the only field that differs between ranks is
/// `rank` itself. The rank-to-shard mapping is pure (`hash mod world_size`)
/// so no coordination is needed to agree on any of this.
#[derive(Debug, Clone)]
pub struct Parameters {
    /// K-mer width.
    pub word_size: usize,
    /// Number of participating ranks.
    pub world_size: u16,
    /// This rank's identifier, `0..world_size`.
    pub rank: u16,
    /// Upper bound on one message payload in bytes.
    pub max_message_bytes: usize,
    /// Minimum candidate count for promotion into the graph.
    pub min_coverage: u32,
}

impl Parameters {
    /// Build a validated parameter set for one rank.
    pub fn new(
        word_size: usize,
        world_size: u16,
        rank: u16,
        max_message_bytes: usize,
        min_coverage: u32,
    ) -> Result<Parameters> {
        if word_size == 0 || word_size > MAX_KMER_LENGTH {
            return Err(BraidError::InvalidParameter {
                parameter: "word-size".to_string(),
                reason: format!("{word_size} is outside 1..={MAX_KMER_LENGTH}"),
            });
        }
        if world_size == 0 {
            return Err(BraidError::InvalidParameter {
                parameter: "ranks".to_string(),
                reason: "world size must be at least 1".to_string(),
            });
        }
        if rank >= world_size {
            return Err(BraidError::InvalidParameter {
                parameter: "rank".to_string(),
                reason: format!("{rank} is not below world size {world_size}"),
            });
        }
        if max_message_bytes < KMER_WORDS * 8 * 2 {
            return Err(BraidError::InvalidParameter {
                parameter: "max-message-bytes".to_string(),
                reason: format!(
                    "{max_message_bytes} cannot hold one edge record ({} bytes)",
                    KMER_WORDS * 8 * 2
                ),
            });
        }
        Ok(Parameters { word_size, world_size, rank, max_message_bytes, min_coverage })
    }

    /// The same parameters re-bound to another rank.
    #[must_use]
    pub fn for_rank(&self, rank: u16) -> Parameters {
        Parameters { rank, ..self.clone() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_parameters() {
        let params = Parameters::new(21, 4, 2, DEFAULT_MAX_MESSAGE_BYTES, 2).unwrap();
        assert_eq!(params.word_size, 21);
        assert_eq!(params.for_rank(0).rank, 0);
    }

    #[test]
    fn rejects_bad_word_size() {
        assert!(Parameters::new(0, 1, 0, DEFAULT_MAX_MESSAGE_BYTES, 2).is_err());
        assert!(Parameters::new(MAX_KMER_LENGTH + 1, 1, 0, DEFAULT_MAX_MESSAGE_BYTES, 2).is_err());
    }

    #[test]
    fn rejects_rank_outside_world() {
        assert!(Parameters::new(21, 2, 2, DEFAULT_MAX_MESSAGE_BYTES, 2).is_err());
        assert!(Parameters::new(21, 0, 0, DEFAULT_MAX_MESSAGE_BYTES, 2).is_err());
    }

    #[test]
    fn rejects_tiny_message_budget() {
        assert!(Parameters::new(21, 2, 0, 16, 2).is_err());
    }
}
