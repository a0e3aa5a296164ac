//! Custom error types for braid operations.

use braid_kmer::KmerError;
use thiserror::Error;

/// Result type alias for braid operations
pub type Result<T> = std::result::Result<T, BraidError>;

/// Error type for braid operations
#[derive(Error, Debug)]
pub enum BraidError {
    /// Invalid parameter value provided
    #[error("Invalid parameter '{parameter}': {reason}")]
    InvalidParameter {
        /// The parameter name
        parameter: String,
        /// Explanation of why it's invalid
        reason: String,
    },

    /// File format error
    #[error("Invalid {file_type} file '{path}': {reason}")]
    InvalidFileFormat {
        /// Type of file (e.g., "FASTA", "FASTQ")
        file_type: String,
        /// Path to the file
        path: String,
        /// Explanation of the problem
        reason: String,
    },

    /// A k-mer could not be built from read text
    #[error(transparent)]
    Kmer(#[from] KmerError),

    /// Underlying I/O failure
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
