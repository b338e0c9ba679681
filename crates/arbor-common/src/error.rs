//! Error types for Arbor.

use thiserror::Error;

/// Result type alias using ArborError.
pub type Result<T> = std::result::Result<T, ArborError>;

/// Errors that can occur in Arbor operations.
#[derive(Debug, Error)]
pub enum ArborError {
    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Page store errors
    #[error("Block {block} is beyond the end of relation \"{relation}\" ({num_blocks} blocks)")]
    PageNotFound {
        relation: String,
        block: u32,
        num_blocks: u32,
    },

    #[error("Page corrupted: block {block}, reason: {reason}")]
    PageCorrupted { block: u32, reason: String },

    // WAL errors
    #[error("WAL write failed: {0}")]
    WalWriteFailed(String),

    #[error("WAL corrupted at LSN {lsn}: {reason}")]
    WalCorrupted { lsn: u64, reason: String },

    // Vacuum errors
    #[error("Cannot add block {block} to page set after {last}: values must be ascending")]
    NonAscendingBlock { block: u32, last: u32 },

    #[error("Vacuum of index \"{0}\" was interrupted")]
    Interrupted(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid parameter: {name} = {value}")]
    InvalidParameter { name: String, value: String },

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}
