//! Error types for recordstore

use std::io;

use thiserror::Error;

/// Result type alias for record store operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for store operations
#[derive(Debug, Error)]
pub enum Error {
    /// The store could not serve the request
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// I/O error while loading records
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Record data could not be decoded
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Two seed records share an identifier
    #[error("duplicate record id {0}")]
    DuplicateId(u64),
}
