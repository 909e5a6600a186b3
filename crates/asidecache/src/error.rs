//! Error types surfaced by the cache-aside policies

use recordstore::RecordId;
use thiserror::Error;

/// Result type alias for policy operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors a caller of `fetch`/`update` can observe.
///
/// Cache backend failures never appear here: they are logged and absorbed.
#[derive(Debug, Error)]
pub enum Error {
    /// The identifier is not in the authoritative store
    #[error("record {0} not found")]
    NotFound(RecordId),

    /// The request was rejected before touching any backend
    #[error("validation failed: {0}")]
    Validation(String),

    /// The authoritative store failed; there is no fallback
    #[error("store error: {0}")]
    Store(#[from] recordstore::Error),

    /// Invalid policy configuration
    #[error("invalid configuration: {0}")]
    Config(String),
}
