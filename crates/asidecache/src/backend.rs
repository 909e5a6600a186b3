//! Cache backend interface
//!
//! A string key-value store with per-key TTL, atomic increment and cursor
//! based key enumeration. Adapters carry no policy.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Result type alias for backend calls
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Cursor that starts a scan; a page carrying it as `next_cursor` is the last
pub const SCAN_START: u64 = 0;

/// Failure of a single cache backend call
#[derive(Debug, Error)]
pub enum CacheError {
    /// Redis client or connection error
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// The backend is not reachable
    #[error("cache backend unavailable")]
    Unavailable,

    /// The backend answered with something the adapter cannot interpret
    #[error("unexpected reply: {0}")]
    Protocol(String),

    /// The TTL cannot be represented by the backend
    #[error("TTL {0:?} is out of range")]
    TtlOutOfRange(Duration),

    /// The call did not complete within the configured limit
    #[error("cache backend did not answer within {0:?}")]
    Timeout(Duration),
}

/// Remaining lifetime of a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// Key expires after this duration; zero means already expired
    Remaining(Duration),
    /// Key exists without an expiration
    NoExpiry,
    /// Key does not exist
    Absent,
}

impl KeyTtl {
    /// A key the sweeper should delete: no expiry set, or nothing left
    pub fn is_stale(&self) -> bool {
        match self {
            KeyTtl::NoExpiry => true,
            KeyTtl::Remaining(left) => left.is_zero(),
            KeyTtl::Absent => false,
        }
    }
}

/// One page of a prefix scan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanPage {
    /// Keys found on this page (may be empty even when more pages follow)
    pub keys: Vec<String>,
    /// Cursor for the next call
    pub next_cursor: u64,
}

impl ScanPage {
    /// Whether the scan is complete
    pub fn is_last(&self) -> bool {
        self.next_cursor == SCAN_START
    }
}

/// External cache store. Every method is a single atomic backend operation.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Read a value
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Write a value that expires after `ttl`
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()>;

    /// Delete keys; absent keys are ignored. Returns how many were removed.
    async fn delete(&self, keys: &[String]) -> CacheResult<u64>;

    /// Increment an integer value, creating it at 1 when absent
    async fn increment(&self, key: &str) -> CacheResult<i64>;

    /// Reset the expiration of an existing key. `false` if the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<bool>;

    /// Remaining lifetime of a key
    async fn ttl_remaining(&self, key: &str) -> CacheResult<KeyTtl>;

    /// List keys starting with `prefix`, one page at a time
    async fn scan_prefix(&self, prefix: &str, cursor: u64, page_size: usize)
        -> CacheResult<ScanPage>;
}

/// Wraps a backend so that no call outlives `limit`
///
/// Adapters may wait on the network for as long as their client allows; the
/// policies need an answer, even a failing one, in bounded time.
pub(crate) struct TimeoutBackend {
    inner: Arc<dyn CacheBackend>,
    limit: Duration,
}

impl TimeoutBackend {
    pub(crate) fn new(inner: Arc<dyn CacheBackend>, limit: Duration) -> Self {
        Self { inner, limit }
    }

    async fn bounded<T>(&self, call: impl Future<Output = CacheResult<T>>) -> CacheResult<T> {
        match tokio::time::timeout(self.limit, call).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Timeout(self.limit)),
        }
    }
}

#[async_trait]
impl CacheBackend for TimeoutBackend {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        self.bounded(self.inner.get(key)).await
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        self.bounded(self.inner.set_with_ttl(key, value, ttl)).await
    }

    async fn delete(&self, keys: &[String]) -> CacheResult<u64> {
        self.bounded(self.inner.delete(keys)).await
    }

    async fn increment(&self, key: &str) -> CacheResult<i64> {
        self.bounded(self.inner.increment(key)).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<bool> {
        self.bounded(self.inner.expire(key, ttl)).await
    }

    async fn ttl_remaining(&self, key: &str) -> CacheResult<KeyTtl> {
        self.bounded(self.inner.ttl_remaining(key)).await
    }

    async fn scan_prefix(
        &self,
        prefix: &str,
        cursor: u64,
        page_size: usize,
    ) -> CacheResult<ScanPage> {
        self.bounded(self.inner.scan_prefix(prefix, cursor, page_size)).await
    }
}
