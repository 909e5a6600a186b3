//! Policy configuration

use std::time::Duration;

use crate::error::{Error, Result};
use crate::keys::KeySpace;

/// Longest accepted entry TTL
pub const MAX_ENTRY_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Longest accepted time between sweeper passes
pub const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Longest accepted wait for a single cache backend call
pub const MAX_BACKEND_TIMEOUT: Duration = Duration::from_secs(60);

/// Tunables shared by the read policy, the invalidation policy and the sweeper
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Lifetime given to entries and counters on fill and on refresh
    pub entry_ttl: Duration,
    /// Hit count at which a hit refreshes the entry's lifetime
    pub popular_threshold: i64,
    /// Time between two sweeper passes
    pub sweep_interval: Duration,
    /// Keys requested per scan call
    pub scan_page_size: usize,
    /// Longest wait for one cache backend call before it counts as failed
    pub backend_timeout: Duration,
    /// Key naming
    pub keys: KeySpace,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            entry_ttl: Duration::from_secs(30),
            popular_threshold: 2,
            sweep_interval: Duration::from_secs(10),
            scan_page_size: 100,
            backend_timeout: Duration::from_secs(3),
            keys: KeySpace::default(),
        }
    }
}

impl CacheConfig {
    /// Create a config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the entry TTL
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.entry_ttl = ttl;
        self
    }

    /// Set the popularity threshold
    pub fn with_popular_threshold(mut self, threshold: i64) -> Self {
        self.popular_threshold = threshold;
        self
    }

    /// Set the sweep interval
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Set the scan page size
    pub fn with_scan_page_size(mut self, size: usize) -> Self {
        self.scan_page_size = size;
        self
    }

    /// Set the per-call backend timeout
    pub fn with_backend_timeout(mut self, timeout: Duration) -> Self {
        self.backend_timeout = timeout;
        self
    }

    /// Set the key space
    pub fn with_keys(mut self, keys: KeySpace) -> Self {
        self.keys = keys;
        self
    }

    /// Reject values the policies cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.entry_ttl.is_zero() {
            return Err(Error::Config("entry TTL must be positive".to_string()));
        }
        if self.entry_ttl > MAX_ENTRY_TTL {
            return Err(Error::Config(format!(
                "entry TTL must not exceed {}s",
                MAX_ENTRY_TTL.as_secs()
            )));
        }
        if self.popular_threshold < 1 {
            return Err(Error::Config("popular threshold must be at least 1".to_string()));
        }
        if self.sweep_interval.is_zero() {
            return Err(Error::Config("sweep interval must be positive".to_string()));
        }
        if self.sweep_interval > MAX_SWEEP_INTERVAL {
            return Err(Error::Config(format!(
                "sweep interval must not exceed {}s",
                MAX_SWEEP_INTERVAL.as_secs()
            )));
        }
        if self.backend_timeout.is_zero() || self.backend_timeout > MAX_BACKEND_TIMEOUT {
            return Err(Error::Config(format!(
                "backend timeout must be positive and at most {}s",
                MAX_BACKEND_TIMEOUT.as_secs()
            )));
        }
        if self.scan_page_size == 0 {
            return Err(Error::Config("scan page size must be positive".to_string()));
        }
        if self.keys.prefix().is_empty() {
            return Err(Error::Config("key prefix must not be empty".to_string()));
        }
        match self.keys.hits_suffix().chars().next() {
            None => Err(Error::Config("hit counter suffix must not be empty".to_string())),
            Some(c) if c.is_ascii_digit() => Err(Error::Config(
                "hit counter suffix must not start with a digit".to_string(),
            )),
            Some(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = CacheConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.entry_ttl, Duration::from_secs(30));
        assert_eq!(config.popular_threshold, 2);
        assert_eq!(config.sweep_interval, Duration::from_secs(10));
        assert_eq!(config.scan_page_size, 100);
        assert_eq!(config.backend_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_rejects_bad_values() {
        let bad = [
            CacheConfig::new().with_ttl(Duration::ZERO),
            CacheConfig::new().with_popular_threshold(0),
            CacheConfig::new().with_sweep_interval(Duration::ZERO),
            CacheConfig::new().with_scan_page_size(0),
            CacheConfig::new().with_backend_timeout(Duration::ZERO),
            CacheConfig::new().with_keys(KeySpace::new("", ":hits")),
            CacheConfig::new().with_keys(KeySpace::new("product:", "")),
            CacheConfig::new().with_keys(KeySpace::new("product:", "9hits")),
        ];
        for config in bad {
            assert!(matches!(config.validate(), Err(Error::Config(_))), "{:?}", config);
        }
    }

    #[test]
    fn test_rejects_durations_past_ceiling() {
        let forever = Duration::from_secs(u64::MAX);
        let bad = [
            CacheConfig::new().with_ttl(forever),
            CacheConfig::new().with_ttl(MAX_ENTRY_TTL + Duration::from_secs(1)),
            CacheConfig::new().with_sweep_interval(forever),
            CacheConfig::new().with_backend_timeout(forever),
        ];
        for config in bad {
            assert!(matches!(config.validate(), Err(Error::Config(_))), "{:?}", config);
        }

        let edge = CacheConfig::new()
            .with_ttl(MAX_ENTRY_TTL)
            .with_sweep_interval(MAX_SWEEP_INTERVAL)
            .with_backend_timeout(MAX_BACKEND_TIMEOUT);
        assert!(edge.validate().is_ok());
    }
}
