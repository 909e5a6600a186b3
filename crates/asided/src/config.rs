//! Command line and environment configuration

use std::path::PathBuf;
use std::time::Duration;

use asidecache::{CacheConfig, KeySpace};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// HTTP bind address
    #[arg(short, long, env = "BIND_ADDR", default_value = "0.0.0.0:8080")]
    pub bind: String,

    /// Redis address, `host:port` or a `redis://` URL
    #[arg(short, long, env = "REDIS_ADDR", default_value = "localhost:6379")]
    pub redis_addr: String,

    /// Keep the cache in process memory instead of Redis
    #[arg(long)]
    pub in_memory_cache: bool,

    /// Lifetime of cache entries, in seconds
    #[arg(long, env = "ENTRY_TTL_SECS", default_value_t = 30)]
    pub entry_ttl_secs: u64,

    /// Hits after which a hit renews an entry's lifetime
    #[arg(long, env = "POPULAR_THRESHOLD", default_value_t = 2)]
    pub popular_threshold: i64,

    /// Seconds between stale-key sweeps
    #[arg(long, env = "SWEEP_INTERVAL_SECS", default_value_t = 10)]
    pub sweep_interval_secs: u64,

    /// Keys requested per SCAN call
    #[arg(long, env = "SCAN_PAGE_SIZE", default_value_t = 100)]
    pub scan_page_size: usize,

    /// Longest wait for one cache call before reads fall back to the store, in milliseconds
    #[arg(long, env = "CACHE_TIMEOUT_MS", default_value_t = 3000)]
    pub cache_timeout_ms: u64,

    /// Prefix of every cache key
    #[arg(long, env = "KEY_PREFIX", default_value = "product:")]
    pub key_prefix: String,

    /// JSON array of records to load into the store
    #[arg(short, long, env = "SEED_FILE")]
    pub seed: Option<PathBuf>,

    /// Health check mode (for Docker)
    #[arg(long)]
    pub health: bool,
}

impl Args {
    /// Redis connection URL
    pub fn redis_url(&self) -> String {
        if self.redis_addr.contains("://") {
            self.redis_addr.clone()
        } else {
            format!("redis://{}", self.redis_addr)
        }
    }

    /// Bound on a single cache backend call
    pub fn cache_timeout(&self) -> Duration {
        Duration::from_millis(self.cache_timeout_ms)
    }

    /// Policy configuration; validated by `AsideCache::new`
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::new()
            .with_ttl(Duration::from_secs(self.entry_ttl_secs))
            .with_popular_threshold(self.popular_threshold)
            .with_sweep_interval(Duration::from_secs(self.sweep_interval_secs))
            .with_scan_page_size(self.scan_page_size)
            .with_backend_timeout(self.cache_timeout())
            .with_keys(KeySpace::new(self.key_prefix.clone(), ":hits"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["asided"]);
        assert_eq!(args.bind, "0.0.0.0:8080");
        assert_eq!(args.redis_url(), "redis://localhost:6379");
        assert!(!args.in_memory_cache);

        let config = args.cache_config();
        assert!(config.validate().is_ok());
        assert_eq!(config.entry_ttl, Duration::from_secs(30));
        assert_eq!(config.popular_threshold, 2);
        assert_eq!(config.sweep_interval, Duration::from_secs(10));
        assert_eq!(config.backend_timeout, Duration::from_secs(3));
        assert_eq!(config.keys.entry(1), "product:1");
    }

    #[test]
    fn test_flags() {
        let args = Args::parse_from([
            "asided",
            "--redis-addr",
            "redis://cache:6380/2",
            "--entry-ttl-secs",
            "60",
            "--popular-threshold",
            "5",
            "--key-prefix",
            "item:",
            "--cache-timeout-ms",
            "250",
            "--in-memory-cache",
        ]);
        assert_eq!(args.redis_url(), "redis://cache:6380/2");
        assert!(args.in_memory_cache);

        let config = args.cache_config();
        assert_eq!(config.entry_ttl, Duration::from_secs(60));
        assert_eq!(config.popular_threshold, 5);
        assert_eq!(config.keys.hits(4), "item:4:hits");
        assert_eq!(config.backend_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_out_of_range_flags_fail_validation() {
        let max = u64::MAX.to_string();
        for flag in ["--entry-ttl-secs", "--sweep-interval-secs", "--cache-timeout-ms"] {
            let args = Args::parse_from(["asided", flag, max.as_str()]);
            assert!(args.cache_config().validate().is_err(), "{}", flag);
        }

        let args = Args::parse_from(["asided", "--cache-timeout-ms", "0"]);
        assert!(args.cache_config().validate().is_err());
    }
}
