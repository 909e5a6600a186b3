//! AsideCache: cache-aside reads and delete-on-write over an authoritative store
//!
//! Reads consult the cache backend first and the store only on a miss. Writes
//! go to the store first, then remove the cached copy. Cache failures,
//! including calls that outlive the backend timeout, are logged and absorbed;
//! only store failures reach the caller.

use std::sync::Arc;

use recordstore::{Record, RecordId, RecordStore};
use tracing::{debug, warn};

use crate::backend::{CacheBackend, TimeoutBackend};
use crate::config::CacheConfig;
use crate::error::{Error, Result};
use crate::stats::CacheStats;
use crate::sweeper::Sweeper;

/// Cache-aside policy engine for one record domain
pub struct AsideCache {
    /// Source of truth
    store: Arc<dyn RecordStore>,

    /// External cache, bounded by `config.backend_timeout`
    backend: Arc<dyn CacheBackend>,

    config: CacheConfig,

    /// Shared with the sweeper
    stats: Arc<CacheStats>,
}

impl AsideCache {
    /// Create the policy engine
    ///
    /// # Returns
    /// * `Err(Error::Config)` if `config` does not validate
    pub fn new(
        store: Arc<dyn RecordStore>,
        backend: Arc<dyn CacheBackend>,
        config: CacheConfig,
    ) -> Result<Self> {
        config.validate()?;
        let backend = Arc::new(TimeoutBackend::new(backend, config.backend_timeout));
        Ok(Self {
            store,
            backend,
            config,
            stats: Arc::new(CacheStats::new()),
        })
    }

    /// Fetch a record, from the cache when possible
    ///
    /// A hit bumps the entry's hit counter and, once the counter reaches the
    /// popularity threshold, renews the lifetime of entry and counter. A miss
    /// (including an unreadable entry or an unreachable cache) reads the store
    /// and fills the cache.
    ///
    /// # Returns
    /// * `Err(Error::NotFound)` if the store has no record for `id`
    /// * `Err(Error::Store)` if the store failed
    pub async fn fetch(&self, id: RecordId) -> Result<Record> {
        let keys = &self.config.keys;
        let entry_key = keys.entry(id);
        let hits_key = keys.hits(id);

        if let Some(record) = self.lookup(id, &entry_key).await {
            self.stats.record_hit();
            self.count_hit(&entry_key, &hits_key).await;
            return Ok(record);
        }

        self.stats.record_miss();
        let record = self
            .store
            .get_by_id(id)
            .await?
            .ok_or(Error::NotFound(id))?;

        self.fill(&entry_key, &hits_key, &record).await;
        Ok(record)
    }

    /// Replace a record and drop its cached copy
    ///
    /// The store write completes before any cache key is deleted. The new value
    /// is not cached here; the next fetch repopulates it.
    ///
    /// # Returns
    /// * `Err(Error::Validation)` if `record.id` is not `id`; nothing is written
    /// * `Err(Error::Store)` if the store failed; the cache is left untouched
    pub async fn update(&self, id: RecordId, record: Record) -> Result<()> {
        if record.id != id {
            return Err(Error::Validation(format!(
                "ID in path and body mismatch ({} != {})",
                id, record.id
            )));
        }

        self.store.replace_by_id(id, record).await?;

        let keys = self.config.keys.all(id);
        match self.backend.delete(&keys).await {
            Ok(removed) => {
                debug!(id, removed, "Invalidated cache keys");
            }
            Err(e) => {
                // The entry still expires within one TTL or at the next sweep
                warn!(id, error = %e, "Cache invalidation failed");
                self.stats.record_cache_error();
            }
        }
        self.stats.record_invalidation();
        Ok(())
    }

    /// Build a sweeper for this domain's key space
    pub fn sweeper(&self) -> Sweeper {
        Sweeper::new(
            Arc::clone(&self.backend),
            &self.config,
            Arc::clone(&self.stats),
        )
    }

    /// Get cache statistics
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Active configuration
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Read and decode the cached entry. Any failure is a miss.
    async fn lookup(&self, id: RecordId, entry_key: &str) -> Option<Record> {
        let raw = match self.backend.get(entry_key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(key = %entry_key, error = %e, "Cache read failed, using store");
                self.stats.record_cache_error();
                return None;
            }
        };

        match serde_json::from_str::<Record>(&raw) {
            Ok(record) if record.id == id => Some(record),
            Ok(record) => {
                warn!(key = %entry_key, found = record.id, "Cached entry holds another id");
                None
            }
            Err(e) => {
                warn!(key = %entry_key, error = %e, "Cached entry is unreadable");
                None
            }
        }
    }

    async fn count_hit(&self, entry_key: &str, hits_key: &str) {
        let hits = match self.backend.increment(hits_key).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!(key = %hits_key, error = %e, "Hit counter increment failed");
                self.stats.record_cache_error();
                return;
            }
        };

        if hits >= self.config.popular_threshold {
            let entry_renewed = self.renew(entry_key).await;
            let counter_renewed = self.renew(hits_key).await;
            if entry_renewed && counter_renewed {
                self.stats.record_refresh();
            }
            debug!(key = %entry_key, hits, "Cache hit, lifetime renewed");
        } else if hits == 1 {
            // The counter had expired on its own; INCR recreated it without a TTL
            self.renew(hits_key).await;
            debug!(key = %entry_key, hits, "Cache hit, counter restarted");
        } else {
            debug!(key = %entry_key, hits, "Cache hit");
        }
    }

    /// Best-effort TTL reset; `true` if the key now has a fresh lifetime
    async fn renew(&self, key: &str) -> bool {
        match self.backend.expire(key, self.config.entry_ttl).await {
            Ok(true) => true,
            Ok(false) => {
                debug!(key = %key, "Key vanished before its TTL could be renewed");
                false
            }
            Err(e) => {
                warn!(key = %key, error = %e, "TTL renewal failed");
                self.stats.record_cache_error();
                false
            }
        }
    }

    async fn fill(&self, entry_key: &str, hits_key: &str, record: &Record) {
        let raw = match serde_json::to_string(record) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key = %entry_key, error = %e, "Record serialization failed");
                return;
            }
        };

        let ttl = self.config.entry_ttl;
        if let Err(e) = self.backend.set_with_ttl(entry_key, &raw, ttl).await {
            warn!(key = %entry_key, error = %e, "Cache fill failed");
            self.stats.record_cache_error();
            return;
        }
        if let Err(e) = self.backend.set_with_ttl(hits_key, "1", ttl).await {
            warn!(key = %hits_key, error = %e, "Hit counter init failed");
            self.stats.record_cache_error();
        }
        self.stats.record_fill();
        debug!(key = %entry_key, ttl_secs = ttl.as_secs(), "Cache filled");
    }
}
