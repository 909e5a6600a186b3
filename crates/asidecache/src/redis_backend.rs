//! Redis cache backend
//!
//! Thin adapter over a multiplexed `ConnectionManager`; reconnects are handled
//! by the manager, which also bounds connects and replies by a timeout. Times
//! are sent in milliseconds (`PX`, `PEXPIRE`, `PTTL`).

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::AsyncCommands;
use tracing::info;

use crate::backend::{CacheBackend, CacheError, CacheResult, KeyTtl, ScanPage};

/// Cache backend talking to a Redis server
#[derive(Clone)]
pub struct RedisBackend {
    conn: ConnectionManager,
}

impl RedisBackend {
    /// Connect to `url` (`redis://host:port[/db]`) and verify with `PING`
    ///
    /// `timeout` bounds both establishing a connection and waiting for any
    /// single reply; a stalled server yields an error instead of a hang.
    pub async fn connect(url: &str, timeout: Duration) -> CacheResult<Self> {
        let client = redis::Client::open(url)?;
        let config = ConnectionManagerConfig::new()
            .set_connection_timeout(timeout)
            .set_response_timeout(timeout);
        let conn = client.get_connection_manager_with_config(config).await?;
        let backend = Self { conn };
        backend.ping().await?;
        info!(url = %url, timeout_ms = timeout.as_millis() as u64, "Connected to Redis");
        Ok(backend)
    }

    /// Round-trip a `PING`
    pub async fn ping(&self) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        let reply: String = redis::cmd("PING").query_async(&mut conn).await?;
        if reply != "PONG" {
            return Err(CacheError::Protocol(format!("PING answered '{}'", reply)));
        }
        Ok(())
    }
}

/// Build a `SCAN MATCH` pattern that matches `prefix` literally
pub(crate) fn prefix_pattern(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('*');
    pattern
}

fn millis(ttl: Duration) -> CacheResult<i64> {
    // Redis rejects a zero expiry
    i64::try_from(ttl.as_millis())
        .map(|ms| ms.max(1))
        .map_err(|_| CacheError::TtlOutOfRange(ttl))
}

#[async_trait]
impl CacheBackend for RedisBackend {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(millis(ttl)?)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> CacheResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.clone();
        let removed: u64 = conn.del(keys).await?;
        Ok(removed)
    }

    async fn increment(&self, key: &str) -> CacheResult<i64> {
        let mut conn = self.conn.clone();
        let value: i64 = conn.incr(key, 1).await?;
        Ok(value)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<bool> {
        let mut conn = self.conn.clone();
        let applied: i64 = redis::cmd("PEXPIRE")
            .arg(key)
            .arg(millis(ttl)?)
            .query_async(&mut conn)
            .await?;
        Ok(applied == 1)
    }

    async fn ttl_remaining(&self, key: &str) -> CacheResult<KeyTtl> {
        let mut conn = self.conn.clone();
        let ms: i64 = conn.pttl(key).await?;
        Ok(match ms {
            -2 => KeyTtl::Absent,
            -1 => KeyTtl::NoExpiry,
            ms if ms >= 0 => KeyTtl::Remaining(Duration::from_millis(ms as u64)),
            other => {
                return Err(CacheError::Protocol(format!("PTTL answered {}", other)));
            }
        })
    }

    async fn scan_prefix(
        &self,
        prefix: &str,
        cursor: u64,
        page_size: usize,
    ) -> CacheResult<ScanPage> {
        let mut conn = self.conn.clone();
        let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(prefix_pattern(prefix))
            .arg("COUNT")
            .arg(page_size.max(1))
            .query_async(&mut conn)
            .await?;
        Ok(ScanPage { keys, next_cursor })
    }
}
