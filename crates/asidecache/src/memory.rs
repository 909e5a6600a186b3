//! In-process cache backend
//!
//! Mirrors the Redis semantics the policies rely on: lazy expiry on read,
//! INCR keeps the key's deadline, and scans use a stable cursor so a key that
//! lives through a whole scan is always returned.
//!
//! Time comes from `tokio::time::Instant`, so tests can drive expiry with a
//! paused clock. Faults can be injected per operation and per key.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use ahash::RandomState;
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::backend::{CacheBackend, CacheError, CacheResult, KeyTtl, ScanPage, SCAN_START};

/// Backend operation, as targeted by fault injection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendOp {
    /// `get`
    Get,
    /// `set_with_ttl`
    Set,
    /// `delete`
    Delete,
    /// `increment`
    Increment,
    /// `expire`
    Expire,
    /// `ttl_remaining`
    Ttl,
    /// `scan_prefix`
    Scan,
}

/// Misbehaviour of an injected fault
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Fail with `CacheError::Unavailable`
    Fail,
    /// Never answer
    Stall,
}

struct FaultRule {
    op: BackendOp,
    /// `None` targets every key
    key: Option<String>,
    fault: Fault,
}

impl FaultRule {
    fn matches(&self, op: BackendOp, key: Option<&str>) -> bool {
        self.op == op && (self.key.is_none() || self.key.as_deref() == key)
    }
}

struct Slot {
    value: String,
    deadline: Option<Instant>,
    /// Insertion sequence, used as the scan cursor
    seq: u64,
}

impl Slot {
    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.deadline, Some(deadline) if deadline <= now)
    }
}

struct Inner {
    slots: HashMap<String, Slot, RandomState>,
    next_seq: u64,
}

impl Inner {
    fn insert(&mut self, key: &str, value: String, deadline: Option<Instant>) {
        if let Some(slot) = self.slots.get_mut(key) {
            slot.value = value;
            slot.deadline = deadline;
            return;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.slots.insert(
            key.to_string(),
            Slot {
                value,
                deadline,
                seq,
            },
        );
    }

    /// Drop `key` if it has expired; returns the live slot otherwise
    fn live_mut(&mut self, key: &str, now: Instant) -> Option<&mut Slot> {
        if self.slots.get(key).is_some_and(|slot| slot.is_expired(now)) {
            self.slots.remove(key);
        }
        self.slots.get_mut(key)
    }
}

/// Cache backend kept in process memory
pub struct MemoryBackend {
    inner: Mutex<Inner>,
    offline: AtomicBool,
    faults: Mutex<Vec<FaultRule>>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                slots: HashMap::with_hasher(RandomState::new()),
                // Sequence 0 is the scan start/terminal cursor
                next_seq: SCAN_START + 1,
            }),
            offline: AtomicBool::new(false),
            faults: Mutex::new(Vec::new()),
        }
    }

    /// Write a key without any expiration
    pub fn set_persistent(&self, key: &str, value: &str) {
        self.inner.lock().insert(key, value.to_string(), None);
    }

    /// Simulate an outage: while set, every call fails with `CacheError::Unavailable`
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Make every call of `op` misbehave
    pub fn inject(&self, op: BackendOp, fault: Fault) {
        self.faults.lock().push(FaultRule {
            op,
            key: None,
            fault,
        });
    }

    /// Make calls of `op` on `key` misbehave; other keys are unaffected
    pub fn inject_for_key(&self, op: BackendOp, key: &str, fault: Fault) {
        self.faults.lock().push(FaultRule {
            op,
            key: Some(key.to_string()),
            fault,
        });
    }

    /// Remove every injected fault
    pub fn clear_faults(&self) {
        self.faults.lock().clear();
    }

    /// Number of stored keys, including expired keys not yet reaped
    pub fn len(&self) -> usize {
        self.inner.lock().slots.len()
    }

    /// Check if no keys are stored
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn check(&self, op: BackendOp, key: Option<&str>) -> CacheResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable);
        }
        let fault = self
            .faults
            .lock()
            .iter()
            .find(|rule| rule.matches(op, key))
            .map(|rule| rule.fault);
        match fault {
            None => Ok(()),
            Some(Fault::Fail) => Err(CacheError::Unavailable),
            Some(Fault::Stall) => std::future::pending().await,
        }
    }
}

fn deadline_after(now: Instant, ttl: Duration) -> CacheResult<Instant> {
    now.checked_add(ttl).ok_or(CacheError::TtlOutOfRange(ttl))
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        self.check(BackendOp::Get, Some(key)).await?;
        let now = Instant::now();
        let mut inner = self.inner.lock();
        Ok(inner.live_mut(key, now).map(|slot| slot.value.clone()))
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        self.check(BackendOp::Set, Some(key)).await?;
        let deadline = deadline_after(Instant::now(), ttl)?;
        self.inner.lock().insert(key, value.to_string(), Some(deadline));
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> CacheResult<u64> {
        if keys.is_empty() {
            self.check(BackendOp::Delete, None).await?;
        }
        for key in keys {
            self.check(BackendOp::Delete, Some(key.as_str())).await?;
        }
        let mut inner = self.inner.lock();
        let removed = keys
            .iter()
            .filter(|key| inner.slots.remove(key.as_str()).is_some())
            .count();
        Ok(removed as u64)
    }

    async fn increment(&self, key: &str) -> CacheResult<i64> {
        self.check(BackendOp::Increment, Some(key)).await?;
        let now = Instant::now();
        let mut inner = self.inner.lock();

        if let Some(slot) = inner.live_mut(key, now) {
            let current: i64 = slot
                .value
                .parse()
                .map_err(|_| CacheError::Protocol(format!("value at '{}' is not an integer", key)))?;
            let next = current
                .checked_add(1)
                .ok_or_else(|| CacheError::Protocol(format!("increment of '{}' overflows", key)))?;
            slot.value = next.to_string();
            return Ok(next);
        }

        inner.insert(key, "1".to_string(), None);
        Ok(1)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<bool> {
        self.check(BackendOp::Expire, Some(key)).await?;
        let now = Instant::now();
        let deadline = deadline_after(now, ttl)?;
        let mut inner = self.inner.lock();
        match inner.live_mut(key, now) {
            Some(slot) => {
                slot.deadline = Some(deadline);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn ttl_remaining(&self, key: &str) -> CacheResult<KeyTtl> {
        self.check(BackendOp::Ttl, Some(key)).await?;
        let now = Instant::now();
        let inner = self.inner.lock();
        // No lazy reaping here: an expired key still present reports zero
        Ok(match inner.slots.get(key) {
            None => KeyTtl::Absent,
            Some(Slot { deadline: None, .. }) => KeyTtl::NoExpiry,
            Some(Slot {
                deadline: Some(deadline),
                ..
            }) => KeyTtl::Remaining(deadline.saturating_duration_since(now)),
        })
    }

    async fn scan_prefix(
        &self,
        prefix: &str,
        cursor: u64,
        page_size: usize,
    ) -> CacheResult<ScanPage> {
        self.check(BackendOp::Scan, None).await?;
        let from = cursor.max(SCAN_START + 1);
        let inner = self.inner.lock();

        let mut matching: Vec<(u64, &String)> = inner
            .slots
            .iter()
            .filter(|(key, slot)| slot.seq >= from && key.starts_with(prefix))
            .map(|(key, slot)| (slot.seq, key))
            .collect();
        matching.sort_unstable_by_key(|(seq, _)| *seq);

        let page_size = page_size.max(1);
        let next_cursor = if matching.len() > page_size {
            matching[page_size - 1].0 + 1
        } else {
            SCAN_START
        };
        let keys = matching
            .into_iter()
            .take(page_size)
            .map(|(_, key)| key.clone())
            .collect();

        Ok(ScanPage { keys, next_cursor })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(30);

    async fn scan_all(backend: &MemoryBackend, prefix: &str, page_size: usize) -> Vec<String> {
        let mut keys = Vec::new();
        let mut cursor = SCAN_START;
        loop {
            let page = backend.scan_prefix(prefix, cursor, page_size).await.unwrap();
            keys.extend(page.keys.iter().cloned());
            if page.is_last() {
                break;
            }
            cursor = page.next_cursor;
        }
        keys.sort();
        keys
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_get_and_expiry() {
        let backend = MemoryBackend::new();
        backend.set_with_ttl("k", "v", TTL).await.unwrap();
        assert_eq!(backend.get("k").await.unwrap().as_deref(), Some("v"));

        tokio::time::advance(TTL).await;
        assert_eq!(backend.get("k").await.unwrap(), None);
        // Reaped on read
        assert!(backend.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_remaining() {
        let backend = MemoryBackend::new();
        backend.set_with_ttl("k", "v", TTL).await.unwrap();
        backend.set_persistent("p", "v");

        assert_eq!(backend.ttl_remaining("k").await.unwrap(), KeyTtl::Remaining(TTL));
        assert_eq!(backend.ttl_remaining("p").await.unwrap(), KeyTtl::NoExpiry);
        assert_eq!(backend.ttl_remaining("nope").await.unwrap(), KeyTtl::Absent);

        tokio::time::advance(Duration::from_secs(40)).await;
        assert_eq!(
            backend.ttl_remaining("k").await.unwrap(),
            KeyTtl::Remaining(Duration::ZERO)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_increment_keeps_deadline() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.increment("c").await.unwrap(), 1);
        assert_eq!(backend.ttl_remaining("c").await.unwrap(), KeyTtl::NoExpiry);

        backend.set_with_ttl("h", "1", TTL).await.unwrap();
        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(backend.increment("h").await.unwrap(), 2);
        assert_eq!(
            backend.ttl_remaining("h").await.unwrap(),
            KeyTtl::Remaining(Duration::from_secs(20))
        );
    }

    #[tokio::test]
    async fn test_increment_rejects_non_integer() {
        let backend = MemoryBackend::new();
        backend.set_persistent("c", "abc");
        assert!(matches!(
            backend.increment("c").await,
            Err(CacheError::Protocol(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expire() {
        let backend = MemoryBackend::new();
        assert!(!backend.expire("missing", TTL).await.unwrap());

        backend.set_with_ttl("k", "v", Duration::from_secs(5)).await.unwrap();
        assert!(backend.expire("k", TTL).await.unwrap());
        assert_eq!(backend.ttl_remaining("k").await.unwrap(), KeyTtl::Remaining(TTL));
    }

    #[tokio::test]
    async fn test_delete_ignores_absent() {
        let backend = MemoryBackend::new();
        backend.set_persistent("a", "1");

        let removed = backend
            .delete(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(backend.delete(&["a".to_string()]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_scan_prefix_pages() {
        let backend = MemoryBackend::new();
        for i in 0..25 {
            backend.set_persistent(&format!("product:{}", i), "x");
        }
        backend.set_persistent("session:1", "x");

        let keys = scan_all(&backend, "product:", 4).await;
        assert_eq!(keys.len(), 25);
        assert!(keys.iter().all(|k| k.starts_with("product:")));
    }

    #[tokio::test]
    async fn test_scan_survives_deletes_between_pages() {
        let backend = MemoryBackend::new();
        for i in 0..10 {
            backend.set_persistent(&format!("p:{}", i), "x");
        }

        let first = backend.scan_prefix("p:", SCAN_START, 3).await.unwrap();
        assert_eq!(first.keys.len(), 3);
        backend.delete(&first.keys).await.unwrap();

        let mut seen = first.keys.clone();
        let mut cursor = first.next_cursor;
        while cursor != SCAN_START {
            let page = backend.scan_prefix("p:", cursor, 3).await.unwrap();
            seen.extend(page.keys.iter().cloned());
            cursor = page.next_cursor;
        }
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 10);
    }

    #[tokio::test]
    async fn test_offline() {
        let backend = MemoryBackend::new();
        backend.set_offline(true);
        assert!(matches!(backend.get("k").await, Err(CacheError::Unavailable)));
        assert!(matches!(
            backend.set_with_ttl("k", "v", TTL).await,
            Err(CacheError::Unavailable)
        ));
        assert!(matches!(
            backend.scan_prefix("", SCAN_START, 10).await,
            Err(CacheError::Unavailable)
        ));

        backend.set_offline(false);
        assert_eq!(backend.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_faults_target_operation_and_key() {
        let backend = MemoryBackend::new();
        backend.set_persistent("a", "1");
        backend.set_persistent("b", "1");
        backend.inject(BackendOp::Expire, Fault::Fail);
        backend.inject_for_key(BackendOp::Ttl, "b", Fault::Fail);

        assert!(matches!(backend.expire("a", TTL).await, Err(CacheError::Unavailable)));
        assert_eq!(backend.ttl_remaining("a").await.unwrap(), KeyTtl::NoExpiry);
        assert!(matches!(backend.ttl_remaining("b").await, Err(CacheError::Unavailable)));
        assert_eq!(backend.get("b").await.unwrap().as_deref(), Some("1"));

        // A multi-key delete fails as a whole when any key is targeted
        backend.inject_for_key(BackendOp::Delete, "b", Fault::Fail);
        assert!(backend
            .delete(&["a".to_string(), "b".to_string()])
            .await
            .is_err());
        assert_eq!(backend.len(), 2);

        backend.clear_faults();
        assert!(backend.expire("a", TTL).await.unwrap());
        assert_eq!(backend.delete(&["b".to_string()]).await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stall_never_answers() {
        let backend = MemoryBackend::new();
        backend.inject(BackendOp::Scan, Fault::Stall);

        let stalled = tokio::time::timeout(
            Duration::from_secs(60),
            backend.scan_prefix("", SCAN_START, 10),
        )
        .await;
        assert!(stalled.is_err());
        assert_eq!(backend.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_out_of_range_ttl_rejected() {
        let backend = MemoryBackend::new();
        let forever = Duration::from_secs(u64::MAX);

        assert!(matches!(
            backend.set_with_ttl("k", "v", forever).await,
            Err(CacheError::TtlOutOfRange(_))
        ));
        assert!(backend.is_empty());

        backend.set_with_ttl("k", "v", TTL).await.unwrap();
        assert!(matches!(
            backend.expire("k", forever).await,
            Err(CacheError::TtlOutOfRange(_))
        ));
        // The old deadline stays in place
        assert!(matches!(
            backend.ttl_remaining("k").await.unwrap(),
            KeyTtl::Remaining(_)
        ));
    }
}
