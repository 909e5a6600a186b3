//! In-memory store adapter
//!
//! The whole collection sits behind one reader/writer lock: readers share it,
//! a replace holds it exclusively. The lock is never held across an await.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use ahash::RandomState;
use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::{Error, Result};
use crate::record::{Record, RecordId};
use crate::store::RecordStore;

/// MemoryStore keeps records in a process-local map
#[derive(Debug, Default)]
pub struct MemoryStore {
    /// id -> record
    records: RwLock<HashMap<RecordId, Record, RandomState>>,

    /// Simulated outage flag
    unavailable: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with `records`
    ///
    /// # Returns
    /// * `Err(Error::DuplicateId)` if two records share an id
    pub fn with_records<I>(records: I) -> Result<Self>
    where
        I: IntoIterator<Item = Record>,
    {
        let mut map = HashMap::with_hasher(RandomState::new());
        for record in records {
            let id = record.id;
            if map.insert(id, record).is_some() {
                return Err(Error::DuplicateId(id));
            }
        }

        Ok(Self {
            records: RwLock::new(map),
            unavailable: AtomicBool::new(false),
        })
    }

    /// Load a store from a file holding a JSON array of records
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read(path)?;
        let records: Vec<Record> = serde_json::from_slice(&raw)?;
        Self::with_records(records)
    }

    /// Simulate an outage: while set, every call fails with `Error::Unavailable`
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::Unavailable("memory store offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn get_by_id(&self, id: RecordId) -> Result<Option<Record>> {
        self.check_available()?;
        Ok(self.records.read().get(&id).cloned())
    }

    async fn replace_by_id(&self, id: RecordId, record: Record) -> Result<()> {
        self.check_available()?;
        // The key is authoritative for the identifier
        let record = Record { id, ..record };
        self.records.write().insert(id, record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use std::sync::Arc;
    use tempfile::NamedTempFile;

    fn apple() -> Record {
        Record::new(1)
            .with_attribute("name", "Apple")
            .with_attribute("price", 100)
    }

    #[tokio::test]
    async fn test_get_and_replace() {
        let store = MemoryStore::with_records([apple()]).unwrap();

        let found = store.get_by_id(1).await.unwrap();
        assert_eq!(found, Some(apple()));

        let updated = apple().with_attribute("price", 120);
        store.replace_by_id(1, updated.clone()).await.unwrap();
        assert_eq!(store.get_by_id(1).await.unwrap(), Some(updated));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_get_not_found() {
        let store = MemoryStore::new();
        assert!(store.is_empty());
        assert_eq!(store.get_by_id(42).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_replace_inserts_missing_id() {
        let store = MemoryStore::new();
        store.replace_by_id(7, Record::new(7)).await.unwrap();
        assert_eq!(store.get_by_id(7).await.unwrap(), Some(Record::new(7)));
    }

    #[tokio::test]
    async fn test_replace_keeps_key_id() {
        let store = MemoryStore::with_records([apple()]).unwrap();

        let mut other = apple();
        other.id = 99;
        store.replace_by_id(1, other).await.unwrap();

        assert_eq!(store.get_by_id(1).await.unwrap().unwrap().id, 1);
        assert_eq!(store.get_by_id(99).await.unwrap(), None);
    }

    #[test]
    fn test_duplicate_seed_rejected() {
        let result = MemoryStore::with_records([apple(), apple()]);
        assert!(matches!(result, Err(Error::DuplicateId(1))));
    }

    #[tokio::test]
    async fn test_unavailable() {
        let store = MemoryStore::with_records([apple()]).unwrap();
        store.set_unavailable(true);

        assert!(matches!(store.get_by_id(1).await, Err(Error::Unavailable(_))));
        assert!(matches!(
            store.replace_by_id(1, apple()).await,
            Err(Error::Unavailable(_))
        ));

        store.set_unavailable(false);
        assert!(store.get_by_id(1).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_load_json() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            "{}",
            json!([
                {"id": 1, "name": "Apple", "price": 100},
                {"id": 2, "name": "Banana", "price": 50}
            ])
        )
        .unwrap();

        let store = MemoryStore::load_json(file.path()).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.get_by_id(1).await.unwrap(), Some(apple()));
    }

    #[test]
    fn test_load_json_invalid() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(MemoryStore::load_json(file.path()), Err(Error::Parse(_))));

        let missing = MemoryStore::load_json("/nonexistent/records.json");
        assert!(matches!(missing, Err(Error::Io(_))));
    }

    #[tokio::test]
    async fn test_concurrent_readers_and_writer() {
        let store = Arc::new(MemoryStore::with_records([apple()]).unwrap());

        let mut tasks = Vec::new();
        for i in 0..16 {
            let store = Arc::clone(&store);
            tasks.push(tokio::spawn(async move {
                if i % 4 == 0 {
                    let record = apple().with_attribute("price", 100 + i);
                    store.replace_by_id(1, record).await.unwrap();
                } else {
                    let record = store.get_by_id(1).await.unwrap().unwrap();
                    // Never half-applied: both attributes are always present
                    assert_eq!(record.attribute("name"), Some(&json!("Apple")));
                    assert!(record.attribute("price").is_some());
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
    }
}
