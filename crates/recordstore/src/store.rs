//! Store interface consumed by the cache-aside policies

use async_trait::async_trait;

use crate::error::Result;
use crate::record::{Record, RecordId};

/// Authoritative source of truth for records.
///
/// Every call is a potential network round-trip. Implementations must not
/// expose a partially applied replace to concurrent readers.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch a record by id. `Ok(None)` means the id is not in the store.
    async fn get_by_id(&self, id: RecordId) -> Result<Option<Record>>;

    /// Insert or replace the record stored under `id`.
    async fn replace_by_id(&self, id: RecordId, record: Record) -> Result<()>;
}
