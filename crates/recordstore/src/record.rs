//! Record type held by the authoritative store

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Record identifier
pub type RecordId = u64;

/// An authoritative record: an immutable identifier plus mutable attributes.
///
/// Serializes flat, so `{"id":1,"name":"Apple","price":100}` is a record with
/// id `1` and two attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Unique identifier, never changed by an update
    pub id: RecordId,

    /// Every other field of the record
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl Record {
    /// Create a record with no attributes
    pub fn new(id: RecordId) -> Self {
        Self {
            id,
            attributes: Map::new(),
        }
    }

    /// Builder-style attribute setter
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Look up a single attribute
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }
}
