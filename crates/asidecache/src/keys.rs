//! Cache key naming
//!
//! entry key   = `prefix + id`
//! counter key = `prefix + id + suffix`

use recordstore::RecordId;

/// Derives the cache keys for a record domain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    prefix: String,
    hits_suffix: String,
}

impl KeySpace {
    /// Create a key space. `CacheConfig::validate` checks that neither part
    /// is empty and that the suffix cannot be mistaken for id digits.
    pub fn new(prefix: impl Into<String>, hits_suffix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            hits_suffix: hits_suffix.into(),
        }
    }

    /// Key holding the serialized record
    pub fn entry(&self, id: RecordId) -> String {
        format!("{}{}", self.prefix, id)
    }

    /// Key holding the hit counter
    pub fn hits(&self, id: RecordId) -> String {
        format!("{}{}{}", self.prefix, id, self.hits_suffix)
    }

    /// Both keys owned by `id`
    pub fn all(&self, id: RecordId) -> [String; 2] {
        [self.entry(id), self.hits(id)]
    }

    /// Common prefix of every key in this space
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Suffix appended to counter keys
    pub fn hits_suffix(&self) -> &str {
        &self.hits_suffix
    }
}

impl Default for KeySpace {
    fn default() -> Self {
        Self::new("product:", ":hits")
    }
}
