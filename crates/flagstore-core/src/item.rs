//! Versioned items: the unit of data held by a store.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A versioned, possibly deleted value stored under a key within a kind.
///
/// Items are immutable. To change an item, derive a new one with
/// [`ItemBuilder::from_item`] and a higher version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    key: String,
    version: u64,
    #[serde(default)]
    deleted: bool,
    #[serde(default)]
    data: Value,
}

impl Item {
    /// Create a live item.
    pub fn new(key: impl Into<String>, version: u64, data: Value) -> Self {
        Self {
            key: key.into(),
            version,
            deleted: false,
            data,
        }
    }

    /// Create a deletion marker. The version is retained so that stale
    /// writes for the same key can still be rejected.
    pub fn tombstone(key: impl Into<String>, version: u64) -> Self {
        Self {
            key: key.into(),
            version,
            deleted: true,
            data: Value::Null,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// The opaque payload. Always `Null` for tombstones.
    pub fn data(&self) -> &Value {
        &self.data
    }

    /// Whether this item may replace a stored item with the given version.
    ///
    /// Equal versions do not supersede.
    pub fn supersedes(&self, stored_version: Option<u64>) -> bool {
        match stored_version {
            Some(stored) => self.version > stored,
            None => true,
        }
    }
}

/// Builder for [`Item`].
#[derive(Debug, Clone)]
pub struct ItemBuilder {
    key: String,
    version: u64,
    deleted: bool,
    data: Value,
}

impl ItemBuilder {
    /// Start a new item at version 1 with an empty object payload.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            version: 1,
            deleted: false,
            data: Value::Object(Default::default()),
        }
    }

    /// Start from a copy of an existing item.
    pub fn from_item(item: &Item) -> Self {
        Self {
            key: item.key.clone(),
            version: item.version,
            deleted: item.deleted,
            data: item.data.clone(),
        }
    }

    pub fn version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    pub fn deleted(mut self, deleted: bool) -> Self {
        self.deleted = deleted;
        self
    }

    pub fn data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    pub fn build(self) -> Item {
        if self.deleted {
            Item::tombstone(self.key, self.version)
        } else {
            Item::new(self.key, self.version, self.data)
        }
    }
}
