//! FeatureStore trait: the abstract interface for versioned item persistence.
//!
//! Implementations include SQLite (shared across processes), in-memory
//! (shared across handles in one process), and the caching decorator that
//! wraps either.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use flagstore_core::{DataKind, FullDataSet, Item};

use crate::error::Result;

/// Outcome of a conditional write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertResult {
    /// The item was written.
    Applied,
    /// A version greater than or equal to the item's was already stored.
    /// The stored item is unchanged; re-read to observe it.
    Superseded,
}

impl UpsertResult {
    pub fn is_applied(&self) -> bool {
        matches!(self, UpsertResult::Applied)
    }
}

/// Callback run inside `upsert` between reading the stored version and the
/// conditional write. Used by tests to inject a competing writer.
pub type UpdateHook = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// The FeatureStore trait: async interface for versioned item persistence.
///
/// # Design Notes
///
/// - **Conditional writes**: `upsert` only replaces a stored item whose
///   version is strictly lower. The comparison happens atomically in the
///   backend, so concurrent writers from any number of handles converge on
///   the highest version regardless of arrival order.
/// - **Tombstones**: deleted items are kept with their version so a stale
///   write cannot resurrect them. They are invisible to `get` and `all`.
/// - **Initialization**: once any handle sharing a backend and prefix has run
///   `init`, every handle reports `initialized() == true`.
#[async_trait]
pub trait FeatureStore: Send + Sync {
    /// Replace all data for every kind in `data`, then mark the store initialized.
    async fn init(&self, data: FullDataSet) -> Result<()>;

    /// Get a live item. Absent and deleted items both return `None`.
    async fn get(&self, kind: DataKind, key: &str) -> Result<Option<Item>>;

    /// All live items of a kind, keyed by item key.
    async fn all(&self, kind: DataKind) -> Result<HashMap<String, Item>>;

    /// Write `item` if its version is greater than the stored version.
    ///
    /// Deletions are upserts of a tombstone.
    async fn upsert(&self, kind: DataKind, item: Item) -> Result<UpsertResult>;

    /// Whether `init` has completed against the shared backend.
    async fn initialized(&self) -> Result<bool>;

    /// Release backend resources. Later calls return `StoreError::Closed`.
    async fn close(&self) -> Result<()>;
}

#[async_trait]
impl<S: FeatureStore + ?Sized> FeatureStore for Arc<S> {
    async fn init(&self, data: FullDataSet) -> Result<()> {
        (**self).init(data).await
    }

    async fn get(&self, kind: DataKind, key: &str) -> Result<Option<Item>> {
        (**self).get(kind, key).await
    }

    async fn all(&self, kind: DataKind) -> Result<HashMap<String, Item>> {
        (**self).all(kind).await
    }

    async fn upsert(&self, kind: DataKind, item: Item) -> Result<UpsertResult> {
        (**self).upsert(kind, item).await
    }

    async fn initialized(&self) -> Result<bool> {
        (**self).initialized().await
    }

    async fn close(&self) -> Result<()> {
        (**self).close().await
    }
}

/// Extension methods built on the core trait.
pub trait FeatureStoreExt: FeatureStore {
    /// Mark `key` deleted at `version`.
    fn delete(
        &self,
        kind: DataKind,
        key: &str,
        version: u64,
    ) -> impl Future<Output = Result<UpsertResult>> + Send;
}

impl<S: FeatureStore + ?Sized> FeatureStoreExt for S {
    async fn delete(&self, kind: DataKind, key: &str, version: u64) -> Result<UpsertResult> {
        self.upsert(kind, Item::tombstone(key, version)).await
    }
}
