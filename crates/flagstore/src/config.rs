//! Store configuration and construction.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use flagstore_store::{
    CacheConfig, CachingStore, FeatureStore, MemoryDatabase, MemoryStore, SqliteStore,
};

use crate::error::Result;

/// Which physical backend a store uses.
#[derive(Clone)]
pub enum BackendConfig {
    /// A shared in-process database. Stores opened on the same database
    /// with the same prefix see the same data.
    Memory(Arc<MemoryDatabase>),
    /// A SQLite database file, shareable across processes.
    Sqlite(PathBuf),
    /// A private in-memory SQLite database.
    SqliteInMemory,
}

impl fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendConfig::Memory(_) => f.write_str("Memory"),
            BackendConfig::Sqlite(path) => f.debug_tuple("Sqlite").field(path).finish(),
            BackendConfig::SqliteInMemory => f.write_str("SqliteInMemory"),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::Memory(MemoryDatabase::new())
    }
}

/// Configuration for [`open_store`].
#[derive(Debug, Clone, Default)]
pub struct StoreConfig {
    pub backend: BackendConfig,
    /// Namespace for this store's keys. `None` or empty uses the default.
    pub prefix: Option<String>,
    pub cache: CacheConfig,
}

impl StoreConfig {
    pub fn new(backend: BackendConfig) -> Self {
        Self {
            backend,
            ..Self::default()
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }
}

/// Open the configured backend, wrapped in a cache unless caching is disabled.
pub fn open_store(config: StoreConfig) -> Result<Arc<dyn FeatureStore>> {
    let prefix = config.prefix.as_deref();
    let store: Arc<dyn FeatureStore> = match config.backend {
        BackendConfig::Memory(db) => Arc::new(MemoryStore::open(db, prefix)),
        BackendConfig::Sqlite(path) => {
            tracing::debug!(path = %path.display(), "opening sqlite flag store");
            Arc::new(SqliteStore::open(&path, prefix)?)
        }
        BackendConfig::SqliteInMemory => {
            if prefix.is_some() {
                tracing::warn!("prefix has no effect on a private in-memory sqlite store");
            }
            Arc::new(SqliteStore::open_memory()?)
        }
    };

    if config.cache.is_enabled() {
        Ok(Arc::new(CachingStore::new(store, config.cache)))
    } else {
        Ok(store)
    }
}
