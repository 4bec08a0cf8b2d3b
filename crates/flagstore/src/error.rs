//! Error types for flagstore.

use flagstore_core::CoreError;
use flagstore_files::{LoadError, WatchError};
use flagstore_store::StoreError;
use thiserror::Error;

/// Errors from any flagstore component.
#[derive(Debug, Error)]
pub enum FlagstoreError {
    /// Invalid item or data set.
    #[error("data error: {0}")]
    Core(#[from] CoreError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Data file could not be loaded.
    #[error("load error: {0}")]
    Load(#[from] LoadError),

    /// Data files could not be watched.
    #[error("watch error: {0}")]
    Watch(#[from] WatchError),
}

/// Result type for flagstore operations.
pub type Result<T> = std::result::Result<T, FlagstoreError>;
