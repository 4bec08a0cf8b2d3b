//! Error types for the core data model.

use thiserror::Error;

use crate::kind::DataKind;

/// Errors raised while assembling items and data sets.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("item key must not be empty")]
    EmptyKey,

    #[error("unknown data kind namespace: {0}")]
    UnknownNamespace(String),

    #[error("duplicate {kind} key '{key}'")]
    DuplicateKey { kind: DataKind, key: String },
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
