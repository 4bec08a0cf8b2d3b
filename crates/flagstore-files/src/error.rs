//! Error types for loading and watching data files.

use std::path::PathBuf;

use flagstore_core::DataKind;
use thiserror::Error;

/// Errors that reject a whole load attempt.
#[derive(Debug, Error)]
pub enum LoadError {
    /// A file could not be read.
    #[error("unable to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A file is not valid JSON or YAML, or has the wrong shape.
    #[error("unable to parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    /// The same kind and key appear more than once across the loaded files.
    #[error("in {}, {kind} key '{key}' was already defined", path.display())]
    DuplicateKey {
        path: PathBuf,
        kind: DataKind,
        key: String,
    },

    /// An item definition is malformed.
    #[error("in {}, invalid {kind} '{key}': {reason}", path.display())]
    InvalidItem {
        path: PathBuf,
        kind: DataKind,
        key: String,
        reason: String,
    },
}

/// Errors that prevent watching data files for changes.
#[derive(Debug, Error)]
pub enum WatchError {
    /// The platform notification backend failed.
    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),

    /// A watched path could not be resolved to an absolute path.
    #[error("unable to resolve {}: {source}", path.display())]
    Resolve {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A watched path has no containing directory.
    #[error("{} has no parent directory", .0.display())]
    NoParentDirectory(PathBuf),
}

/// Result type for load operations.
pub type Result<T> = std::result::Result<T, LoadError>;
