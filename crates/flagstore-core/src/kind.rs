//! Data kinds: the static partitions of the store.
//!
//! Kinds are defined at compile time and never created at runtime. The
//! namespace string is stable and participates in key derivation, so it must
//! never change for an existing kind.

use std::fmt;

use crate::error::{CoreError, Result};

/// Descriptor for one logical collection of items.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DataKind {
    namespace: &'static str,
    stream_path: &'static str,
}

impl DataKind {
    const fn new(namespace: &'static str, stream_path: &'static str) -> Self {
        Self {
            namespace,
            stream_path,
        }
    }

    /// The stable namespace used when deriving storage keys.
    pub const fn namespace(&self) -> &'static str {
        self.namespace
    }

    /// Path prefix under which a streaming producer addresses items of this kind.
    pub const fn stream_path(&self) -> &'static str {
        self.stream_path
    }

    /// Look up a kind by its namespace.
    pub fn from_namespace(namespace: &str) -> Result<Self> {
        ALL_KINDS
            .iter()
            .copied()
            .find(|k| k.namespace == namespace)
            .ok_or_else(|| CoreError::UnknownNamespace(namespace.to_string()))
    }
}

impl fmt::Debug for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DataKind({})", self.namespace)
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.namespace)
    }
}

/// Feature flags.
pub const FEATURES: DataKind = DataKind::new("features", "/flags/");

/// User segments referenced by flag rules.
pub const SEGMENTS: DataKind = DataKind::new("segments", "/segments/");

/// Every kind known to this build, in initialization order.
pub const ALL_KINDS: [DataKind; 2] = [FEATURES, SEGMENTS];
