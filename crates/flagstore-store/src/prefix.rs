//! Key namespacing, so several logical stores can share one backend.
//!
//! Every persisted key is derived from `prefix + kind namespace + item key`.
//! Stores with different prefixes never see each other's items or
//! initialization state.

use flagstore_core::DataKind;

/// Prefix used when none (or an empty one) is configured.
pub const DEFAULT_PREFIX: &str = "flagstore";

const SEPARATOR: char = ':';
const INIT_MARKER: &str = "$inited";

/// A validated key prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyPrefix(String);

impl KeyPrefix {
    /// Build a prefix. `None` or an empty string selects [`DEFAULT_PREFIX`].
    pub fn new(prefix: Option<&str>) -> Self {
        match prefix {
            Some(p) if !p.is_empty() => Self(p.to_string()),
            _ => Self(DEFAULT_PREFIX.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The scope holding all items of `kind` under this prefix.
    pub fn scope(&self, kind: DataKind) -> String {
        format!("{}{}{}", self.0, SEPARATOR, kind.namespace())
    }

    /// The fully qualified key of one item.
    pub fn item_key(&self, kind: DataKind, key: &str) -> String {
        format!("{}{}{}", self.scope(kind), SEPARATOR, key)
    }

    /// The key recording that this prefix has been initialized.
    pub fn init_marker(&self) -> String {
        format!("{}{}{}", self.0, SEPARATOR, INIT_MARKER)
    }
}

impl Default for KeyPrefix {
    fn default() -> Self {
        Self::new(None)
    }
}
