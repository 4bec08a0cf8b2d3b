//! Data file parsing.
//!
//! A data file is a JSON or YAML document with up to three top-level maps:
//!
//! ```yaml
//! flags:          # key -> full flag definition
//!   checkout: { on: true, variations: [true, false], fallthrough: { variation: 0 } }
//! flagValues:     # key -> value served to everyone
//!   banner-text: "hello"
//! segments:       # key -> segment definition
//!   beta-users: { included: [alice, bob] }
//! ```
//!
//! Files ending in `.yaml` or `.yml` are read as YAML, all others as JSON.

use std::collections::BTreeMap;
use std::path::Path;

use flagstore_core::{DataKind, Item, ItemBuilder, FEATURES, SEGMENTS};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::error::{LoadError, Result};

/// Version given to items whose definition has no `version` field.
pub const DEFAULT_ITEM_VERSION: u64 = 1;

/// The raw top-level structure of one data file.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FileData {
    #[serde(default)]
    pub flags: BTreeMap<String, Value>,
    #[serde(default)]
    pub flag_values: BTreeMap<String, Value>,
    #[serde(default)]
    pub segments: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Json,
    Yaml,
}

impl Format {
    fn of(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
                Format::Yaml
            }
            _ => Format::Json,
        }
    }
}

/// Parse the contents of `path`.
pub fn parse_file(path: &Path, content: &str) -> Result<FileData> {
    let parsed = match Format::of(path) {
        Format::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
        Format::Yaml => serde_yaml::from_str(content).map_err(|e| e.to_string()),
    };
    parsed.map_err(|message| LoadError::Parse {
        path: path.to_path_buf(),
        message,
    })
}

/// Convert parsed file data into items, in file order: flags, flag values, segments.
pub fn into_items(path: &Path, data: FileData) -> Result<Vec<(DataKind, Item)>> {
    let capacity = data.flags.len() + data.flag_values.len() + data.segments.len();
    let mut items = Vec::with_capacity(capacity);

    for (key, value) in data.flags {
        items.push((FEATURES, item_from_value(path, FEATURES, key, value)?));
    }
    for (key, value) in data.flag_values {
        let flag = flag_with_value(&key, value);
        items.push((FEATURES, item_from_value(path, FEATURES, key, flag)?));
    }
    for (key, value) in data.segments {
        items.push((SEGMENTS, item_from_value(path, SEGMENTS, key, value)?));
    }

    Ok(items)
}

/// Expand a bare value into a flag that serves it unconditionally.
pub fn flag_with_value(key: &str, value: Value) -> Value {
    json!({
        "key": key,
        "on": true,
        "variations": [value],
        "fallthrough": { "variation": 0 },
    })
}

fn item_from_value(path: &Path, kind: DataKind, key: String, value: Value) -> Result<Item> {
    let invalid = |key: &str, reason: &str| LoadError::InvalidItem {
        path: path.to_path_buf(),
        kind,
        key: key.to_string(),
        reason: reason.to_string(),
    };

    let mut object: Map<String, Value> = match value {
        Value::Object(object) => object,
        _ => return Err(invalid(&key, "definition must be an object")),
    };

    match object.get("key").map(|v| v.as_str() == Some(key.as_str())) {
        None => {
            object.insert("key".to_string(), Value::String(key.clone()));
        }
        Some(true) => {}
        Some(false) => return Err(invalid(&key, "\"key\" field does not match its map key")),
    }

    let version = match object.get("version") {
        None => DEFAULT_ITEM_VERSION,
        Some(v) => v
            .as_u64()
            .ok_or_else(|| invalid(&key, "\"version\" must be a non-negative integer"))?,
    };
    let deleted = match object.get("deleted") {
        None => false,
        Some(v) => v
            .as_bool()
            .ok_or_else(|| invalid(&key, "\"deleted\" must be a boolean"))?,
    };

    Ok(ItemBuilder::new(key)
        .version(version)
        .deleted(deleted)
        .data(Value::Object(object))
        .build())
}
