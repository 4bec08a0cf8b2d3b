//! Test fixtures and helpers.
//!
//! Common item shapes used across store and data source tests.

use flagstore_core::{DataBuilder, FullDataSet, Item, FEATURES, SEGMENTS};
use serde_json::json;

/// A boolean flag at `version`.
pub fn flag(key: &str, version: u64) -> Item {
    Item::new(
        key,
        version,
        json!({
            "key": key,
            "version": version,
            "on": true,
            "variations": [true, false],
            "fallthrough": { "variation": 0 },
        }),
    )
}

/// A segment at `version` including the given users.
pub fn segment(key: &str, version: u64, included: &[&str]) -> Item {
    Item::new(
        key,
        version,
        json!({ "key": key, "version": version, "included": included }),
    )
}

/// A small data set with two flags and one segment, all at version 1.
pub fn sample_data() -> FullDataSet {
    DataBuilder::new()
        .add(FEATURES, flag("flag-a", 1))
        .add(FEATURES, flag("flag-b", 1))
        .add(SEGMENTS, segment("segment-a", 1, &["alice"]))
        .build()
}
