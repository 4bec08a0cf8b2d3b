//! Proptest generators for property-based testing.

use proptest::prelude::*;

use flagstore_core::{DataBuilder, DataKind, FullDataSet, Item, ItemBuilder, ALL_KINDS};
use serde_json::json;

/// Generate one of the known data kinds.
pub fn data_kind() -> impl Strategy<Value = DataKind> {
    prop::sample::select(ALL_KINDS.to_vec())
}

/// Generate an item key.
pub fn item_key() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9-]{0,15}".prop_map(String::from)
}

/// Generate a version representable by every backend.
pub fn version() -> impl Strategy<Value = u64> {
    0u64..=i64::MAX as u64
}

/// Generate a live item or a tombstone with the given key.
pub fn item_with_key(key: String) -> impl Strategy<Value = Item> {
    (version(), any::<bool>(), any::<bool>()).prop_map(move |(version, deleted, on)| {
        if deleted {
            Item::tombstone(key.clone(), version)
        } else {
            ItemBuilder::new(key.clone())
                .version(version)
                .data(json!({ "key": key, "on": on }))
                .build()
        }
    })
}

/// Generate a live item or a tombstone.
pub fn item() -> impl Strategy<Value = Item> {
    item_key().prop_flat_map(item_with_key)
}

/// Generate a full data set with up to `max_per_kind` items per kind.
pub fn full_data_set(max_per_kind: usize) -> impl Strategy<Value = FullDataSet> {
    prop::collection::vec((data_kind(), item()), 0..=max_per_kind * ALL_KINDS.len()).prop_map(
        |items| {
            items
                .into_iter()
                .fold(DataBuilder::new(), |builder, (kind, item)| builder.add(kind, item))
                .build()
        },
    )
}

/// Generate a sequence of versions written to one key by competing writers.
pub fn competing_versions(max_writers: usize) -> impl Strategy<Value = Vec<u64>> {
    prop::collection::vec(1u64..1_000, 1..=max_writers)
}
