//! Full data sets used to (re)initialize a store.
//!
//! A [`FullDataSet`] is assembled entirely in memory and handed to a store
//! in one call. Building one never touches a backend.

use std::collections::btree_map::{self, BTreeMap};

use crate::error::{CoreError, Result};
use crate::item::Item;
use crate::kind::{DataKind, ALL_KINDS};

/// A complete data set: kind -> key -> item.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FullDataSet {
    data: BTreeMap<DataKind, BTreeMap<String, Item>>,
}

impl FullDataSet {
    /// A data set containing every known kind with no items.
    ///
    /// Initializing a store with this still marks it initialized.
    pub fn empty() -> Self {
        DataBuilder::new().build()
    }

    /// Items of one kind, if the kind is part of this data set.
    pub fn items(&self, kind: DataKind) -> Option<&BTreeMap<String, Item>> {
        self.data.get(&kind)
    }

    /// Look up a single item.
    pub fn get(&self, kind: DataKind, key: &str) -> Option<&Item> {
        self.data.get(&kind).and_then(|items| items.get(key))
    }

    /// Kinds present in this data set.
    pub fn kinds(&self) -> impl Iterator<Item = DataKind> + '_ {
        self.data.keys().copied()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, DataKind, BTreeMap<String, Item>> {
        self.data.iter()
    }

    /// Total number of items across all kinds.
    pub fn item_count(&self) -> usize {
        self.data.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.item_count() == 0
    }
}

impl IntoIterator for FullDataSet {
    type Item = (DataKind, BTreeMap<String, Item>);
    type IntoIter = btree_map::IntoIter<DataKind, BTreeMap<String, Item>>;

    fn into_iter(self) -> Self::IntoIter {
        self.data.into_iter()
    }
}

impl<'a> IntoIterator for &'a FullDataSet {
    type Item = (&'a DataKind, &'a BTreeMap<String, Item>);
    type IntoIter = btree_map::Iter<'a, DataKind, BTreeMap<String, Item>>;

    fn into_iter(self) -> Self::IntoIter {
        self.data.iter()
    }
}

/// Builder for [`FullDataSet`].
///
/// Every kind in [`ALL_KINDS`] is present from the start, so a built data set
/// never leaves a kind untouched when used for initialization.
#[derive(Debug, Clone)]
pub struct DataBuilder {
    data: BTreeMap<DataKind, BTreeMap<String, Item>>,
}

impl DataBuilder {
    pub fn new() -> Self {
        Self {
            data: ALL_KINDS.iter().map(|k| (*k, BTreeMap::new())).collect(),
        }
    }

    /// Add an item, replacing any item already added under the same key.
    pub fn add(mut self, kind: DataKind, item: Item) -> Self {
        self.data
            .entry(kind)
            .or_default()
            .insert(item.key().to_string(), item);
        self
    }

    /// Add several items of one kind.
    pub fn add_all(mut self, kind: DataKind, items: impl IntoIterator<Item = Item>) -> Self {
        for item in items {
            self = self.add(kind, item);
        }
        self
    }

    /// Add an item, failing if the key was already added for this kind.
    pub fn try_add(&mut self, kind: DataKind, item: Item) -> Result<()> {
        if item.key().is_empty() {
            return Err(CoreError::EmptyKey);
        }
        match self.data.entry(kind).or_default().entry(item.key().to_string()) {
            btree_map::Entry::Occupied(entry) => Err(CoreError::DuplicateKey {
                kind,
                key: entry.key().clone(),
            }),
            btree_map::Entry::Vacant(entry) => {
                entry.insert(item);
                Ok(())
            }
        }
    }

    pub fn contains(&self, kind: DataKind, key: &str) -> bool {
        self.data.get(&kind).is_some_and(|items| items.contains_key(key))
    }

    pub fn build(self) -> FullDataSet {
        FullDataSet { data: self.data }
    }
}

impl Default for DataBuilder {
    fn default() -> Self {
        Self::new()
    }
}
