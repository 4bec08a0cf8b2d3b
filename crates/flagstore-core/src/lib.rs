//! # Flagstore Core
//!
//! Pure data model for flagstore: versioned items, the data kinds they are
//! partitioned into, and full data sets used to initialize a store.
//!
//! This crate contains no I/O, no storage, no filesystem access.
//!
//! ## Key Types
//!
//! - [`Item`] - A versioned, possibly deleted value stored under a key
//! - [`DataKind`] - A named partition of the store (flags, segments)
//! - [`FullDataSet`] - A complete replacement data set spanning all kinds
//! - [`DataBuilder`] - Assembles a [`FullDataSet`] in memory
//!
//! ## Versioning
//!
//! Versions are compared, never incremented by the store. An item only
//! replaces a stored item with a strictly lower version; see [`Item::supersedes`].

pub mod error;
pub mod item;
pub mod kind;
pub mod snapshot;

pub use error::{CoreError, Result};
pub use item::{Item, ItemBuilder};
pub use kind::{DataKind, ALL_KINDS, FEATURES, SEGMENTS};
pub use snapshot::{DataBuilder, FullDataSet};
