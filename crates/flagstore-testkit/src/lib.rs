//! # Flagstore Testkit
//!
//! Testing utilities for flagstore.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Conformance suite**: the behavior every store backend must share,
//!   runnable against any [`StoreFactory`] with or without a cache
//! - **Generators**: Proptest strategies for items and data sets
//! - **Fixtures**: Common flag and segment items
//!
//! ## Conformance
//!
//! ```rust,ignore
//! use flagstore_store::CacheConfig;
//! use flagstore_testkit::{store_conformance_tests, MemoryFactory};
//!
//! store_conformance_tests!(memory, MemoryFactory::new(), CacheConfig::disabled());
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use flagstore_testkit::generators::item;
//!
//! proptest! {
//!     #[test]
//!     fn tombstones_have_no_data(item in item()) {
//!         prop_assert!(!item.is_deleted() || item.data().is_null());
//!     }
//! }
//! ```

pub mod conformance;
pub mod fixtures;
pub mod generators;

pub use conformance::{competing_upserts, MemoryFactory, SqliteFactory, StoreFactory, StoreSuite};
pub use fixtures::{flag, sample_data, segment};
