//! Searchable indices over the name store.
//!
//! - [`keys`] - Index kinds and the sort keys derived from an entry
//! - [`sorted`] - Sharded ordered sets, extension buckets and kind bitmaps
//! - [`set`] - [`IndexSet`]: every index plus generation bookkeeping
//! - [`catalog`] - [`Catalog`]: store and indices mutated in step
//! - [`build`] - [`IndexBuilder`]: full enumeration and subtree resync

pub mod build;
pub mod catalog;
pub mod keys;
pub mod set;
pub mod sorted;

pub use build::{BuildOutcome, BuildStats, IndexBuilder, ResyncOutcome};
pub use catalog::Catalog;
pub use keys::{EntryKeys, IndexKind, NameKey, PathKey};
pub use set::IndexSet;
