//! Name store: every observed file and folder name with its parent link.
//!
//! - [`types`] - Entry records, kinds, metadata and attribute flags
//! - [`names`] - The [`NameStore`] itself (interning, tombstones, paths)
//! - [`cow`] - Copy-on-write shards that make snapshots cheap
//! - [`image`] - Serialisable catalog image for persistence

pub mod cow;
pub mod image;
pub mod names;
pub mod types;

pub use image::{CatalogImage, ImageEntry};
pub use names::{Interned, NameStore};
pub use types::*;
