//! # fnx - Instant File-Name Search
//!
//! fnx keeps every file and folder name of one or more volumes in memory,
//! keeps that catalog current from a stream of change events, and answers
//! search expressions with ordered, paginated result windows in
//! milliseconds.
//!
//! ## Architecture
//!
//! The crate is organized into these main modules:
//!
//! - [`store`] - Deduplicated name storage with parent links and generations
//! - [`index`] - Sorted name/path/size/date indices, extension buckets, full builds
//! - [`update`] - Live change events, coalescing and incremental application
//! - [`query`] - Search syntax, plan compilation and bitmap execution
//! - [`engine`] - Snapshot-per-query engine tying the pieces together
//! - [`providers`] - Volume enumeration, change feed and persistence capabilities
//! - [`config`] - Defaults, `config.toml` and `FNX_*` overrides
//! - [`utils`] - Text folding, cancellation, progress and app data paths
//!
//! ## Quick Start
//!
//! ```ignore
//! use fnx::config::EngineConfig;
//! use fnx::engine::Engine;
//! use fnx::providers::{Capabilities, FsEnumerator};
//! use fnx::query::SearchState;
//!
//! let capabilities = Capabilities::new().with_enumerator(FsEnumerator::new(["/home".into()]));
//! let engine = Engine::new(EngineConfig::load(), capabilities);
//! engine.rebuild()?;
//!
//! let results = engine.search(&SearchState::new("report*.pdf dm:today").with_viewport(0, 50))?;
//! for item in &results.items {
//!     println!("{}", item.path);
//! }
//! ```
//!
//! ## Performance
//!
//! Every index is sharded copy-on-write, so cloning the catalog for a query
//! copies a handful of `Arc`s and the single writer only copies the shard
//! it touches. Index-backed filters produce roaring bitmaps; per-candidate
//! text checks only run on what those filters leave, in parallel for large
//! candidate sets.

pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod index;
pub mod providers;
pub mod query;
pub mod store;
pub mod update;
pub mod utils;

pub use engine::{Engine, EngineStats, UpdaterHandle};
pub use error::{Error, Result, SyntaxError};
