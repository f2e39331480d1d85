//! Shared utilities.
//!
//! - [`app_data`] - Application data directory and file locations
//! - [`cancel`] - Cooperative cancellation for builds and queries
//! - [`fold`] - Case/diacritic folding and natural collation
//! - [`progress`] - Optional build progress spinner

pub mod app_data;
pub mod cancel;
pub mod fold;
pub mod progress;

pub use app_data::*;
pub use cancel::CancellationToken;
pub use fold::{Folding, fold, natural_cmp};
