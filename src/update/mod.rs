//! Incremental maintenance of a catalog from live change events.
//!
//! - [`event`] - Path-addressed change events
//! - [`debouncer`] - Optional per-path coalescing of event bursts
//! - [`updater`] - Applies events, parking out-of-order ones

pub mod debouncer;
pub mod event;
pub mod updater;

pub use debouncer::EventDebouncer;
pub use event::{ChangeEvent, FieldChange};
pub use updater::{ApplyReport, LiveUpdater};
