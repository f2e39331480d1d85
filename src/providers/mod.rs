//! Capabilities the engine consumes: volume enumeration, a change feed and
//! catalog persistence.
//!
//! - [`fs`] - Real file-system enumerator built on the `ignore` walker
//! - [`json`] - Catalog images as JSON files
//! - [`memory`] - In-memory volume, feed and persistence for tests

pub mod fs;
pub mod json;
pub mod memory;

use crate::error::Result;
use crate::store::{CatalogImage, EntryKind, EntryMeta};
use crate::update::ChangeEvent;
use std::io;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::Receiver;

pub use fs::FsEnumerator;
pub use json::JsonPersistence;
pub use memory::{ChannelFeed, MemoryPersistence, MemoryVolume};

/// One entry produced by a volume walk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumeratedEntry {
    pub path: PathBuf,
    pub kind: EntryKind,
    pub meta: EntryMeta,
}

impl EnumeratedEntry {
    pub fn is_folder(&self) -> bool {
        self.kind.is_folder()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalkItem {
    Entry(EnumeratedEntry),
    /// A subtree that could not be read; the walk continues elsewhere
    Unreadable { path: PathBuf, reason: String },
}

/// Directory-walk collaborator
pub trait VolumeEnumerator: Send + Sync {
    /// Volume roots to index
    fn roots(&self) -> Vec<PathBuf>;

    /// Walk `root` in pre-order, `root` itself first. Fails with
    /// `NotFound` when `root` does not exist.
    fn walk(&self, root: &Path, visit: &mut dyn FnMut(WalkItem) -> ControlFlow<()>) -> io::Result<()>;
}

/// Source of live change events
pub trait ChangeFeed: Send + Sync {
    fn subscribe(&self) -> Receiver<ChangeEvent>;
}

/// Where catalog images are saved between runs
pub trait Persistence: Send + Sync {
    fn save(&self, image: &CatalogImage) -> Result<()>;
    fn load(&self) -> Result<Option<CatalogImage>>;
}

/// Constructor-injected collaborators of an engine
#[derive(Clone, Default)]
pub struct Capabilities {
    pub enumerator: Option<Arc<dyn VolumeEnumerator>>,
    pub feed: Option<Arc<dyn ChangeFeed>>,
    pub persistence: Option<Arc<dyn Persistence>>,
}

impl Capabilities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_enumerator(mut self, enumerator: impl VolumeEnumerator + 'static) -> Self {
        self.enumerator = Some(Arc::new(enumerator));
        self
    }

    pub fn with_feed(mut self, feed: impl ChangeFeed + 'static) -> Self {
        self.feed = Some(Arc::new(feed));
        self
    }

    pub fn with_persistence(mut self, persistence: impl Persistence + 'static) -> Self {
        self.persistence = Some(Arc::new(persistence));
        self
    }
}
