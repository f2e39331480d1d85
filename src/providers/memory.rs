//! In-memory providers for tests and embedding.

use super::{ChangeFeed, EnumeratedEntry, Persistence, VolumeEnumerator, WalkItem};
use crate::error::Result;
use crate::store::{CatalogImage, EntryKind, EntryMeta};
use crate::update::ChangeEvent;
use parking_lot::{Mutex, RwLock};
use std::io;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};

/// A volume described entirely in memory.
///
/// Entries are walked in pre-order of their paths; an entry marked
/// unreadable is reported with its subtree skipped.
#[derive(Debug, Default)]
pub struct MemoryVolume {
    roots: Vec<PathBuf>,
    entries: RwLock<Vec<EnumeratedEntry>>,
    unreadable: RwLock<Vec<PathBuf>>,
}

impl MemoryVolume {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let volume = Self {
            roots: vec![root.clone()],
            ..Default::default()
        };
        volume.add(root, EntryKind::Folder, EntryMeta::default());
        volume
    }

    pub fn folder(self, path: impl Into<PathBuf>) -> Self {
        self.add(path, EntryKind::Folder, EntryMeta::default());
        self
    }

    pub fn file(self, path: impl Into<PathBuf>) -> Self {
        self.add(path, EntryKind::File, EntryMeta::default());
        self
    }

    pub fn file_with(self, path: impl Into<PathBuf>, meta: EntryMeta) -> Self {
        self.add(path, EntryKind::File, meta);
        self
    }

    /// Add or replace an entry
    pub fn add(&self, path: impl Into<PathBuf>, kind: EntryKind, meta: EntryMeta) {
        let path = path.into();
        let mut entries = self.entries.write();
        entries.retain(|e| e.path != path);
        entries.push(EnumeratedEntry { path, kind, meta });
    }

    /// Remove an entry and everything under it
    pub fn remove(&self, path: &Path) {
        self.entries.write().retain(|e| !e.path.starts_with(path));
    }

    pub fn mark_unreadable(&self, path: impl Into<PathBuf>) {
        self.unreadable.write().push(path.into());
    }
}

impl VolumeEnumerator for MemoryVolume {
    fn roots(&self) -> Vec<PathBuf> {
        self.roots.clone()
    }

    fn walk(&self, root: &Path, visit: &mut dyn FnMut(WalkItem) -> ControlFlow<()>) -> io::Result<()> {
        let mut entries: Vec<EnumeratedEntry> = self
            .entries
            .read()
            .iter()
            .filter(|e| e.path.starts_with(root))
            .cloned()
            .collect();
        if !entries.iter().any(|e| e.path == root) {
            return Err(io::Error::new(io::ErrorKind::NotFound, format!("{} not found", root.display())));
        }
        // Component-wise ordering is a pre-order
        entries.sort_by(|a, b| a.path.cmp(&b.path));

        let unreadable = self.unreadable.read().clone();
        let mut skipping: Option<PathBuf> = None;
        for entry in entries {
            if skipping.as_ref().is_some_and(|s| entry.path.starts_with(s)) {
                continue;
            }
            let item = if unreadable.contains(&entry.path) {
                skipping = Some(entry.path.clone());
                WalkItem::Unreadable {
                    path: entry.path,
                    reason: "permission denied".to_string(),
                }
            } else {
                WalkItem::Entry(entry)
            };
            if visit(item).is_break() {
                break;
            }
        }
        Ok(())
    }
}

/// Change feed backed by an mpsc channel; `send` pushes to every subscriber
#[derive(Debug, Default)]
pub struct ChannelFeed {
    subscribers: Mutex<Vec<Sender<ChangeEvent>>>,
}

impl ChannelFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver an event; returns how many subscribers received it
    pub fn send(&self, event: ChangeEvent) -> usize {
        let mut subs = self.subscribers.lock();
        subs.retain(|tx| tx.send(event.clone()).is_ok());
        subs.len()
    }
}

impl ChangeFeed for ChannelFeed {
    fn subscribe(&self) -> Receiver<ChangeEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.lock().push(tx);
        rx
    }
}

impl<T: ChangeFeed> ChangeFeed for std::sync::Arc<T> {
    fn subscribe(&self) -> Receiver<ChangeEvent> {
        self.as_ref().subscribe()
    }
}

/// Keeps the last saved image in memory
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    image: Mutex<Option<CatalogImage>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Persistence for MemoryPersistence {
    fn save(&self, image: &CatalogImage) -> Result<()> {
        *self.image.lock() = Some(image.clone());
        Ok(())
    }

    fn load(&self) -> Result<Option<CatalogImage>> {
        Ok(self.image.lock().clone())
    }
}

impl<T: Persistence> Persistence for std::sync::Arc<T> {
    fn save(&self, image: &CatalogImage) -> Result<()> {
        self.as_ref().save(image)
    }

    fn load(&self) -> Result<Option<CatalogImage>> {
        self.as_ref().load()
    }
}

impl<T: VolumeEnumerator> VolumeEnumerator for std::sync::Arc<T> {
    fn roots(&self) -> Vec<PathBuf> {
        self.as_ref().roots()
    }

    fn walk(&self, root: &Path, visit: &mut dyn FnMut(WalkItem) -> ControlFlow<()>) -> io::Result<()> {
        self.as_ref().walk(root, visit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(volume: &MemoryVolume, root: &str) -> Vec<WalkItem> {
        let mut items = Vec::new();
        volume
            .walk(Path::new(root), &mut |i| {
                items.push(i);
                ControlFlow::Continue(())
            })
            .unwrap();
        items
    }

    #[test]
    fn test_memory_volume_pre_order() {
        let volume = MemoryVolume::new("/vol")
            .file("/vol/b.txt")
            .folder("/vol/a")
            .file("/vol/a/z.txt");
        let paths: Vec<PathBuf> = collect(&volume, "/vol")
            .into_iter()
            .filter_map(|i| match i {
                WalkItem::Entry(e) => Some(e.path),
                _ => None,
            })
            .collect();
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/vol"),
                PathBuf::from("/vol/a"),
                PathBuf::from("/vol/a/z.txt"),
                PathBuf::from("/vol/b.txt"),
            ]
        );
    }

    #[test]
    fn test_memory_volume_unreadable_skips_subtree() {
        let volume = MemoryVolume::new("/vol").folder("/vol/secret").file("/vol/secret/x").file("/vol/ok");
        volume.mark_unreadable("/vol/secret");

        let items = collect(&volume, "/vol");
        assert_eq!(items.len(), 3);
        assert!(matches!(&items[2], WalkItem::Unreadable { path, .. } if path == Path::new("/vol/secret")));
    }

    #[test]
    fn test_channel_feed_fans_out() {
        let feed = ChannelFeed::new();
        let a = feed.subscribe();
        let b = feed.subscribe();
        let event = ChangeEvent::Deleted { path: PathBuf::from("/vol/x") };

        assert_eq!(feed.send(event.clone()), 2);
        assert_eq!(a.recv().unwrap(), event);
        assert_eq!(b.recv().unwrap(), event);

        drop(a);
        assert_eq!(feed.send(event), 1);
    }
}
