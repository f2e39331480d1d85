//! Serialisable form of the name store.
//!
//! Only live records are written, parents before children, so loading is a
//! single pass of interning. Indices are not part of the image; they are
//! bulk-loaded again after a load.

use super::names::NameStore;
use super::types::{EntryId, EntryKind, EntryMeta};
use crate::error::{Error, Result};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::io;

pub const IMAGE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogImage {
    pub version: u32,
    pub separator: char,
    pub entries: Vec<ImageEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageEntry {
    pub id: EntryId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<EntryId>,
    pub name: String,
    pub kind: EntryKind,
    #[serde(default)]
    pub meta: EntryMeta,
}

impl NameStore {
    pub fn to_image(&self) -> CatalogImage {
        let mut entries = Vec::with_capacity(self.live_count());
        for root in self.roots() {
            for id in std::iter::once(root).chain(self.descendants(root)) {
                if let Some(entry) = self.get(id) {
                    entries.push(ImageEntry {
                        id,
                        parent: entry.parent,
                        name: entry.name.to_string(),
                        kind: entry.kind,
                        meta: entry.meta,
                    });
                }
            }
        }
        CatalogImage {
            version: IMAGE_VERSION,
            separator: self.separator(),
            entries,
        }
    }

    /// Rebuild a store from an image. Ids are reassigned densely.
    pub fn from_image(image: &CatalogImage, max_path_len: usize) -> Result<Self> {
        if image.version != IMAGE_VERSION {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unsupported catalog image version {}", image.version),
            )));
        }

        let mut store = NameStore::with_separator(max_path_len, image.separator);
        let mut ids: FxHashMap<EntryId, EntryId> = FxHashMap::default();
        for record in &image.entries {
            let parent = match record.parent {
                Some(old) => Some(*ids.get(&old).ok_or(Error::UnknownEntry(old))?),
                None => None,
            };
            let id = store
                .intern_with(parent, &record.name, record.kind, record.meta)?
                .id();
            ids.insert(record.id, id);
        }
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_restores_paths_and_meta() {
        let mut store = NameStore::with_separator(1024, '/');
        let root = store.intern(None, "/vol", EntryKind::Folder).unwrap();
        let docs = store.intern(Some(root), "docs", EntryKind::Folder).unwrap();
        let meta = EntryMeta {
            size: Some(42),
            modified: Some(1_700_000_000),
            ..Default::default()
        };
        store.intern_with(Some(docs), "a.txt", EntryKind::File, meta).unwrap();
        let gone = store.intern(Some(root), "gone", EntryKind::File).unwrap();
        store.remove(gone);

        let image = store.to_image();
        assert_eq!(image.entries.len(), 3);

        let json = serde_json::to_string(&image).unwrap();
        let loaded = NameStore::from_image(&serde_json::from_str(&json).unwrap(), 1024).unwrap();
        let id = loaded.resolve(std::path::Path::new("/vol/docs/a.txt")).unwrap();
        assert_eq!(loaded.get(id).unwrap().meta, meta);
        assert_eq!(loaded.live_count(), 3);
        assert_eq!(loaded.tombstones(), 0);
    }

    #[test]
    fn test_image_with_orphan_fails() {
        let image = CatalogImage {
            version: IMAGE_VERSION,
            separator: '/',
            entries: vec![ImageEntry {
                id: 1,
                parent: Some(0),
                name: "orphan".into(),
                kind: EntryKind::File,
                meta: EntryMeta::default(),
            }],
        };
        assert!(matches!(NameStore::from_image(&image, 1024), Err(Error::UnknownEntry(0))));
    }
}
