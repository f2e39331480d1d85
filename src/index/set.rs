use super::keys::{EntryKeys, IndexKind, NameKey, PathKey, fold_ext};
use super::sorted::{BucketIndex, KindBitmaps, SortedIndex};
use crate::error::{Error, Result};
use crate::store::{EntryId, NameStore};
use rayon::prelude::*;
use roaring::RoaringBitmap;
use tracing::{debug, info};

/// Every index over one name store, each tagged with the store generation
/// it is synchronised to
#[derive(Debug, Clone, Default)]
pub struct IndexSet {
    name: SortedIndex<NameKey>,
    path: SortedIndex<PathKey>,
    size: SortedIndex<Option<u64>>,
    modified: SortedIndex<Option<i64>>,
    created: SortedIndex<Option<i64>>,
    ext: BucketIndex,
    kind: KindBitmaps,
    synced: [u64; IndexKind::ALL.len()],
    stale: [bool; IndexKind::ALL.len()],
}

impl IndexSet {
    /// Bulk-load every index from the live entries of `store`
    pub fn bulk_load(store: &NameStore) -> Self {
        let start = std::time::Instant::now();
        let keys = collect_keys(store);

        let mut set = IndexSet::default();
        for kind in IndexKind::ALL {
            set.load(kind, &keys);
            set.synced[kind.slot()] = store.generation();
        }

        info!(
            "Bulk-loaded indices for {} entries in {:.2?}",
            keys.len(),
            start.elapsed()
        );
        set
    }

    /// Rebuild one index from the store and mark it synchronised
    pub fn rebuild_index(&mut self, kind: IndexKind, store: &NameStore) {
        let keys = collect_keys(store);
        self.load(kind, &keys);
        self.synced[kind.slot()] = store.generation();
        self.stale[kind.slot()] = false;
        info!("Rebuilt {:?} index ({} entries)", kind, keys.len());
    }

    fn load(&mut self, kind: IndexKind, keys: &[(EntryId, EntryKeys)]) {
        match kind {
            IndexKind::Name => {
                self.name = SortedIndex::bulk_load(keys.iter().map(|(id, k)| (k.name.clone(), *id)).collect())
            }
            IndexKind::Path => {
                self.path = SortedIndex::bulk_load(keys.iter().map(|(id, k)| (k.path.clone(), *id)).collect())
            }
            IndexKind::Size => {
                self.size = SortedIndex::bulk_load(keys.iter().map(|(id, k)| (k.size, *id)).collect())
            }
            IndexKind::DateModified => {
                self.modified = SortedIndex::bulk_load(keys.iter().map(|(id, k)| (k.modified, *id)).collect())
            }
            IndexKind::DateCreated => {
                self.created = SortedIndex::bulk_load(keys.iter().map(|(id, k)| (k.created, *id)).collect())
            }
            IndexKind::Extension => {
                self.ext = BucketIndex::bulk_load(keys.iter().map(|(id, k)| (k.ext.clone(), *id)).collect())
            }
            IndexKind::Kind => {
                let mut files = RoaringBitmap::new();
                let mut folders = RoaringBitmap::new();
                for (id, k) in keys {
                    if k.kind.is_folder() {
                        folders.insert(*id);
                    } else {
                        files.insert(*id);
                    }
                }
                self.kind = KindBitmaps::new(files, folders);
            }
        }
    }

    /// Add an entry to every index. Returns the indices that already held it.
    pub fn insert(&mut self, id: EntryId, keys: &EntryKeys) -> Vec<IndexKind> {
        IndexKind::ALL
            .into_iter()
            .filter(|&kind| !self.insert_one(kind, id, keys))
            .collect()
    }

    /// Remove an entry from every index. Returns the indices that lacked it.
    pub fn remove(&mut self, id: EntryId, keys: &EntryKeys) -> Vec<IndexKind> {
        IndexKind::ALL
            .into_iter()
            .filter(|&kind| !self.remove_one(kind, id, keys))
            .collect()
    }

    /// Move an entry between keys in the indices whose key changed
    pub fn rekey(&mut self, id: EntryId, old: &EntryKeys, new: &EntryKeys) -> Vec<IndexKind> {
        let mut failed = Vec::new();
        for kind in IndexKind::ALL {
            if key_eq(kind, old, new) {
                continue;
            }
            if !self.remove_one(kind, id, old) | !self.insert_one(kind, id, new) {
                failed.push(kind);
            }
        }
        failed
    }

    fn insert_one(&mut self, kind: IndexKind, id: EntryId, k: &EntryKeys) -> bool {
        match kind {
            IndexKind::Name => self.name.insert(k.name.clone(), id),
            IndexKind::Path => self.path.insert(k.path.clone(), id),
            IndexKind::Size => self.size.insert(k.size, id),
            IndexKind::DateModified => self.modified.insert(k.modified, id),
            IndexKind::DateCreated => self.created.insert(k.created, id),
            IndexKind::Extension => self.ext.insert(&k.ext, id),
            IndexKind::Kind => self.kind.insert(k.kind.is_folder(), id),
        }
    }

    fn remove_one(&mut self, kind: IndexKind, id: EntryId, k: &EntryKeys) -> bool {
        match kind {
            IndexKind::Name => self.name.remove(k.name.clone(), id),
            IndexKind::Path => self.path.remove(k.path.clone(), id),
            IndexKind::Size => self.size.remove(k.size, id),
            IndexKind::DateModified => self.modified.remove(k.modified, id),
            IndexKind::DateCreated => self.created.remove(k.created, id),
            IndexKind::Extension => self.ext.remove(&k.ext, id),
            IndexKind::Kind => self.kind.remove(k.kind.is_folder(), id),
        }
    }

    /// Record that every healthy index reflects store generation `generation`.
    /// Indices in `failed` (and any already stale) keep their old generation
    /// until rebuilt.
    pub fn sync_to(&mut self, generation: u64, failed: &[IndexKind]) {
        for kind in failed {
            if !self.stale[kind.slot()] {
                debug!("{:?} index went stale at generation {}", kind, generation);
            }
            self.stale[kind.slot()] = true;
        }
        for kind in IndexKind::ALL {
            if !self.stale[kind.slot()] {
                self.synced[kind.slot()] = generation;
            }
        }
    }

    /// Fail with `InternalInconsistency` unless `kind` is at `generation`
    pub fn check(&self, kind: IndexKind, generation: u64) -> Result<()> {
        let found = self.synced[kind.slot()];
        if found != generation {
            return Err(Error::InternalInconsistency {
                index: kind,
                expected: generation,
                found,
            });
        }
        Ok(())
    }

    pub fn synced_generation(&self, kind: IndexKind) -> u64 {
        self.synced[kind.slot()]
    }

    /// Indices waiting for a targeted rebuild
    pub fn stale(&self) -> Vec<IndexKind> {
        IndexKind::ALL
            .into_iter()
            .filter(|k| self.stale[k.slot()])
            .collect()
    }

    pub fn name(&self) -> &SortedIndex<NameKey> {
        &self.name
    }

    pub fn path(&self) -> &SortedIndex<PathKey> {
        &self.path
    }

    pub fn size(&self) -> &SortedIndex<Option<u64>> {
        &self.size
    }

    pub fn modified(&self) -> &SortedIndex<Option<i64>> {
        &self.modified
    }

    pub fn created(&self) -> &SortedIndex<Option<i64>> {
        &self.created
    }

    /// Ids with the given extension (folded the way the index folds)
    pub fn extension(&self, ext: &str) -> Option<&RoaringBitmap> {
        self.ext.get(&fold_ext(ext))
    }

    pub fn kinds(&self) -> &KindBitmaps {
        &self.kind
    }

    /// Entry count of an index, for consistency checks and stats
    pub fn len(&self, kind: IndexKind) -> usize {
        match kind {
            IndexKind::Name => self.name.len(),
            IndexKind::Path => self.path.len(),
            IndexKind::Size => self.size.len(),
            IndexKind::DateModified => self.modified.len(),
            IndexKind::DateCreated => self.created.len(),
            IndexKind::Extension => self.ext.len(),
            IndexKind::Kind => self.kind.len() as usize,
        }
    }

    #[cfg(test)]
    pub(crate) fn force_stale(&mut self, kind: IndexKind) {
        self.stale[kind.slot()] = true;
        self.synced[kind.slot()] = self.synced[kind.slot()].saturating_sub(1);
    }
}

fn key_eq(kind: IndexKind, a: &EntryKeys, b: &EntryKeys) -> bool {
    match kind {
        IndexKind::Name => a.name.as_str() == b.name.as_str(),
        IndexKind::Path => a.path.as_str() == b.path.as_str(),
        IndexKind::Size => a.size == b.size,
        IndexKind::DateModified => a.modified == b.modified,
        IndexKind::DateCreated => a.created == b.created,
        IndexKind::Extension => a.ext == b.ext,
        IndexKind::Kind => a.kind == b.kind,
    }
}

fn collect_keys(store: &NameStore) -> Vec<(EntryId, EntryKeys)> {
    let ids: Vec<EntryId> = store.iter().map(|e| e.id).collect();
    ids.into_par_iter()
        .filter_map(|id| EntryKeys::of(store, id).map(|k| (id, k)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{EntryKind, EntryMeta};

    fn sample() -> (NameStore, Vec<EntryId>) {
        let mut store = NameStore::with_separator(1024, '/');
        let root = store.intern(None, "/vol", EntryKind::Folder).unwrap();
        let a = store
            .intern_with(Some(root), "a.txt", EntryKind::File, EntryMeta { size: Some(10), ..Default::default() })
            .unwrap()
            .id();
        let b = store
            .intern_with(Some(root), "B.TXT", EntryKind::File, EntryMeta { size: Some(20), ..Default::default() })
            .unwrap()
            .id();
        let c = store.intern(Some(root), "c.cfg", EntryKind::File).unwrap();
        (store, vec![root, a, b, c])
    }

    #[test]
    fn test_bulk_load_covers_every_entry_once() {
        let (store, _) = sample();
        let set = IndexSet::bulk_load(&store);
        for kind in IndexKind::ALL {
            assert_eq!(set.len(kind), store.live_count(), "{:?}", kind);
            assert!(set.check(kind, store.generation()).is_ok());
        }
    }

    #[test]
    fn test_extension_lookup_folds_case() {
        let (store, ids) = sample();
        let set = IndexSet::bulk_load(&store);
        let txt: Vec<u32> = set.extension("TXT").unwrap().iter().collect();
        assert_eq!(txt, vec![ids[1], ids[2]]);
        assert!(set.extension("nope").is_none());
    }

    #[test]
    fn test_rekey_touches_changed_indices_only() {
        let (mut store, ids) = sample();
        let mut set = IndexSet::bulk_load(&store);
        let old = EntryKeys::of(&store, ids[1]).unwrap();
        store
            .set_meta(ids[1], EntryMeta { size: Some(99), ..Default::default() })
            .unwrap();
        let new = EntryKeys::of(&store, ids[1]).unwrap();

        assert!(set.rekey(ids[1], &old, &new).is_empty());
        set.sync_to(store.generation(), &[]);
        let big: Vec<u32> = set.size().range(std::ops::Bound::Included(&Some(50)), std::ops::Bound::Unbounded).iter().collect();
        assert_eq!(big, vec![ids[1]]);
    }

    #[test]
    fn test_missing_removal_marks_stale_until_rebuilt() {
        let (mut store, ids) = sample();
        let mut set = IndexSet::bulk_load(&store);
        let keys = EntryKeys::of(&store, ids[3]).unwrap();

        assert!(set.remove(ids[3], &keys).is_empty());
        store.remove(ids[3]);
        let failed = set.remove(ids[3], &keys);
        assert_eq!(failed.len(), IndexKind::ALL.len());

        set.sync_to(store.generation(), &[IndexKind::Size]);
        assert!(set.check(IndexKind::Name, store.generation()).is_ok());
        assert!(matches!(
            set.check(IndexKind::Size, store.generation()),
            Err(Error::InternalInconsistency { index: IndexKind::Size, .. })
        ));
        assert_eq!(set.stale(), vec![IndexKind::Size]);

        // Stays stale across later syncs
        set.sync_to(store.generation() + 1, &[]);
        assert!(set.check(IndexKind::Size, store.generation() + 1).is_err());

        set.rebuild_index(IndexKind::Size, &store);
        assert!(set.check(IndexKind::Size, store.generation()).is_ok());
        assert!(set.stale().is_empty());
    }
}
