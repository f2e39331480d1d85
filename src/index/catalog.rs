use super::keys::{EntryKeys, IndexKind};
use super::set::IndexSet;
use crate::error::{Error, Result};
use crate::store::{CatalogImage, EntryId, EntryKind, EntryMeta, Interned, NameStore};
use tracing::{debug, warn};

/// A name store together with the indices derived from it.
///
/// All mutations go through here so the indices move in step with the
/// store. Cloning is cheap and yields an immutable snapshot.
#[derive(Debug, Clone)]
pub struct Catalog {
    store: NameStore,
    indices: IndexSet,
}

impl Catalog {
    /// Wrap a populated store, bulk-loading every index
    pub fn new(store: NameStore) -> Self {
        let indices = IndexSet::bulk_load(&store);
        Self { store, indices }
    }

    pub fn empty(max_path_len: usize) -> Self {
        Self::new(NameStore::new(max_path_len))
    }

    pub fn from_image(image: &CatalogImage, max_path_len: usize) -> Result<Self> {
        Ok(Self::new(NameStore::from_image(image, max_path_len)?))
    }

    pub fn to_image(&self) -> CatalogImage {
        self.store.to_image()
    }

    pub fn store(&self) -> &NameStore {
        &self.store
    }

    pub fn indices(&self) -> &IndexSet {
        &self.indices
    }

    pub fn generation(&self) -> u64 {
        self.store.generation()
    }

    /// Insert or refresh `(parent, name)`.
    ///
    /// An existing entry of the same kind gets the new metadata; one of the
    /// other kind is removed with its subtree and replaced.
    pub fn upsert(
        &mut self,
        parent: Option<EntryId>,
        name: &str,
        kind: EntryKind,
        meta: EntryMeta,
    ) -> Result<Interned> {
        if let Some(existing) = self.store.child(parent, name) {
            let same_kind = self.store.get(existing).is_some_and(|e| e.kind == kind);
            if same_kind {
                self.update_meta(existing, meta)?;
                return Ok(Interned::Existing(existing));
            }
            self.remove_tree(existing);
        }

        let interned = self.store.intern_with(parent, name, kind, meta)?;
        let id = interned.id();
        let failed = match EntryKeys::of(&self.store, id) {
            Some(keys) => self.indices.insert(id, &keys),
            None => IndexKind::ALL.to_vec(),
        };
        self.finish(failed);
        Ok(interned)
    }

    pub fn update_meta(&mut self, id: EntryId, meta: EntryMeta) -> Result<()> {
        let old = EntryKeys::of(&self.store, id).ok_or(Error::UnknownEntry(id))?;
        self.store.set_meta(id, meta)?;
        let failed = match EntryKeys::of(&self.store, id) {
            Some(new) => self.indices.rekey(id, &old, &new),
            None => IndexKind::ALL.to_vec(),
        };
        self.finish(failed);
        Ok(())
    }

    /// Remove an entry and all its descendants. Returns how many went.
    pub fn remove_tree(&mut self, id: EntryId) -> usize {
        if !self.store.is_live(id) {
            return 0;
        }

        let mut ids = vec![id];
        ids.extend(self.store.descendants(id));
        // Keys need the whole chain alive, so collect them before removing
        let keyed: Vec<(EntryId, Option<EntryKeys>)> = ids
            .iter()
            .map(|&id| (id, EntryKeys::of(&self.store, id)))
            .collect();

        let mut failed = Vec::new();
        for (id, keys) in keyed.iter().rev() {
            match keys {
                Some(keys) => failed.extend(self.indices.remove(*id, keys)),
                None => failed.extend(IndexKind::ALL),
            }
            self.store.remove(*id);
        }
        failed.sort_unstable();
        failed.dedup();
        self.finish(failed);
        ids.len()
    }

    /// Move and/or rename, re-keying the entry and every descendant.
    /// An entry already at the destination is replaced.
    pub fn rename(&mut self, id: EntryId, new_parent: Option<EntryId>, new_name: &str) -> Result<()> {
        if !self.store.is_live(id) {
            return Err(Error::UnknownEntry(id));
        }
        if let Some(parent) = new_parent {
            let entry = self.store.get(parent).ok_or(Error::UnknownEntry(parent))?;
            if !entry.is_folder() {
                return Err(Error::NotAFolder(parent));
            }
            if parent == id || self.store.descendants(id).contains(&parent) {
                return Err(Error::NotAFolder(parent));
            }
        }
        if let Some(displaced) = self.store.child(new_parent, new_name)
            && displaced != id
        {
            debug!("Rename replaces entry {}", displaced);
            self.remove_tree(displaced);
        }

        let mut ids = vec![id];
        ids.extend(self.store.descendants(id));
        let old: Vec<Option<EntryKeys>> = ids.iter().map(|&i| EntryKeys::of(&self.store, i)).collect();

        self.store.rename(id, new_parent, new_name)?;

        let mut failed = Vec::new();
        for (&i, old) in ids.iter().zip(&old) {
            match (old, EntryKeys::of(&self.store, i)) {
                (Some(old), Some(new)) => failed.extend(self.indices.rekey(i, old, &new)),
                _ => failed.extend(IndexKind::ALL),
            }
        }
        failed.sort_unstable();
        failed.dedup();
        self.finish(failed);
        Ok(())
    }

    /// Targeted rebuild of one index
    pub fn repair(&mut self, kind: IndexKind) {
        self.indices.rebuild_index(kind, &self.store);
    }

    fn finish(&mut self, failed: Vec<IndexKind>) {
        if !failed.is_empty() {
            warn!("Index update missed entries in {:?}; scheduling rebuild", failed);
        }
        self.indices.sync_to(self.store.generation(), &failed);
    }

    #[cfg(test)]
    pub(crate) fn indices_mut(&mut self) -> &mut IndexSet {
        &mut self.indices
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ops::Bound;
    use std::path::Path;

    fn catalog() -> (Catalog, EntryId) {
        let mut store = NameStore::with_separator(1024, '/');
        let root = store.intern(None, "/vol", EntryKind::Folder).unwrap();
        (Catalog::new(store), root)
    }

    fn assert_consistent(cat: &Catalog) {
        for kind in IndexKind::ALL {
            assert_eq!(cat.indices().len(kind), cat.store().live_count(), "{:?}", kind);
            assert!(cat.indices().check(kind, cat.generation()).is_ok(), "{:?}", kind);
        }
    }

    #[test]
    fn test_upsert_indexes_new_entry() {
        let (mut cat, root) = catalog();
        let id = cat
            .upsert(Some(root), "a.txt", EntryKind::File, EntryMeta::default())
            .unwrap()
            .id();

        assert_consistent(&cat);
        assert!(cat.indices().extension("txt").unwrap().contains(id));
    }

    #[test]
    fn test_upsert_existing_refreshes_meta() {
        let (mut cat, root) = catalog();
        let first = cat
            .upsert(Some(root), "a.txt", EntryKind::File, EntryMeta::default())
            .unwrap();
        let meta = EntryMeta { size: Some(4096), ..Default::default() };
        let second = cat.upsert(Some(root), "a.txt", EntryKind::File, meta).unwrap();

        assert_eq!(second, Interned::Existing(first.id()));
        assert_eq!(cat.store().get(first.id()).unwrap().meta.size, Some(4096));
        assert_consistent(&cat);
    }

    #[test]
    fn test_upsert_kind_change_replaces_subtree() {
        let (mut cat, root) = catalog();
        let dir = cat.upsert(Some(root), "x", EntryKind::Folder, EntryMeta::default()).unwrap().id();
        cat.upsert(Some(dir), "inner", EntryKind::File, EntryMeta::default()).unwrap();

        let file = cat.upsert(Some(root), "x", EntryKind::File, EntryMeta::default()).unwrap();
        assert!(matches!(file, Interned::New(id) if id != dir));
        assert_eq!(cat.store().live_count(), 2);
        assert_consistent(&cat);
    }

    #[test]
    fn test_remove_tree() {
        let (mut cat, root) = catalog();
        let dir = cat.upsert(Some(root), "dir", EntryKind::Folder, EntryMeta::default()).unwrap().id();
        cat.upsert(Some(dir), "a", EntryKind::File, EntryMeta::default()).unwrap();
        cat.upsert(Some(dir), "b", EntryKind::File, EntryMeta::default()).unwrap();

        assert_eq!(cat.remove_tree(dir), 3);
        assert_eq!(cat.remove_tree(dir), 0);
        assert_eq!(cat.store().live_count(), 1);
        assert_consistent(&cat);
    }

    #[test]
    fn test_rename_rekeys_descendant_paths() {
        let (mut cat, root) = catalog();
        let dir = cat.upsert(Some(root), "old", EntryKind::Folder, EntryMeta::default()).unwrap().id();
        let leaf = cat.upsert(Some(dir), "leaf.txt", EntryKind::File, EntryMeta::default()).unwrap().id();

        cat.rename(dir, Some(root), "new").unwrap();

        assert_consistent(&cat);
        assert_eq!(cat.store().resolve(Path::new("/vol/new/leaf.txt")), Some(leaf));
        let key = super::super::keys::PathKey::new("/vol/new/leaf.txt", '/');
        let hits = cat.indices().path().range(Bound::Included(&key), Bound::Included(&key));
        assert!(hits.contains(leaf));
    }

    #[test]
    fn test_rename_over_existing_replaces_it() {
        let (mut cat, root) = catalog();
        let a = cat.upsert(Some(root), "a", EntryKind::File, EntryMeta::default()).unwrap().id();
        let b = cat.upsert(Some(root), "b", EntryKind::File, EntryMeta::default()).unwrap().id();

        cat.rename(a, Some(root), "b").unwrap();
        assert!(!cat.store().is_live(b));
        assert_eq!(cat.store().child(Some(root), "b"), Some(a));
        assert_consistent(&cat);
    }

    #[test]
    fn test_rename_into_own_subtree_fails() {
        let (mut cat, root) = catalog();
        let dir = cat.upsert(Some(root), "dir", EntryKind::Folder, EntryMeta::default()).unwrap().id();
        let sub = cat.upsert(Some(dir), "sub", EntryKind::Folder, EntryMeta::default()).unwrap().id();

        assert!(cat.rename(dir, Some(sub), "dir").is_err());
        assert_consistent(&cat);
    }

    #[test]
    fn test_snapshot_survives_mutation() {
        let (mut cat, root) = catalog();
        let a = cat.upsert(Some(root), "a", EntryKind::File, EntryMeta::default()).unwrap().id();
        let snapshot = cat.clone();

        cat.remove_tree(a);
        assert!(snapshot.store().is_live(a));
        assert!(snapshot.indices().kinds().files().contains(a));
        assert!(!cat.indices().kinds().files().contains(a));
    }

    #[test]
    fn test_repair_clears_stale_index() {
        let (mut cat, root) = catalog();
        cat.upsert(Some(root), "a", EntryKind::File, EntryMeta::default()).unwrap();
        cat.indices_mut().force_stale(IndexKind::Name);
        assert!(cat.indices().check(IndexKind::Name, cat.generation()).is_err());

        cat.repair(IndexKind::Name);
        assert_consistent(&cat);
    }
}
