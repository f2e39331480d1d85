use super::cow::Shards;
use super::types::{Entry, EntryId, EntryKind, EntryMeta};
use crate::error::{Error, Result};
use rustc_hash::{FxHashMap, FxHashSet};
use std::path::{Component, Path};
use std::sync::Arc;

/// Records per copy-on-write chunk
const CHUNK: usize = 4096;

/// Parent key under which roots are linked
const ROOT_KEY: EntryId = EntryId::MAX;

/// Ids stop being allocated before the root key
const MAX_ID: usize = ROOT_KEY as usize;

/// Upper bound on parent-chain walks
const MAX_DEPTH: usize = 4096;

#[derive(Debug, Clone)]
struct Slot {
    entry: Entry,
    live: bool,
}

type ChildMap = FxHashMap<Arc<str>, EntryId>;

/// Result of interning a `(parent, name)` pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interned {
    New(EntryId),
    Existing(EntryId),
}

impl Interned {
    pub fn id(self) -> EntryId {
        match self {
            Interned::New(id) | Interned::Existing(id) => id,
        }
    }
}

/// Deduplicated storage of every file and folder name and its parent link.
///
/// Ids are allocated monotonically and never reused; removal leaves a
/// tombstone until the store is rebuilt from scratch. Every mutation bumps
/// [`generation`](Self::generation).
#[derive(Debug, Clone)]
pub struct NameStore {
    chunks: Vec<Arc<Vec<Slot>>>,
    /// parent id -> (name -> child id), sharded by parent id
    links: Shards<FxHashMap<EntryId, ChildMap>>,
    /// Interned name strings, sharded by hash
    pool: Shards<FxHashSet<Arc<str>>>,
    slots: usize,
    live: usize,
    generation: u64,
    separator: char,
    max_path_len: usize,
}

impl NameStore {
    pub fn new(max_path_len: usize) -> Self {
        Self::with_separator(max_path_len, std::path::MAIN_SEPARATOR)
    }

    pub fn with_separator(max_path_len: usize, separator: char) -> Self {
        Self {
            chunks: Vec::new(),
            links: Shards::new(),
            pool: Shards::new(),
            slots: 0,
            live: 0,
            generation: 0,
            separator,
            max_path_len,
        }
    }

    pub fn separator(&self) -> char {
        self.separator
    }

    pub fn max_path_len(&self) -> usize {
        self.max_path_len
    }

    /// Number of live entries
    pub fn live_count(&self) -> usize {
        self.live
    }

    /// Number of tombstoned entries awaiting compaction
    pub fn tombstones(&self) -> usize {
        self.slots - self.live
    }

    /// Monotonic mutation counter
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Intern a name under `parent` (`None` for a root)
    pub fn intern(&mut self, parent: Option<EntryId>, name: &str, kind: EntryKind) -> Result<EntryId> {
        self.intern_with(parent, name, kind, EntryMeta::default())
            .map(Interned::id)
    }

    /// Intern with metadata. An existing live `(parent, name)` is returned
    /// unchanged as [`Interned::Existing`].
    pub fn intern_with(
        &mut self,
        parent: Option<EntryId>,
        name: &str,
        kind: EntryKind,
        meta: EntryMeta,
    ) -> Result<Interned> {
        if let Some(parent_id) = parent {
            let parent_entry = self.get(parent_id).ok_or(Error::UnknownEntry(parent_id))?;
            if !parent_entry.is_folder() {
                return Err(Error::NotAFolder(parent_id));
            }
        }

        if let Some(id) = self.child(parent, name) {
            return Ok(Interned::Existing(id));
        }

        if self.slots >= MAX_ID {
            return Err(Error::ResourceExhausted {
                what: "entry ids",
                limit: MAX_ID,
            });
        }

        let id = self.slots as EntryId;
        let name = self.pooled(name);
        let entry = Entry {
            id,
            name: name.clone(),
            parent,
            kind,
            meta,
        };

        if self.chunks.last().is_none_or(|c| c.len() == CHUNK) {
            self.chunks.push(Arc::new(Vec::with_capacity(CHUNK)));
        }
        if let Some(chunk) = self.chunks.last_mut() {
            Arc::make_mut(chunk).push(Slot { entry, live: true });
        }
        self.slots += 1;
        self.live += 1;
        self.link(parent, name, id);
        self.generation += 1;

        Ok(Interned::New(id))
    }

    /// Live entry by id
    #[inline]
    pub fn get(&self, id: EntryId) -> Option<&Entry> {
        self.slot(id).filter(|s| s.live).map(|s| &s.entry)
    }

    #[inline]
    pub fn is_live(&self, id: EntryId) -> bool {
        self.get(id).is_some()
    }

    /// Child of `parent` (`None` for roots) with exactly this name
    pub fn child(&self, parent: Option<EntryId>, name: &str) -> Option<EntryId> {
        let key = parent.unwrap_or(ROOT_KEY);
        let shard = self.links.shard_for_id(key);
        self.links.get(shard).get(&key)?.get(name).copied()
    }

    /// Children of `parent` (`None` for roots), in id order
    pub fn children(&self, parent: Option<EntryId>) -> Vec<EntryId> {
        let key = parent.unwrap_or(ROOT_KEY);
        let shard = self.links.shard_for_id(key);
        let mut ids: Vec<EntryId> = self
            .links
            .get(shard)
            .get(&key)
            .map(|m| m.values().copied().collect())
            .unwrap_or_default();
        ids.sort_unstable();
        ids
    }

    pub fn roots(&self) -> Vec<EntryId> {
        self.children(None)
    }

    /// All live descendants of `id` in pre-order (excluding `id`)
    pub fn descendants(&self, id: EntryId) -> Vec<EntryId> {
        let mut out = Vec::new();
        let mut stack = self.children(Some(id));
        stack.reverse();
        while let Some(next) = stack.pop() {
            out.push(next);
            let mut kids = self.children(Some(next));
            kids.reverse();
            stack.extend(kids);
        }
        out
    }

    /// Tombstone an entry. Returns false if it was already gone.
    ///
    /// Children are not touched; callers remove descendants first.
    pub fn remove(&mut self, id: EntryId) -> bool {
        let Some(entry) = self.get(id).cloned() else {
            return false;
        };

        self.unlink(entry.parent, &entry.name, id);
        if let Some(slot) = self.slot_mut(id) {
            slot.live = false;
        }
        self.live -= 1;
        self.generation += 1;
        true
    }

    /// Move and/or rename an entry. An existing link at the destination is
    /// replaced; callers remove the displaced entry first.
    pub fn rename(&mut self, id: EntryId, new_parent: Option<EntryId>, new_name: &str) -> Result<()> {
        let entry = self.get(id).cloned().ok_or(Error::UnknownEntry(id))?;
        if let Some(parent_id) = new_parent {
            let parent = self.get(parent_id).ok_or(Error::UnknownEntry(parent_id))?;
            if !parent.is_folder() {
                return Err(Error::NotAFolder(parent_id));
            }
        }

        self.unlink(entry.parent, &entry.name, id);
        let name = self.pooled(new_name);
        if let Some(slot) = self.slot_mut(id) {
            slot.entry.name = name.clone();
            slot.entry.parent = new_parent;
        }
        self.link(new_parent, name, id);
        self.generation += 1;
        Ok(())
    }

    pub fn set_meta(&mut self, id: EntryId, meta: EntryMeta) -> Result<()> {
        self.update(id, |e| e.meta = meta)
    }

    pub fn set_kind(&mut self, id: EntryId, kind: EntryKind) -> Result<()> {
        self.update(id, |e| e.kind = kind)
    }

    /// Full path of an entry, failing with `PathTooLong` past the limit
    pub fn full_path(&self, id: EntryId) -> Result<String> {
        let path = self.path_of(id).ok_or(Error::UnknownEntry(id))?;
        if path.chars().count() > self.max_path_len {
            return Err(Error::PathTooLong {
                id,
                limit: self.max_path_len,
            });
        }
        Ok(path)
    }

    /// Full path without the length limit, for index keys
    pub fn path_of(&self, id: EntryId) -> Option<String> {
        let mut chain = Vec::with_capacity(16);
        let mut cur = Some(id);
        while let Some(cid) = cur {
            let entry = self.get(cid)?;
            chain.push(&entry.name);
            cur = entry.parent;
            if chain.len() > MAX_DEPTH {
                return None;
            }
        }

        let mut out = String::with_capacity(chain.iter().map(|n| n.len() + 1).sum());
        for (i, name) in chain.iter().rev().enumerate() {
            if i > 0 && !out.ends_with(self.separator) {
                out.push(self.separator);
            }
            out.push_str(name);
        }
        Some(out)
    }

    /// Resolve an absolute path through the roots and child links
    pub fn resolve(&self, path: &Path) -> Option<EntryId> {
        let (root, rest) = self
            .roots()
            .into_iter()
            .filter_map(|id| {
                let root_path = Path::new(&*self.get(id)?.name);
                let rest = path.strip_prefix(root_path).ok()?;
                Some((id, rest, root_path.components().count()))
            })
            .max_by_key(|&(_, _, depth)| depth)
            .map(|(id, rest, _)| (id, rest))?;

        let mut id = root;
        for component in rest.components() {
            match component {
                Component::Normal(name) => id = self.child(Some(id), name.to_str()?)?,
                Component::CurDir => {}
                _ => return None,
            }
        }
        Some(id)
    }

    /// Live entries in id order
    pub fn iter(&self) -> impl Iterator<Item = &Entry> + '_ {
        self.chunks
            .iter()
            .flat_map(|c| c.iter())
            .filter(|s| s.live)
            .map(|s| &s.entry)
    }

    /// A fresh store holding only the live entries, with ids reassigned in
    /// pre-order. Returns the store and the old -> new id mapping.
    pub fn compact(&self) -> Result<(NameStore, FxHashMap<EntryId, EntryId>)> {
        let mut fresh = NameStore::with_separator(self.max_path_len, self.separator);
        let mut mapping = FxHashMap::default();

        for root in self.roots() {
            let mut stack = vec![root];
            while let Some(old) = stack.pop() {
                let Some(entry) = self.get(old) else { continue };
                let parent = entry.parent.and_then(|p| mapping.get(&p).copied());
                let new = fresh.intern_with(parent, &entry.name, entry.kind, entry.meta)?.id();
                mapping.insert(old, new);
                let mut kids = self.children(Some(old));
                kids.reverse();
                stack.extend(kids);
            }
        }
        Ok((fresh, mapping))
    }

    fn slot(&self, id: EntryId) -> Option<&Slot> {
        let id = id as usize;
        self.chunks.get(id / CHUNK)?.get(id % CHUNK)
    }

    fn slot_mut(&mut self, id: EntryId) -> Option<&mut Slot> {
        let id = id as usize;
        let chunk = self.chunks.get_mut(id / CHUNK)?;
        Arc::make_mut(chunk).get_mut(id % CHUNK)
    }

    fn update(&mut self, id: EntryId, f: impl FnOnce(&mut Entry)) -> Result<()> {
        match self.slot_mut(id) {
            Some(slot) if slot.live => {
                f(&mut slot.entry);
                self.generation += 1;
                Ok(())
            }
            _ => Err(Error::UnknownEntry(id)),
        }
    }

    fn pooled(&mut self, name: &str) -> Arc<str> {
        let shard = self.pool.shard_for(name);
        if let Some(existing) = self.pool.get(shard).get(name) {
            return existing.clone();
        }
        let name: Arc<str> = Arc::from(name);
        self.pool.get_mut(shard).insert(name.clone());
        name
    }

    fn link(&mut self, parent: Option<EntryId>, name: Arc<str>, id: EntryId) {
        let key = parent.unwrap_or(ROOT_KEY);
        let shard = self.links.shard_for_id(key);
        self.links
            .get_mut(shard)
            .entry(key)
            .or_default()
            .insert(name, id);
    }

    fn unlink(&mut self, parent: Option<EntryId>, name: &str, id: EntryId) {
        let key = parent.unwrap_or(ROOT_KEY);
        let shard = self.links.shard_for_id(key);
        if self.links.get(shard).get(&key).and_then(|m| m.get(name)) != Some(&id) {
            return;
        }
        let map = self.links.get_mut(shard);
        if let Some(kids) = map.get_mut(&key) {
            kids.remove(name);
            if kids.is_empty() {
                map.remove(&key);
            }
        }
    }
}
