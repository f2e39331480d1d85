use crate::store::EntryId;
use crate::store::cow::{SHARD_COUNT, Shards};
use rayon::prelude::*;
use roaring::RoaringBitmap;
use rustc_hash::FxHashMap;
use std::cmp::Ordering;
use std::collections::btree_set;
use std::collections::{BTreeSet, BinaryHeap};
use std::ops::Bound;
use std::sync::Arc;

/// Ordered `(key, id)` set, sharded by id so a write copies one shard.
///
/// Ids break ties between equal keys, making the order total.
#[derive(Debug, Clone)]
pub struct SortedIndex<K: Ord + Clone> {
    shards: Shards<BTreeSet<(K, EntryId)>>,
    len: usize,
}

impl<K: Ord + Clone + Send + Sync> Default for SortedIndex<K> {
    fn default() -> Self {
        Self {
            shards: Shards::new(),
            len: 0,
        }
    }
}

impl<K: Ord + Clone + Send + Sync> SortedIndex<K> {
    /// Build from unsorted pairs: bucket by shard, sort buckets in parallel
    pub fn bulk_load(items: Vec<(K, EntryId)>) -> Self {
        let len = items.len();
        let mut buckets: Vec<Vec<(K, EntryId)>> = (0..SHARD_COUNT).map(|_| Vec::new()).collect();
        for item in items {
            buckets[item.1 as usize % SHARD_COUNT].push(item);
        }

        let shards: Vec<BTreeSet<(K, EntryId)>> = buckets
            .into_par_iter()
            .map(|mut bucket| {
                bucket.par_sort_unstable();
                bucket.into_iter().collect()
            })
            .collect();

        Self {
            shards: Shards::from_vec(shards),
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns false if the pair was already present
    pub fn insert(&mut self, key: K, id: EntryId) -> bool {
        let shard = self.shards.shard_for_id(id);
        let added = self.shards.get_mut(shard).insert((key, id));
        if added {
            self.len += 1;
        }
        added
    }

    /// Returns false if the pair was missing
    pub fn remove(&mut self, key: K, id: EntryId) -> bool {
        let shard = self.shards.shard_for_id(id);
        let pair = (key, id);
        if !self.shards.get(shard).contains(&pair) {
            return false;
        }
        self.shards.get_mut(shard).remove(&pair);
        self.len -= 1;
        true
    }

    pub fn contains(&self, key: K, id: EntryId) -> bool {
        let shard = self.shards.shard_for_id(id);
        self.shards.get(shard).contains(&(key, id))
    }

    /// Ids whose key falls within the bounds
    pub fn range(&self, lo: Bound<&K>, hi: Bound<&K>) -> RoaringBitmap {
        let mut out = RoaringBitmap::new();
        if range_is_empty(&lo, &hi) {
            return out;
        }

        let lo = match lo {
            Bound::Included(k) => Bound::Included((k.clone(), EntryId::MIN)),
            Bound::Excluded(k) => Bound::Excluded((k.clone(), EntryId::MAX)),
            Bound::Unbounded => Bound::Unbounded,
        };
        let hi = match hi {
            Bound::Included(k) => Bound::Included((k.clone(), EntryId::MAX)),
            Bound::Excluded(k) => Bound::Excluded((k.clone(), EntryId::MIN)),
            Bound::Unbounded => Bound::Unbounded,
        };

        for shard in self.shards.iter() {
            out.extend(shard.range((lo.clone(), hi.clone())).map(|(_, id)| *id));
        }
        out
    }

    /// All pairs in key order, merged across shards
    pub fn iter_ordered(&self, descending: bool) -> Merged<'_, K> {
        Merged::new(self.shards.iter().map(|s| s.iter()).collect(), descending)
    }
}

fn range_is_empty<K: Ord>(lo: &Bound<&K>, hi: &Bound<&K>) -> bool {
    match (lo, hi) {
        (Bound::Included(l), Bound::Included(h)) => l > h,
        (Bound::Included(l) | Bound::Excluded(l), Bound::Included(h) | Bound::Excluded(h)) => l >= h,
        _ => false,
    }
}

/// K-way merge of the per-shard iterators
pub struct Merged<'a, K> {
    iters: Vec<btree_set::Iter<'a, (K, EntryId)>>,
    heap: BinaryHeap<Head<'a, K>>,
    descending: bool,
}

struct Head<'a, K> {
    item: &'a (K, EntryId),
    src: usize,
    descending: bool,
}

impl<K: Ord> Ord for Head<'_, K> {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap
        if self.descending {
            self.item.cmp(other.item)
        } else {
            other.item.cmp(self.item)
        }
    }
}

impl<K: Ord> PartialOrd for Head<'_, K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K: Ord> PartialEq for Head<'_, K> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<K: Ord> Eq for Head<'_, K> {}

impl<'a, K: Ord> Merged<'a, K> {
    fn new(iters: Vec<btree_set::Iter<'a, (K, EntryId)>>, descending: bool) -> Self {
        let mut merged = Self {
            heap: BinaryHeap::with_capacity(iters.len()),
            iters,
            descending,
        };
        for src in 0..merged.iters.len() {
            merged.refill(src);
        }
        merged
    }

    fn refill(&mut self, src: usize) {
        let next = if self.descending {
            self.iters[src].next_back()
        } else {
            self.iters[src].next()
        };
        if let Some(item) = next {
            self.heap.push(Head {
                item,
                src,
                descending: self.descending,
            });
        }
    }
}

impl<'a, K: Ord> Iterator for Merged<'a, K> {
    type Item = &'a (K, EntryId);

    fn next(&mut self) -> Option<Self::Item> {
        let head = self.heap.pop()?;
        self.refill(head.src);
        Some(head.item)
    }
}

/// Bucketed index: exact key -> id bitmap, sharded by key hash
#[derive(Debug, Clone, Default)]
pub struct BucketIndex {
    shards: Shards<FxHashMap<Box<str>, RoaringBitmap>>,
    len: usize,
}

impl BucketIndex {
    pub fn bulk_load(items: Vec<(Box<str>, EntryId)>) -> Self {
        let mut index = Self::default();
        let mut buckets: Vec<FxHashMap<Box<str>, RoaringBitmap>> =
            (0..index.shards.len()).map(|_| FxHashMap::default()).collect();
        for (key, id) in items {
            let shard = index.shards.shard_for(&*key);
            buckets[shard].entry(key).or_default().insert(id);
            index.len += 1;
        }
        index.shards = Shards::from_vec(buckets);
        index
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn insert(&mut self, key: &str, id: EntryId) -> bool {
        let shard = self.shards.shard_for(key);
        let map = self.shards.get_mut(shard);
        let added = match map.get_mut(key) {
            Some(ids) => ids.insert(id),
            None => {
                map.insert(key.into(), RoaringBitmap::from_iter([id]));
                true
            }
        };
        if added {
            self.len += 1;
        }
        added
    }

    pub fn remove(&mut self, key: &str, id: EntryId) -> bool {
        let shard = self.shards.shard_for(key);
        if !self.shards.get(shard).get(key).is_some_and(|ids| ids.contains(id)) {
            return false;
        }
        let map = self.shards.get_mut(shard);
        if let Some(ids) = map.get_mut(key) {
            ids.remove(id);
            if ids.is_empty() {
                map.remove(key);
            }
        }
        self.len -= 1;
        true
    }

    pub fn get(&self, key: &str) -> Option<&RoaringBitmap> {
        let shard = self.shards.shard_for(key);
        self.shards.get(shard).get(key)
    }
}

/// Files and folders as two bitmaps
#[derive(Debug, Clone, Default)]
pub struct KindBitmaps {
    files: Arc<RoaringBitmap>,
    folders: Arc<RoaringBitmap>,
}

impl KindBitmaps {
    pub fn new(files: RoaringBitmap, folders: RoaringBitmap) -> Self {
        Self {
            files: Arc::new(files),
            folders: Arc::new(folders),
        }
    }

    pub fn files(&self) -> &RoaringBitmap {
        &self.files
    }

    pub fn folders(&self) -> &RoaringBitmap {
        &self.folders
    }

    /// Every indexed id
    pub fn all(&self) -> RoaringBitmap {
        self.files.as_ref() | self.folders.as_ref()
    }

    pub fn len(&self) -> u64 {
        self.files.len() + self.folders.len()
    }

    pub fn insert(&mut self, folder: bool, id: EntryId) -> bool {
        self.slot(folder).insert(id)
    }

    pub fn remove(&mut self, folder: bool, id: EntryId) -> bool {
        let present = (if folder { &self.folders } else { &self.files }).contains(id);
        present && self.slot(folder).remove(id)
    }

    fn slot(&mut self, folder: bool) -> &mut RoaringBitmap {
        Arc::make_mut(if folder { &mut self.folders } else { &mut self.files })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(bitmap: &RoaringBitmap) -> Vec<u32> {
        bitmap.iter().collect()
    }

    #[test]
    fn test_bulk_load_orders_across_shards() {
        let items: Vec<(u64, EntryId)> = (0..500u32).map(|i| ((i % 7) as u64, i)).collect();
        let index = SortedIndex::bulk_load(items);
        assert_eq!(index.len(), 500);

        let order: Vec<(u64, EntryId)> = index.iter_ordered(false).cloned().collect();
        assert_eq!(order.len(), 500);
        assert!(order.windows(2).all(|w| w[0] < w[1]));

        let reversed: Vec<(u64, EntryId)> = index.iter_ordered(true).cloned().collect();
        assert_eq!(reversed.first(), order.last());
        assert_eq!(reversed.last(), order.first());
    }

    #[test]
    fn test_range_bounds() {
        let index = SortedIndex::bulk_load(vec![(1u64, 10), (5, 11), (5, 12), (9, 13)]);

        assert_eq!(ids(&index.range(Bound::Included(&5), Bound::Included(&5))), vec![11, 12]);
        assert_eq!(ids(&index.range(Bound::Excluded(&5), Bound::Unbounded)), vec![13]);
        assert_eq!(ids(&index.range(Bound::Unbounded, Bound::Excluded(&5))), vec![10]);
        assert!(index.range(Bound::Excluded(&5), Bound::Excluded(&5)).is_empty());
        assert!(index.range(Bound::Included(&9), Bound::Included(&1)).is_empty());
    }

    #[test]
    fn test_insert_remove_report_consistency() {
        let mut index: SortedIndex<u64> = SortedIndex::default();
        assert!(index.insert(3, 1));
        assert!(!index.insert(3, 1));
        assert!(index.remove(3, 1));
        assert!(!index.remove(3, 1));
        assert!(index.is_empty());
    }

    #[test]
    fn test_snapshot_unaffected_by_insert() {
        let mut index = SortedIndex::bulk_load(vec![(1u64, 1)]);
        let snapshot = index.clone();
        index.insert(2, 2);

        assert_eq!(snapshot.len(), 1);
        assert!(!snapshot.contains(2, 2));
        assert!(index.contains(2, 2));
    }

    #[test]
    fn test_bucket_index() {
        let mut index = BucketIndex::bulk_load(vec![("txt".into(), 1), ("txt".into(), 2), ("cfg".into(), 3)]);
        assert_eq!(ids(index.get("txt").unwrap()), vec![1, 2]);

        assert!(index.remove("cfg", 3));
        assert!(index.get("cfg").is_none());
        assert!(!index.remove("cfg", 3));
        assert!(index.insert("ini", 4));
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn test_kind_bitmaps() {
        let mut kinds = KindBitmaps::default();
        kinds.insert(false, 1);
        kinds.insert(true, 2);
        assert_eq!(ids(&kinds.all()), vec![1, 2]);
        assert!(!kinds.remove(true, 1));
        assert!(kinds.remove(false, 1));
        assert_eq!(kinds.len(), 1);
    }
}
