//! Copy-on-write shards.
//!
//! Each shard sits behind its own `Arc`. Cloning a [`Shards`] clones the
//! `Arc`s only, and the first write to a shard after a clone copies that one
//! shard (`Arc::make_mut`). Readers keep the untouched copy.

use rustc_hash::FxHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

pub const SHARD_COUNT: usize = 64;

#[derive(Debug, Clone)]
pub struct Shards<T> {
    shards: Vec<Arc<T>>,
}

impl<T: Clone + Default> Shards<T> {
    pub fn new() -> Self {
        Self::from_vec((0..SHARD_COUNT).map(|_| T::default()).collect())
    }

    pub fn from_vec(shards: Vec<T>) -> Self {
        debug_assert!(!shards.is_empty());
        Self {
            shards: shards.into_iter().map(Arc::new).collect(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.shards.len()
    }

    #[inline]
    pub fn get(&self, shard: usize) -> &T {
        &self.shards[shard]
    }

    /// Mutable access, copying the shard first if a snapshot shares it
    #[inline]
    pub fn get_mut(&mut self, shard: usize) -> &mut T {
        Arc::make_mut(&mut self.shards[shard])
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.shards.iter().map(|s| s.as_ref())
    }

    /// Shard owning a hashable key
    #[inline]
    pub fn shard_for<K: Hash + ?Sized>(&self, key: &K) -> usize {
        let mut hasher = FxHasher::default();
        key.hash(&mut hasher);
        (hasher.finish() % self.shards.len() as u64) as usize
    }

    /// Shard owning an entry id
    #[inline]
    pub fn shard_for_id(&self, id: u32) -> usize {
        id as usize % self.shards.len()
    }

    /// Number of shards currently shared with another clone
    #[cfg(test)]
    pub fn shared_count(&self) -> usize {
        self.shards.iter().filter(|s| Arc::strong_count(s) > 1).count()
    }
}

impl<T: Clone + Default> Default for Shards<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_copies_one_shard() {
        let mut shards: Shards<Vec<u32>> = Shards::new();
        let snapshot = shards.clone();
        assert_eq!(shards.shared_count(), SHARD_COUNT);

        let idx = shards.shard_for_id(7);
        shards.get_mut(idx).push(7);

        assert_eq!(shards.shared_count(), SHARD_COUNT - 1);
        assert_eq!(shards.get(idx), &vec![7]);
        assert!(snapshot.get(idx).is_empty());
    }

    #[test]
    fn test_shard_for_is_stable() {
        let shards: Shards<Vec<u32>> = Shards::new();
        assert_eq!(shards.shard_for("report.txt"), shards.shard_for("report.txt"));
        assert!(shards.shard_for("report.txt") < SHARD_COUNT);
    }
}
