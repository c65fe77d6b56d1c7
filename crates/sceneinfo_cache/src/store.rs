//! Node Store
//!
//! Arena of [`NodeRecord`]s addressed by [`NodeIndex`], plus the path→index
//! map. The map has its own reader-writer lock, independent of the per-record
//! shard locks in [`ShardedLockPool`].
//!
//! # Access
//!
//! All access goes through a [`StoreView`], which holds the map lock for as
//! long as it lives:
//!
//! - [`NodeStore::read`] → [`StoreRead`]: lookups plus per-record read/write
//!   locking. This is what the parallel passes share between worker threads.
//! - [`NodeStore::write`] → [`StoreWrite`]: additionally creates and releases
//!   entries. Only the single-threaded builder and invalidator take it.
//!
//! Record guards borrow the view, so a record can never be touched without
//! the map lock held first.

use std::ops::{Deref, DerefMut};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use rustc_hash::FxHashMap;
use sceneinfo_core::ScenePath;

use crate::locks::{NodeReadGuard, NodeWriteGuard, ShardedLockPool};
use crate::record::{NodeIndex, NodeRecord};

/// The map-lock protected part of the store.
#[derive(Default)]
pub struct StoreIndex {
    pub(crate) paths: FxHashMap<ScenePath, NodeIndex>,
    /// Indices ready for reuse.
    pub(crate) free: Vec<NodeIndex>,
    /// Released indices whose records are still readable.
    pub(crate) released: Vec<NodeIndex>,
    /// One past the highest index ever handed out.
    pub(crate) arena_len: usize,
}

pub struct NodeStore {
    index: RwLock<StoreIndex>,
    pool: ShardedLockPool,
}

impl NodeStore {
    #[must_use]
    pub fn new(shard_count: usize) -> Self {
        Self {
            index: RwLock::new(StoreIndex::default()),
            pool: ShardedLockPool::new(shard_count),
        }
    }

    /// [Read] Takes the map lock shared.
    pub fn read(&self) -> StoreRead<'_> {
        StoreView {
            index: self.index.read_recursive(),
            pool: &self.pool,
        }
    }

    /// [Write] Takes the map lock exclusively.
    pub fn write(&self) -> StoreWrite<'_> {
        StoreView {
            index: self.index.write(),
            pool: &self.pool,
        }
    }

    #[inline]
    #[must_use]
    pub fn shard_count(&self) -> usize {
        self.pool.shard_count()
    }
}

/// A view holding the map lock through guard `G`.
pub struct StoreView<'a, G> {
    index: G,
    pool: &'a ShardedLockPool,
}

pub type StoreRead<'a> = StoreView<'a, RwLockReadGuard<'a, StoreIndex>>;
pub type StoreWrite<'a> = StoreView<'a, RwLockWriteGuard<'a, StoreIndex>>;

impl<G: Deref<Target = StoreIndex>> StoreView<'_, G> {
    #[inline]
    pub fn lookup(&self, path: &ScenePath) -> Option<NodeIndex> {
        self.index.paths.get(path).copied()
    }

    #[inline]
    pub fn read(&self, index: NodeIndex) -> Option<NodeReadGuard<'_>> {
        self.pool.read(index)
    }

    #[inline]
    pub fn write(&self, index: NodeIndex) -> Option<NodeWriteGuard<'_>> {
        self.pool.write(index)
    }

    pub fn read_path(&self, path: &ScenePath) -> Option<NodeReadGuard<'_>> {
        self.lookup(path).and_then(|index| self.read(index))
    }

    pub fn write_path(&self, path: &ScenePath) -> Option<NodeWriteGuard<'_>> {
        self.lookup(path).and_then(|index| self.write(index))
    }

    /// Index of the absolute root, if built.
    pub fn root(&self) -> Option<NodeIndex> {
        self.lookup(&ScenePath::root())
    }

    /// Path of a record. Copies out so no guard is held.
    pub fn path_of(&self, index: NodeIndex) -> Option<ScenePath> {
        self.read(index).map(|r| r.path.clone())
    }

    pub fn parent_of(&self, index: NodeIndex) -> Option<NodeIndex> {
        self.read(index).and_then(|r| r.parent)
    }

    pub fn children_of(&self, index: NodeIndex) -> Vec<NodeIndex> {
        self.read(index).map(|r| r.children.clone()).unwrap_or_default()
    }

    /// Number of live entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.index.paths.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.index.paths.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = (&ScenePath, NodeIndex)> {
        self.index.paths.iter().map(|(path, &index)| (path, index))
    }

    #[inline]
    pub fn arena_len(&self) -> usize {
        self.index.arena_len
    }

    pub fn free_indices(&self) -> &[NodeIndex] {
        &self.index.free
    }

    #[inline]
    pub fn shard_of(&self, index: NodeIndex) -> usize {
        self.pool.shard_of(index)
    }

    /// Nearest strict ancestor of `path` that has an entry.
    pub fn nearest_existing_ancestor(&self, path: &ScenePath) -> Option<NodeIndex> {
        path.ancestors().find_map(|ancestor| self.lookup(&ancestor))
    }
}

impl<G: DerefMut<Target = StoreIndex>> StoreView<'_, G> {
    /// Creates a blank entry for `path`, reusing a free index when possible.
    /// Wiring is left to the caller.
    pub fn create_entry(&mut self, path: ScenePath) -> NodeIndex {
        let index = match self.index.free.pop() {
            Some(index) => {
                self.index.released.retain(|&r| r != index);
                index
            }
            None => {
                let index = NodeIndex(self.index.arena_len);
                self.index.arena_len += 1;
                index
            }
        };
        let record = NodeRecord::new(path.clone(), self.pool.shard_of(index));
        self.pool.put(index, record);
        self.index.paths.insert(path, index);
        index
    }

    /// Unmaps the record's path and queues the index for reuse. The record
    /// stays readable until [`purge_released`](Self::purge_released).
    pub fn release(&mut self, index: NodeIndex) {
        if let Some(path) = self.path_of(index) {
            if self.index.paths.get(&path) == Some(&index) {
                self.index.paths.remove(&path);
            }
        }
        self.index.free.push(index);
        self.index.released.push(index);
    }

    /// Drops the data of every released record.
    pub fn purge_released(&mut self) {
        let released = std::mem::take(&mut self.index.released);
        for index in released {
            self.pool.take(index);
        }
    }

    pub fn clear(&mut self) {
        *self.index = StoreIndex::default();
        self.pool.clear();
    }

    /// Installs a fully formed arena, replacing everything.
    pub(crate) fn install(&mut self, records: Vec<Option<NodeRecord>>, free: Vec<NodeIndex>) {
        self.clear();
        self.index.arena_len = records.len();
        for (i, record) in records.into_iter().enumerate() {
            let Some(mut record) = record else { continue };
            let index = NodeIndex(i);
            record.lock_shard = self.pool.shard_of(index);
            self.index.paths.insert(record.path.clone(), index);
            self.pool.put(index, record);
        }
        self.index.free = free;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> ScenePath {
        ScenePath::parse(s).unwrap()
    }

    #[test]
    fn create_lookup_release_reuse() {
        let store = NodeStore::new(4);
        let mut view = store.write();
        let a = view.create_entry(p("/A"));
        let b = view.create_entry(p("/B"));
        assert_eq!(view.lookup(&p("/A")), Some(a));
        assert_eq!(view.read(b).unwrap().lock_shard, b.get() % 4);

        view.release(a);
        assert_eq!(view.lookup(&p("/A")), None);
        assert_eq!(view.read(a).unwrap().path, p("/A"));

        view.purge_released();
        assert!(view.read(a).is_none());

        let c = view.create_entry(p("/C"));
        assert_eq!(c, a);
        assert_eq!(view.len(), 2);
        assert_eq!(view.arena_len(), 2);
    }

    #[test]
    fn reuse_before_purge_is_not_wiped() {
        let store = NodeStore::new(2);
        let mut view = store.write();
        let a = view.create_entry(p("/A"));
        view.release(a);
        let b = view.create_entry(p("/B"));
        view.purge_released();
        assert_eq!(b, a);
        assert_eq!(view.read(b).unwrap().path, p("/B"));
    }

    #[test]
    fn nearest_existing_ancestor_skips_missing_levels() {
        let store = NodeStore::new(2);
        let mut view = store.write();
        let root = view.create_entry(ScenePath::root());
        let a = view.create_entry(p("/A"));
        assert_eq!(view.nearest_existing_ancestor(&p("/A/B/C")), Some(a));
        assert_eq!(view.nearest_existing_ancestor(&p("/X")), Some(root));
        assert_eq!(view.nearest_existing_ancestor(&ScenePath::root()), None);
    }

    #[test]
    fn read_views_share_the_map_lock() {
        let store = NodeStore::new(2);
        store.write().create_entry(ScenePath::root());
        let first = store.read();
        let second = store.read();
        assert_eq!(first.root(), second.root());
    }
}
