//! Sharded Node Locks
//!
//! Records live in a fixed number of shards, each behind its own
//! reader-writer lock. Record `i` sits in shard `i % N` at slot `i / N`, so
//! passes running on different worker threads rarely contend while the
//! path map stays read-locked for the whole pass.
//!
//! Two rules keep this deadlock free:
//! - the store's map lock is always taken before any shard lock;
//! - a shard guard is never held across a fork or while another record is
//!   being locked. Callers copy what they need and drop the guard.

use parking_lot::{MappedRwLockReadGuard, MappedRwLockWriteGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::record::{NodeIndex, NodeRecord};

/// Shared access to one record.
pub type NodeReadGuard<'a> = MappedRwLockReadGuard<'a, NodeRecord>;
/// Exclusive access to one record.
pub type NodeWriteGuard<'a> = MappedRwLockWriteGuard<'a, NodeRecord>;

pub struct ShardedLockPool {
    shards: Box<[RwLock<Vec<Option<NodeRecord>>>]>,
}

impl ShardedLockPool {
    /// Creates `shard_count` shards (at least one).
    #[must_use]
    pub fn new(shard_count: usize) -> Self {
        let shard_count = shard_count.max(1);
        Self {
            shards: (0..shard_count).map(|_| RwLock::new(Vec::new())).collect(),
        }
    }

    #[inline]
    #[must_use]
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Shard that guards `index`.
    #[inline]
    #[must_use]
    pub fn shard_of(&self, index: NodeIndex) -> usize {
        index.0 % self.shards.len()
    }

    #[inline]
    fn locate(&self, index: NodeIndex) -> (&RwLock<Vec<Option<NodeRecord>>>, usize) {
        let n = self.shards.len();
        (&self.shards[index.0 % n], index.0 / n)
    }

    /// [Read] Locks the record's shard for reading.
    pub fn read(&self, index: NodeIndex) -> Option<NodeReadGuard<'_>> {
        let (shard, slot) = self.locate(index);
        RwLockReadGuard::try_map(shard.read(), |slots| {
            slots.get(slot).and_then(Option::as_ref)
        })
        .ok()
    }

    /// [Write] Locks the record's shard for writing.
    pub fn write(&self, index: NodeIndex) -> Option<NodeWriteGuard<'_>> {
        let (shard, slot) = self.locate(index);
        RwLockWriteGuard::try_map(shard.write(), |slots| {
            slots.get_mut(slot).and_then(Option::as_mut)
        })
        .ok()
    }

    /// Stores `record` at `index`, growing the shard as needed.
    pub(crate) fn put(&self, index: NodeIndex, record: NodeRecord) {
        let (shard, slot) = self.locate(index);
        let mut slots = shard.write();
        if slots.len() <= slot {
            slots.resize_with(slot + 1, || None);
        }
        slots[slot] = Some(record);
    }

    /// Empties the slot at `index`.
    pub(crate) fn take(&self, index: NodeIndex) -> Option<NodeRecord> {
        let (shard, slot) = self.locate(index);
        shard.write().get_mut(slot).and_then(Option::take)
    }

    pub(crate) fn clear(&self) {
        for shard in &*self.shards {
            shard.write().clear();
        }
    }
}
