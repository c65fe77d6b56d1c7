//! Flat snapshot of the node arena.
//!
//! Records are written in index order with released slots as `null`, so
//! indices (and therefore parent/child wiring) survive a round trip. Lock
//! shards are recomputed on load.

use std::io::{Read, Write};

use rustc_hash::FxHashSet;
use sceneinfo_core::{InfoCacheError, Result};
use serde::{Deserialize, Serialize};

use crate::record::{NodeIndex, NodeRecord};
use crate::store::{NodeStore, StoreRead};

#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct CacheSnapshot {
    pub records: Vec<Option<NodeRecord>>,
    pub free_indices: Vec<NodeIndex>,
}

impl CacheSnapshot {
    pub fn capture(view: &StoreRead<'_>) -> Self {
        let records = (0..view.arena_len())
            .map(|i| {
                let index = NodeIndex(i);
                // Released but not yet purged slots are not part of the cache.
                view.read(index)
                    .filter(|record| view.lookup(&record.path) == Some(index))
                    .map(|record| record.clone())
            })
            .collect();
        Self {
            records,
            free_indices: view.free_indices().to_vec(),
        }
    }

    pub fn write_to<W: Write>(&self, writer: W) -> Result<()> {
        serde_json::to_writer(writer, self)?;
        Ok(())
    }

    pub fn read_from<R: Read>(reader: R) -> Result<Self> {
        let snapshot: Self = serde_json::from_reader(reader)?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Rejects snapshots whose wiring could not have come from a live cache.
    fn validate(&self) -> Result<()> {
        let len = self.records.len();
        let corrupt = |message: String| {
            log::warn!("Rejecting cache snapshot: {message}");
            Err(InfoCacheError::CorruptSnapshot(message))
        };

        let mut free = FxHashSet::default();
        for &index in &self.free_indices {
            if index.get() >= len {
                return corrupt(format!("free index {} is out of range", index.get()));
            }
            if self.records[index.get()].is_some() {
                return corrupt(format!("free index {} holds a record", index.get()));
            }
            if !free.insert(index) {
                return corrupt(format!("free index {} is listed twice", index.get()));
            }
        }

        let mut paths = FxHashSet::default();
        for (i, record) in self.records.iter().enumerate() {
            let Some(record) = record else {
                if !free.contains(&NodeIndex(i)) {
                    return corrupt(format!("empty slot {i} is not on the free list"));
                }
                continue;
            };
            if !paths.insert(&record.path) {
                return corrupt(format!("path '{}' appears twice", record.path));
            }
            let wired = record.parent.iter().chain(record.children.iter());
            for linked in wired {
                if self.records.get(linked.get()).is_none_or(Option::is_none) {
                    return corrupt(format!(
                        "'{}' is wired to missing index {}",
                        record.path,
                        linked.get()
                    ));
                }
            }
        }
        Ok(())
    }

    /// Replaces the contents of `store` with this snapshot.
    pub fn install(self, store: &NodeStore) {
        store.write().install(self.records, self.free_indices);
    }
}
