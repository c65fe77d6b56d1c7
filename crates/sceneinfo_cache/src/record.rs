//! Node Records
//!
//! One [`NodeRecord`] exists per cached path. Wiring fields (`path`, `parent`,
//! `children`, `lock_shard`) are written only under the store's map write lock.
//! Everything else is collected by the passes under the node's shard lock.

use bitflags::bitflags;
use rustc_hash::FxHashSet;
use sceneinfo_core::{MaterialSlot, ScenePath};
use serde::{Deserialize, Serialize};

/// Index of a record in the node arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeIndex(pub(crate) usize);

impl NodeIndex {
    #[inline]
    #[must_use]
    pub fn get(self) -> usize {
        self.0
    }
}

bitflags! {
    /// Geometry-cache classification of a node.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct GeometryCacheState: u8 {
        const UNCOLLAPSIBLE = 0x01;
        const MESH          = 0x02;
        const XFORM         = 0x04;
        const COLLAPSIBLE   = Self::MESH.bits() | Self::XFORM.bits();
        const VALID_ROOT    = 0x08;
    }
}

/// Everything the cache knows about one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub path: ScenePath,
    pub parent: Option<NodeIndex>,
    pub children: Vec<NodeIndex>,
    pub lock_shard: usize,

    pub collapses_children: bool,
    pub subtree_can_collapse: Option<bool>,
    pub subtree_vertex_count: Option<u64>,
    pub subtree_material_slots: Vec<MaterialSlot>,
    pub slots_were_merged: bool,
    /// Pre-merge slots, kept only when merging dropped duplicates. Parents
    /// always aggregate the unmerged list.
    pub unmerged_material_slots: Option<Vec<MaterialSlot>>,

    /// Distance down to the deepest animated mesh, -1 when there is none.
    pub geometry_cache_depth: i32,
    pub geometry_cache_state: GeometryCacheState,

    /// Nodes that use this material. Mirrored only into the users' `aux_prims`.
    pub material_user_main_prims: FxHashSet<ScenePath>,
    /// Nodes that depend on this one.
    pub main_prims: FxHashSet<ScenePath>,
    /// Nodes this one depends on.
    pub aux_prims: FxHashSet<ScenePath>,
    pub instance_aux_registered: bool,
}

impl NodeRecord {
    #[must_use]
    pub fn new(path: ScenePath, lock_shard: usize) -> Self {
        Self {
            path,
            parent: None,
            children: Vec::new(),
            lock_shard,
            collapses_children: false,
            subtree_can_collapse: None,
            subtree_vertex_count: None,
            subtree_material_slots: Vec::new(),
            slots_were_merged: false,
            unmerged_material_slots: None,
            geometry_cache_depth: -1,
            geometry_cache_state: GeometryCacheState::empty(),
            material_user_main_prims: FxHashSet::default(),
            main_prims: FxHashSet::default(),
            aux_prims: FxHashSet::default(),
            instance_aux_registered: false,
        }
    }

    /// Clears every memoized field. Path, wiring and dependency links survive;
    /// links are torn down separately once the reset walk has followed them.
    pub fn reset_collected_info(&mut self) {
        self.collapses_children = false;
        self.subtree_can_collapse = None;
        self.subtree_vertex_count = None;
        self.subtree_material_slots.clear();
        self.slots_were_merged = false;
        self.unmerged_material_slots = None;
        self.geometry_cache_depth = -1;
        self.geometry_cache_state = GeometryCacheState::empty();
        self.instance_aux_registered = false;
    }

    /// Slots as collected by the aggregate pass, before any merging.
    #[must_use]
    pub fn collected_material_slots(&self) -> &[MaterialSlot] {
        self.unmerged_material_slots
            .as_deref()
            .unwrap_or(&self.subtree_material_slots)
    }

    /// Whether the aggregate pass still has to visit this record.
    #[inline]
    #[must_use]
    pub fn is_reset(&self) -> bool {
        self.subtree_vertex_count.is_none()
    }
}
