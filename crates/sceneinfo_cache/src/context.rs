//! Per-rebuild state shared by the passes.

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use sceneinfo_core::{InfoCacheSettings, ScenePath, Stage};

use crate::capability::ResolvedCapabilities;
use crate::record::NodeIndex;

/// Scratch data that lives for exactly one rebuild.
#[derive(Default)]
pub(crate) struct TransientState {
    /// Instancers met by the aggregate pass, resolved afterwards.
    pub instancers: Mutex<Vec<ScenePath>>,
    /// Native instances created by the builder.
    pub instance_roots: Mutex<FxHashSet<ScenePath>>,
    /// Records reset by the invalidation walk, awaiting link teardown.
    pub to_disconnect: Mutex<FxHashSet<NodeIndex>>,
    /// Paths whose memoized data was dropped during invalidation.
    pub reset_paths: Mutex<FxHashSet<ScenePath>>,
    /// Material users detached from reset materials, keyed by material path.
    pub stale_material_users: Mutex<FxHashMap<ScenePath, FxHashSet<ScenePath>>>,
    pub full_rebuild: bool,
}

impl TransientState {
    pub fn new(full_rebuild: bool) -> Self {
        Self {
            full_rebuild,
            ..Self::default()
        }
    }
}

/// Read-only inputs of a pass.
#[derive(Clone, Copy)]
pub(crate) struct PassContext<'a> {
    pub stage: &'a dyn Stage,
    pub settings: &'a InfoCacheSettings,
    pub capabilities: &'a ResolvedCapabilities,
    pub transient: &'a TransientState,
}

impl PassContext<'_> {
    /// Hidden, or carrying a purpose that is not loaded.
    pub fn is_invisible(&self, path: &ScenePath) -> bool {
        self.stage.is_invisible(path)
            || !self
                .settings
                .purposes_to_load
                .contains(self.stage.purpose(path))
    }
}
