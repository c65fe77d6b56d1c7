//! Info Cache
//!
//! [`InfoCache`] is the entry point of the crate: it owns the node store and
//! drives the rebuild pipeline over a [`Stage`].
//!
//! # Pipeline
//!
//! Every rebuild, full or partial, runs the same sequence:
//!
//! 1. **Invalidate** (partial only): reset the entries affected by the
//!    requested roots and remove the roots' old subtrees.
//! 2. **Build**: create entries for each root's subtree.
//! 3. **Aggregate**: vertex counts and material slots, bottom-up.
//! 4. **Instancing**: fold prototype totals into instancers.
//! 5. **Geometry caches**: classify animated subtrees.
//! 6. **Collapse**: decide which nodes fold their children.
//! 7. **Instance links**: tie instance contents to their sources.
//! 8. **Slot merge**: dedup slots on single-asset nodes.
//!
//! Steps 1 and 2 hold the map lock exclusively; the passes share it and
//! fan out over rayon. Rebuilds are serialized against each other, while
//! queries may run at any time and see either the old or the new answers.
//!
//! # Example
//!
//! ```rust,ignore
//! use sceneinfo_cache::InfoCache;
//! use sceneinfo_core::{InfoCacheSettings, MemoryStage, NodeDesc, ScenePath};
//!
//! let mut stage = MemoryStage::new();
//! stage.define("/A", NodeDesc::xform())?;
//! stage.define("/A/B", NodeDesc::mesh(100))?;
//!
//! let cache = InfoCache::new(InfoCacheSettings::default())?;
//! cache.rebuild_all(&stage);
//! assert_eq!(cache.subtree_vertex_count(&ScenePath::parse("/A")?), Some(100));
//! ```

use std::io::{Read, Write};
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use rayon::{ThreadPool, ThreadPoolBuilder};
use rustc_hash::FxHashSet;
use sceneinfo_core::{InfoCacheError, InfoCacheSettings, MaterialSlot, Result, ScenePath, Stage};

use crate::builder::build_subtree;
use crate::capability::CapabilityRegistry;
use crate::context::{PassContext, TransientState};
use crate::invalidation::{CleanupStats, invalidate, subtree_roots_to_rebuild};
use crate::record::{GeometryCacheState, NodeIndex, NodeRecord};
use crate::snapshot::CacheSnapshot;
use crate::store::{NodeStore, StoreRead};
use crate::{aggregate, collapse, dependency, geometry_cache, instancing, materials};

/// Concurrent, incrementally rebuildable metadata cache over a scene tree.
///
/// # Lifecycle
///
/// 1. Create with [`InfoCache::new`] or [`InfoCache::with_capabilities`]
/// 2. Populate with [`rebuild_all`](Self::rebuild_all)
/// 3. After edits, call [`rebuild_subtrees`](Self::rebuild_subtrees) with the
///    changed paths
/// 4. Query from any thread
pub struct InfoCache {
    store: NodeStore,
    settings: InfoCacheSettings,
    capabilities: CapabilityRegistry,
    pool: Option<ThreadPool>,
    rebuild_lock: Mutex<()>,
    translated_prototypes: RwLock<FxHashSet<ScenePath>>,
}

impl InfoCache {
    /// Creates an empty cache with no registered capabilities.
    ///
    /// # Errors
    ///
    /// Returns [`InfoCacheError::InvalidSettings`] if the settings do not
    /// validate, or [`InfoCacheError::WorkerPool`] if a dedicated pool was
    /// requested and could not be started.
    pub fn new(settings: InfoCacheSettings) -> Result<Self> {
        Self::with_capabilities(settings, CapabilityRegistry::new())
    }

    /// Creates an empty cache that consults `capabilities` for per-type
    /// collapse answers.
    pub fn with_capabilities(
        settings: InfoCacheSettings,
        capabilities: CapabilityRegistry,
    ) -> Result<Self> {
        settings.validate()?;
        let pool = build_pool(settings.worker_threads)?;
        log::debug!(
            "Creating info cache: {} lock shards, {}",
            settings.lock_shard_count,
            settings
                .worker_threads
                .map_or_else(|| "global worker pool".to_string(), |n| format!("{n} worker threads"))
        );
        Ok(Self {
            store: NodeStore::new(settings.lock_shard_count),
            settings,
            capabilities,
            pool,
            rebuild_lock: Mutex::new(()),
            translated_prototypes: RwLock::new(FxHashSet::default()),
        })
    }

    #[inline]
    #[must_use]
    pub fn settings(&self) -> &InfoCacheSettings {
        &self.settings
    }

    /// Replaces the settings. Cached answers are kept; they are recomputed
    /// under the new settings by the next rebuild of the affected subtrees.
    pub fn set_settings(&mut self, settings: InfoCacheSettings) -> Result<()> {
        settings.validate()?;
        if settings.worker_threads != self.settings.worker_threads {
            self.pool = build_pool(settings.worker_threads)?;
        }
        if settings.lock_shard_count != self.store.shard_count() {
            let snapshot = CacheSnapshot::capture(&self.store.read());
            self.store = NodeStore::new(settings.lock_shard_count);
            snapshot.install(&self.store);
        }
        self.settings = settings;
        Ok(())
    }

    #[inline]
    #[must_use]
    pub fn capabilities(&self) -> &CapabilityRegistry {
        &self.capabilities
    }

    #[inline]
    pub fn capabilities_mut(&mut self) -> &mut CapabilityRegistry {
        &mut self.capabilities
    }

    // ========================================================================
    // Rebuilding
    // ========================================================================

    /// Discards everything and rebuilds from the absolute root.
    pub fn rebuild_all(&self, stage: &dyn Stage) {
        self.rebuild_subtrees(stage, &[ScenePath::root()]);
    }

    pub fn rebuild_subtree(&self, stage: &dyn Stage, path: &ScenePath) {
        self.rebuild_subtrees(stage, std::slice::from_ref(path));
    }

    /// Rebuilds the subtrees rooted at `paths`, which may have been edited,
    /// added or removed on `stage` since the last rebuild.
    ///
    /// Afterwards every query answers exactly as after [`rebuild_all`](Self::rebuild_all)
    /// on the same stage.
    pub fn rebuild_subtrees(&self, stage: &dyn Stage, paths: &[ScenePath]) {
        if paths.is_empty() {
            return;
        }
        let _rebuild = self.rebuild_lock.lock();
        let started = Instant::now();

        let roots = subtree_roots_to_rebuild(paths);
        let full_rebuild = roots.len() == 1 && roots[0].is_root();
        let transient = TransientState::new(full_rebuild);

        let mut cleanup = CleanupStats::default();
        let mut created = 0;
        {
            let mut view = self.store.write();
            if full_rebuild {
                view.clear();
                self.translated_prototypes.write().clear();
            } else {
                cleanup = invalidate(&mut view, &roots, &transient);
            }
            for root in &roots {
                created += build_subtree(&mut view, stage, root, &transient);
            }
        }

        let capabilities = self.capabilities.resolve_all();
        let ctx = PassContext {
            stage,
            settings: &self.settings,
            capabilities: &capabilities,
            transient: &transient,
        };
        let total = self.in_pool(|| self.run_passes(&ctx));

        log::debug!(
            "{} rebuild of {} root(s): {} reset, {} released, {} created, {} vertices in {:?}",
            if full_rebuild { "Full" } else { "Partial" },
            roots.len(),
            cleanup.reset,
            cleanup.released,
            created,
            total,
            started.elapsed()
        );
    }

    fn run_passes(&self, ctx: &PassContext<'_>) -> u64 {
        let view = self.store.read();
        let Some(root) = view.root() else {
            return 0;
        };

        let total = aggregate::propagate(&view, ctx);
        instancing::resolve_instancers(&view, ctx);
        geometry_cache::classify(&view, ctx);
        collapse::query_collapses_children(&view, ctx, root);
        dependency::register_instance_dependencies(&view, ctx);
        materials::merge_material_slots(&view, ctx, root, false);

        view.read(root)
            .and_then(|record| record.subtree_vertex_count)
            .unwrap_or(total)
    }

    fn in_pool<R: Send>(&self, op: impl FnOnce() -> R + Send) -> R {
        match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }

    /// Drops every entry and the translated-prototype registry.
    pub fn clear(&self) {
        let _rebuild = self.rebuild_lock.lock();
        self.store.write().clear();
        self.translated_prototypes.write().clear();
    }

    // ========================================================================
    // Structure
    // ========================================================================

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.read().is_empty()
    }

    /// Number of cached nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.store.read().len()
    }

    #[must_use]
    pub fn contains(&self, path: &ScenePath) -> bool {
        self.store.read().lookup(path).is_some()
    }

    /// Cached children of `path`, in source order.
    #[must_use]
    pub fn children(&self, path: &ScenePath) -> Vec<ScenePath> {
        let view = self.store.read();
        let Some(index) = view.lookup(path) else {
            return Vec::new();
        };
        view.children_of(index)
            .into_iter()
            .filter_map(|child| view.path_of(child))
            .collect()
    }

    /// Every cached path, sorted.
    #[must_use]
    pub fn known_paths(&self) -> Vec<ScenePath> {
        let view = self.store.read();
        let mut paths: Vec<ScenePath> = view.paths().map(|(path, _)| path.clone()).collect();
        paths.sort();
        paths
    }

    /// Copy of the cached record for `path`.
    #[must_use]
    pub fn record(&self, path: &ScenePath) -> Option<NodeRecord> {
        self.store.read().read_path(path).map(|record| record.clone())
    }

    // ========================================================================
    // Collapsing
    // ========================================================================

    /// Whether an ancestor of `path` folds it into its own asset.
    #[must_use]
    pub fn is_collapsed(&self, path: &ScenePath) -> bool {
        let view = self.store.read();
        let Some(index) = view.lookup(path) else {
            return false;
        };
        ancestors(&view, index).any(|ancestor| collapses(&view, ancestor))
    }

    /// Whether `path` is a collapse root: it folds its children and is not
    /// itself folded into an ancestor.
    #[must_use]
    pub fn does_collapse_children(&self, path: &ScenePath) -> bool {
        let view = self.store.read();
        let Some(index) = view.lookup(path) else {
            return false;
        };
        collapses(&view, index) && !ancestors(&view, index).any(|ancestor| collapses(&view, ancestor))
    }

    /// The collapse root that produces the asset for `path`, or `path` itself
    /// when nothing collapses it.
    #[must_use]
    pub fn unwind_to_non_collapsed_root(&self, path: &ScenePath) -> ScenePath {
        let view = self.store.read();
        let Some(index) = view.lookup(path) else {
            return path.clone();
        };
        std::iter::once(index)
            .chain(ancestors(&view, index))
            .filter(|&node| collapses(&view, node))
            .last()
            .and_then(|root| view.path_of(root))
            .unwrap_or_else(|| path.clone())
    }

    /// Answers the subtree-collapsibility question for one node on demand,
    /// memoizing along the way. `None` if `path` is not cached.
    #[must_use]
    pub fn can_subtree_be_collapsed(&self, path: &ScenePath, stage: &dyn Stage) -> Option<bool> {
        let capabilities = self.capabilities.resolve_all();
        let transient = TransientState::new(false);
        let ctx = PassContext {
            stage,
            settings: &self.settings,
            capabilities: &capabilities,
            transient: &transient,
        };
        self.in_pool(|| {
            let view = self.store.read();
            let index = view.lookup(path)?;
            Some(collapse::subtree_can_collapse(&view, &ctx, index))
        })
    }

    // ========================================================================
    // Geometry caches
    // ========================================================================

    /// Whether the classifier claimed `path` as a geometry-cache root.
    #[must_use]
    pub fn is_potential_geometry_cache_root(&self, path: &ScenePath) -> bool {
        self.store
            .read()
            .read_path(path)
            .is_some_and(|record| record.geometry_cache_state == GeometryCacheState::VALID_ROOT)
    }

    /// Like [`is_potential_geometry_cache_root`](Self::is_potential_geometry_cache_root),
    /// classifying `path` on demand if no classifier pass has reached it.
    #[must_use]
    pub fn resolve_geometry_cache_root(&self, path: &ScenePath, stage: &dyn Stage) -> bool {
        if !self.settings.geometry_cache.enabled {
            return false;
        }
        let view = self.store.read();
        view.lookup(path)
            .is_some_and(|index| geometry_cache::resolve_root(&view, stage, index))
    }

    // ========================================================================
    // Aggregates
    // ========================================================================

    #[must_use]
    pub fn subtree_vertex_count(&self, path: &ScenePath) -> Option<u64> {
        self.store
            .read()
            .read_path(path)
            .and_then(|record| record.subtree_vertex_count)
    }

    #[must_use]
    pub fn subtree_material_slot_count(&self, path: &ScenePath) -> Option<usize> {
        self.store
            .read()
            .read_path(path)
            .map(|record| record.subtree_material_slots.len())
    }

    #[must_use]
    pub fn subtree_material_slots(&self, path: &ScenePath) -> Option<Vec<MaterialSlot>> {
        self.store
            .read()
            .read_path(path)
            .map(|record| record.subtree_material_slots.clone())
    }

    // ========================================================================
    // Dependencies
    // ========================================================================

    /// Nodes that depend on `path`, plus `path` itself.
    #[must_use]
    pub fn main_prims(&self, path: &ScenePath) -> FxHashSet<ScenePath> {
        let mut result = self
            .store
            .read()
            .read_path(path)
            .map(|record| record.main_prims.clone())
            .unwrap_or_default();
        result.insert(path.clone());
        result
    }

    /// Nodes `path` depends on, plus `path` itself.
    #[must_use]
    pub fn auxiliary_prims(&self, path: &ScenePath) -> FxHashSet<ScenePath> {
        let mut result = self
            .store
            .read()
            .read_path(path)
            .map(|record| record.aux_prims.clone())
            .unwrap_or_default();
        result.insert(path.clone());
        result
    }

    /// Nodes rendering with the material at `path`.
    #[must_use]
    pub fn material_users(&self, path: &ScenePath) -> FxHashSet<ScenePath> {
        self.store
            .read()
            .read_path(path)
            .map(|record| record.material_user_main_prims.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn is_material_used(&self, path: &ScenePath) -> bool {
        self.store
            .read()
            .read_path(path)
            .is_some_and(|record| !record.material_user_main_prims.is_empty())
    }

    // ========================================================================
    // Translated prototypes
    // ========================================================================

    pub fn reset_translated_prototypes(&self) {
        self.translated_prototypes.write().clear();
    }

    #[must_use]
    pub fn is_prototype_translated(&self, prototype: &ScenePath) -> bool {
        self.translated_prototypes.read().contains(prototype)
    }

    pub fn mark_prototype_as_translated(&self, prototype: &ScenePath) {
        self.translated_prototypes.write().insert(prototype.clone());
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Writes the node arena as JSON.
    pub fn serialize<W: Write>(&self, writer: W) -> Result<()> {
        CacheSnapshot::capture(&self.store.read()).write_to(writer)
    }

    /// Replaces the contents with a dump written by [`serialize`](Self::serialize).
    /// On error the cache is left untouched.
    pub fn deserialize<R: Read>(&self, reader: R) -> Result<()> {
        let snapshot = CacheSnapshot::read_from(reader)?;
        let _rebuild = self.rebuild_lock.lock();
        snapshot.install(&self.store);
        Ok(())
    }

    /// Replaces the contents with a copy of `other`'s.
    pub fn copy_from(&self, other: &InfoCache) {
        if std::ptr::eq(self, other) {
            return;
        }
        let snapshot = CacheSnapshot::capture(&other.store.read());
        let prototypes = other.translated_prototypes.read().clone();

        let _rebuild = self.rebuild_lock.lock();
        snapshot.install(&self.store);
        *self.translated_prototypes.write() = prototypes;
    }
}

impl std::fmt::Debug for InfoCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InfoCache")
            .field("entries", &self.len())
            .field("settings", &self.settings)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

fn build_pool(worker_threads: Option<usize>) -> Result<Option<ThreadPool>> {
    worker_threads
        .map(|threads| {
            ThreadPoolBuilder::new()
                .num_threads(threads)
                .thread_name(|i| format!("sceneinfo-worker-{i}"))
                .build()
                .map_err(|e| InfoCacheError::WorkerPool(e.to_string()))
        })
        .transpose()
}

fn ancestors<'v>(view: &'v StoreRead<'_>, index: NodeIndex) -> impl Iterator<Item = NodeIndex> + 'v {
    std::iter::successors(view.parent_of(index), |&node| view.parent_of(node))
}

fn collapses(view: &StoreRead<'_>, index: NodeIndex) -> bool {
    view.read(index).is_some_and(|record| record.collapses_children)
}
