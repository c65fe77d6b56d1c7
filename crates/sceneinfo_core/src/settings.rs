//! Cache Settings
//!
//! Every policy knob the cache consults lives in [`InfoCacheSettings`]. There
//! is no global state: a cache is constructed with its settings and they can be
//! swapped between rebuilds.
//!
//! Settings are serde-friendly so hosts can keep them in their own config
//! files; missing fields fall back to the defaults.

use serde::{Deserialize, Serialize};

use crate::errors::{InfoCacheError, Result};
use crate::stage::Purpose;

/// Controls detection of subtrees that can be merged into a single animated
/// geometry cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometryCacheSettings {
    /// Master switch.
    pub enabled: bool,
    /// Run the whole-tree classifier. When off, roots are resolved lazily per
    /// animated mesh.
    pub collapse_subtrees: bool,
    /// Deepest allowed distance from a root down to its animated meshes.
    pub max_depth: i32,
    /// Lower-case file extensions whose references may become roots.
    pub allowed_extensions: Vec<String>,
}

impl Default for GeometryCacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            collapse_subtrees: true,
            max_depth: 15,
            allowed_extensions: ["usd", "usda", "usdc", "usdz", "abc"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl GeometryCacheSettings {
    /// Whether an asset path has one of the allowed extensions.
    #[must_use]
    pub fn accepts_asset(&self, asset_path: &str) -> bool {
        let Some((_, ext)) = asset_path.rsplit_once('.') else {
            return false;
        };
        self.allowed_extensions
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(ext))
    }

    /// Whether `depth` is inside `[0, max_depth]`.
    #[inline]
    #[must_use]
    pub fn depth_in_range(&self, depth: i32) -> bool {
        depth > -1 && depth <= self.max_depth
    }
}

/// Configuration of an `InfoCache`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InfoCacheSettings {
    /// Number of per-node lock shards.
    pub lock_shard_count: usize,
    /// Subtrees with more vertices than this never collapse into one mesh.
    pub max_collapsed_vertex_count: u64,
    /// Dedup identical slots on nodes that produce a single asset.
    pub merge_identical_material_slots: bool,
    /// Nodes with other purposes are treated as invisible.
    pub purposes_to_load: Purpose,
    /// `None` runs passes on the global rayon pool.
    pub worker_threads: Option<usize>,
    pub geometry_cache: GeometryCacheSettings,
}

impl Default for InfoCacheSettings {
    fn default() -> Self {
        Self {
            lock_shard_count: 32,
            max_collapsed_vertex_count: 5_000_000,
            merge_identical_material_slots: true,
            purposes_to_load: Purpose::DEFAULT | Purpose::PROXY | Purpose::RENDER,
            worker_threads: None,
            geometry_cache: GeometryCacheSettings::default(),
        }
    }
}

impl InfoCacheSettings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> Result<()> {
        if self.lock_shard_count == 0 {
            return Err(InfoCacheError::InvalidSettings(
                "lock_shard_count must be at least 1".into(),
            ));
        }
        if self.worker_threads == Some(0) {
            return Err(InfoCacheError::InvalidSettings(
                "worker_threads must be at least 1 when set".into(),
            ));
        }
        if self.geometry_cache.max_depth < 0 {
            return Err(InfoCacheError::InvalidSettings(format!(
                "geometry_cache.max_depth must not be negative (got {})",
                self.geometry_cache.max_depth
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn with_lock_shard_count(mut self, count: usize) -> Self {
        self.lock_shard_count = count;
        self
    }

    #[must_use]
    pub fn with_max_collapsed_vertex_count(mut self, count: u64) -> Self {
        self.max_collapsed_vertex_count = count;
        self
    }

    #[must_use]
    pub fn with_merge_identical_material_slots(mut self, merge: bool) -> Self {
        self.merge_identical_material_slots = merge;
        self
    }

    #[must_use]
    pub fn with_purposes_to_load(mut self, purposes: Purpose) -> Self {
        self.purposes_to_load = purposes;
        self
    }

    #[must_use]
    pub fn with_geometry_cache(mut self, geometry_cache: GeometryCacheSettings) -> Self {
        self.geometry_cache = geometry_cache;
        self
    }

    #[must_use]
    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = Some(threads);
        self
    }
}
