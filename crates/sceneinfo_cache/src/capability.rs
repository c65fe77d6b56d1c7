//! Schema Capabilities
//!
//! The cache does not know how any particular node type turns into assets.
//! It asks a [`SchemaCapability`] registered for the node's schema type:
//!
//! - can this node be folded into an ancestor's single asset?
//! - does this node fold all of its descendants into itself?
//! - which other nodes does its translation read from?
//!
//! Types without a registration get [`PermissiveCapability`]: collapsible,
//! never collapsing its children, no extra dependencies.
//!
//! # Usage
//!
//! ```rust,ignore
//! let mut registry = CapabilityRegistry::new();
//! registry.register_shared("Xform", Arc::new(CollapsingGroupCapability));
//! let cache = InfoCache::with_capabilities(settings, registry)?;
//! ```

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use sceneinfo_core::{NodeKind, ScenePath, Stage, TypeTag};

/// Query handed to a capability for one node.
pub struct SchemaQuery<'a> {
    pub path: &'a ScenePath,
    pub kind: NodeKind,
    pub stage: &'a dyn Stage,
    pub(crate) subtree_vertex_count: Option<u64>,
    pub(crate) decider: Option<&'a (dyn Fn() -> bool + Sync + 'a)>,
}

impl<'a> SchemaQuery<'a> {
    pub(crate) fn new(path: &'a ScenePath, stage: &'a dyn Stage) -> Self {
        Self {
            path,
            kind: stage.kind(path),
            stage,
            subtree_vertex_count: None,
            decider: None,
        }
    }

    /// Aggregated vertex count of the node's subtree, once computed.
    #[must_use]
    pub fn subtree_vertex_count(&self) -> Option<u64> {
        self.subtree_vertex_count
    }

    /// Whether every geometry-relevant node below can be folded into this
    /// one. `None` while the collapse decision itself is being made.
    #[must_use]
    pub fn subtree_can_collapse(&self) -> Option<bool> {
        self.decider.map(|decide| decide())
    }
}

/// Per-schema answers the cache needs.
pub trait SchemaCapability: Send + Sync {
    fn can_collapse(&self, _query: &SchemaQuery<'_>) -> bool {
        true
    }

    fn collapses_children(&self, _query: &SchemaQuery<'_>) -> bool {
        false
    }

    /// Paths whose changes must invalidate this node.
    fn collect_auxiliary_paths(&self, _query: &SchemaQuery<'_>) -> Vec<ScenePath> {
        Vec::new()
    }
}

/// Fallback for unregistered types.
#[derive(Debug, Clone, Copy, Default)]
pub struct PermissiveCapability;

impl SchemaCapability for PermissiveCapability {}

/// Grouping type that folds its whole subtree into one asset whenever the
/// subtree allows it.
#[derive(Debug, Clone, Copy, Default)]
pub struct CollapsingGroupCapability;

impl SchemaCapability for CollapsingGroupCapability {
    fn collapses_children(&self, query: &SchemaQuery<'_>) -> bool {
        query.subtree_can_collapse().unwrap_or(false)
    }
}

/// Type whose nodes must always stay separate assets (cameras, lights...).
#[derive(Debug, Clone, Copy, Default)]
pub struct StandaloneCapability;

impl SchemaCapability for StandaloneCapability {
    fn can_collapse(&self, _query: &SchemaQuery<'_>) -> bool {
        false
    }
}

/// Builds the capability for one schema type.
pub type CapabilityFactory = Arc<dyn Fn() -> Arc<dyn SchemaCapability> + Send + Sync>;

/// Type tag → capability factory.
#[derive(Clone, Default)]
pub struct CapabilityRegistry {
    factories: FxHashMap<TypeTag, CapabilityFactory>,
}

impl CapabilityRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, type_name: &str, factory: F)
    where
        F: Fn() -> Arc<dyn SchemaCapability> + Send + Sync + 'static,
    {
        self.factories.insert(TypeTag::new(type_name), Arc::new(factory));
    }

    /// Registers one shared instance for every resolution.
    pub fn register_shared(&mut self, type_name: &str, capability: Arc<dyn SchemaCapability>) {
        self.register(type_name, move || Arc::clone(&capability));
    }

    pub fn unregister(&mut self, type_name: &str) -> bool {
        TypeTag::get(type_name).is_some_and(|tag| self.factories.remove(&tag).is_some())
    }

    #[must_use]
    pub fn is_registered(&self, type_name: &str) -> bool {
        TypeTag::get(type_name).is_some_and(|tag| self.factories.contains_key(&tag))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Instantiates every registered capability once.
    #[must_use]
    pub fn resolve_all(&self) -> ResolvedCapabilities {
        ResolvedCapabilities {
            by_tag: self
                .factories
                .iter()
                .map(|(tag, factory)| (*tag, factory()))
                .collect(),
            fallback: Arc::new(PermissiveCapability),
        }
    }
}

impl fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.factories.keys().map(|tag| tag.as_str()).collect();
        names.sort_unstable();
        f.debug_struct("CapabilityRegistry")
            .field("types", &names)
            .finish()
    }
}

/// Capabilities instantiated for one rebuild.
pub struct ResolvedCapabilities {
    by_tag: FxHashMap<TypeTag, Arc<dyn SchemaCapability>>,
    fallback: Arc<dyn SchemaCapability>,
}

impl ResolvedCapabilities {
    #[must_use]
    pub fn get(&self, tag: Option<TypeTag>) -> &dyn SchemaCapability {
        tag.and_then(|tag| self.by_tag.get(&tag))
            .unwrap_or(&self.fallback)
            .as_ref()
    }

    /// Capability of the node at `path` on `stage`.
    #[must_use]
    pub fn for_path(&self, stage: &dyn Stage, path: &ScenePath) -> &dyn SchemaCapability {
        self.get(stage.type_tag(path))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn unknown_types_fall_back_to_permissive() {
        let resolved = CapabilityRegistry::new().resolve_all();
        let stage = sceneinfo_core::MemoryStage::new();
        let root = ScenePath::root();
        let query = SchemaQuery::new(&root, &stage);
        let capability = resolved.get(Some(TypeTag::new("Unregistered")));
        assert!(capability.can_collapse(&query));
        assert!(!capability.collapses_children(&query));
        assert!(capability.collect_auxiliary_paths(&query).is_empty());
    }

    #[test]
    fn factories_run_once_per_resolution() {
        static CALLS: AtomicUsize = AtomicUsize::new(0);
        let mut registry = CapabilityRegistry::new();
        registry.register("Camera", || {
            CALLS.fetch_add(1, Ordering::SeqCst);
            Arc::new(StandaloneCapability)
        });
        assert!(registry.is_registered("Camera"));

        let resolved = registry.resolve_all();
        for _ in 0..5 {
            let _ = resolved.get(Some(TypeTag::new("Camera")));
        }
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);

        assert!(registry.unregister("Camera"));
        assert!(!registry.is_registered("Camera"));
    }

    #[test]
    fn collapsing_group_follows_decider() {
        let stage = sceneinfo_core::MemoryStage::new();
        let root = ScenePath::root();
        let yes = || true;
        let mut query = SchemaQuery::new(&root, &stage);
        assert!(!CollapsingGroupCapability.collapses_children(&query));
        query.decider = Some(&yes);
        assert!(CollapsingGroupCapability.collapses_children(&query));
    }
}
