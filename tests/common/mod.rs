//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use sceneinfo::{
    CapabilityRegistry, CollapsingGroupCapability, InfoCache, InfoCacheSettings, InstancerInfo,
    MaterialSlot, MemoryStage, NodeDesc, PrototypeRef, ScenePath, StandaloneCapability,
};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn p(s: &str) -> ScenePath {
    ScenePath::parse(s).unwrap()
}

pub fn slots(names: &[&str]) -> Vec<MaterialSlot> {
    names.iter().map(|name| MaterialSlot::material(name)).collect()
}

pub fn instancer(prototypes: &[(&str, u64)]) -> NodeDesc {
    NodeDesc::instancer(InstancerInfo {
        prototypes: prototypes
            .iter()
            .map(|(path, repeat_count)| PrototypeRef {
                path: p(path),
                repeat_count: *repeat_count,
            })
            .collect(),
    })
}

/// Transforms fold their subtree, cameras stand alone.
pub fn collapsing_registry() -> CapabilityRegistry {
    let mut registry = CapabilityRegistry::new();
    registry.register_shared("Xform", Arc::new(CollapsingGroupCapability));
    registry.register_shared("Camera", Arc::new(StandaloneCapability));
    registry
}

pub fn new_cache() -> InfoCache {
    InfoCache::new(InfoCacheSettings::default().with_lock_shard_count(8)).unwrap()
}

pub fn cache_with(settings: InfoCacheSettings, registry: CapabilityRegistry) -> InfoCache {
    InfoCache::with_capabilities(settings, registry).unwrap()
}

/// `/A` (group) → `/A/B` (static mesh, 100 verts, 1 slot),
/// `/A/C` (animated mesh, 50 verts, 2 slots).
pub fn scenario_a() -> MemoryStage {
    let mut stage = MemoryStage::new();
    stage.define("/A", NodeDesc::xform()).unwrap();
    stage
        .define("/A/B", NodeDesc::mesh(100).with_slots(slots(&["/Looks/Red"])))
        .unwrap();
    stage
        .define(
            "/A/C",
            NodeDesc::mesh(50)
                .animated()
                .with_slots(slots(&["/Looks/Red", "/Looks/Blue"])),
        )
        .unwrap();
    stage
}

/// Instancer `/P` stamping `/Proto` (200 verts) three times.
pub fn scenario_b() -> MemoryStage {
    let mut stage = MemoryStage::new();
    stage.define("/Proto", NodeDesc::mesh(200)).unwrap();
    stage.define("/P", instancer(&[("/Proto", 3)])).unwrap();
    stage
}

/// Every answer the cache gives about `path`, in a comparable form.
#[derive(Debug, PartialEq)]
pub struct Answers {
    pub path: ScenePath,
    pub contains: bool,
    pub children: Vec<ScenePath>,
    pub vertex_count: Option<u64>,
    pub slots: Option<Vec<MaterialSlot>>,
    pub collapsed: bool,
    pub collapse_root: bool,
    pub unwound: ScenePath,
    pub geometry_cache_root: bool,
    pub main: Vec<ScenePath>,
    pub aux: Vec<ScenePath>,
    pub material_users: Vec<ScenePath>,
}

pub fn answers(cache: &InfoCache, path: &ScenePath) -> Answers {
    let sorted = |set: rustc_hash::FxHashSet<ScenePath>| {
        let mut items: Vec<_> = set.into_iter().collect();
        items.sort();
        items
    };
    Answers {
        path: path.clone(),
        contains: cache.contains(path),
        children: cache.children(path),
        vertex_count: cache.subtree_vertex_count(path),
        slots: cache.subtree_material_slots(path),
        collapsed: cache.is_collapsed(path),
        collapse_root: cache.does_collapse_children(path),
        unwound: cache.unwind_to_non_collapsed_root(path),
        geometry_cache_root: cache.is_potential_geometry_cache_root(path),
        main: sorted(cache.main_prims(path)),
        aux: sorted(cache.auxiliary_prims(path)),
        material_users: sorted(cache.material_users(path)),
    }
}

/// Answers for every path on the stage plus every cached path.
pub fn all_answers(cache: &InfoCache, stage: &MemoryStage) -> Vec<Answers> {
    let mut paths = stage.paths();
    paths.extend(cache.known_paths());
    paths.sort();
    paths.dedup();
    paths.iter().map(|path| answers(cache, path)).collect()
}
