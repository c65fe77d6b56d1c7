//! Collapse Integration Tests
//!
//! Tests for:
//! - Collapse roots chosen through schema capabilities
//! - Standalone types, skeletal roots and the vertex limit blocking collapse
//! - Collapse queries (unwind, does-collapse, can-collapse)
//! - Collapse decisions after partial rebuilds

mod common;

use std::sync::Arc;

use common::*;
use sceneinfo::{
    CollapsingGroupCapability, InfoCacheSettings, MemoryStage, NodeDesc, NodeKind, SchemaCapability,
    SchemaQuery, ScenePath,
};

fn group_stage() -> MemoryStage {
    let mut stage = MemoryStage::new();
    stage.define("/Group", NodeDesc::xform()).unwrap();
    stage.define("/Group/A", NodeDesc::mesh(10)).unwrap();
    stage.define("/Group/B", NodeDesc::mesh(20)).unwrap();
    stage
}

// ============================================================================
// Collapse Roots
// ============================================================================

#[test]
fn collapsing_group_folds_its_subtree() {
    init_logger();
    let stage = group_stage();
    let cache = cache_with(InfoCacheSettings::default(), collapsing_registry());
    cache.rebuild_all(&stage);

    assert!(cache.does_collapse_children(&p("/Group")));
    assert!(!cache.is_collapsed(&p("/Group")));
    assert!(cache.is_collapsed(&p("/Group/A")));
    assert!(cache.is_collapsed(&p("/Group/B")));
    assert_eq!(cache.unwind_to_non_collapsed_root(&p("/Group/B")), p("/Group"));
    assert_eq!(cache.unwind_to_non_collapsed_root(&p("/Group")), p("/Group"));
}

#[test]
fn nothing_collapses_without_capabilities() {
    let stage = group_stage();
    let cache = new_cache();
    cache.rebuild_all(&stage);

    for path in stage.paths() {
        assert!(!cache.does_collapse_children(&path), "{path}");
        assert!(!cache.is_collapsed(&path), "{path}");
        assert_eq!(cache.unwind_to_non_collapsed_root(&path), path);
    }
}

#[test]
fn standalone_descendant_blocks_collapse() {
    let mut stage = group_stage();
    stage.define("/Group/Sub", NodeDesc::xform()).unwrap();
    stage
        .define("/Group/Sub/Cam", NodeDesc::of_kind(NodeKind::Imageable))
        .unwrap();
    stage.define("/Other", NodeDesc::xform()).unwrap();
    stage.define("/Other/M", NodeDesc::mesh(1)).unwrap();

    let cache = cache_with(InfoCacheSettings::default(), collapsing_registry());
    cache.rebuild_all(&stage);

    assert!(!cache.does_collapse_children(&p("/Group")));
    assert!(!cache.does_collapse_children(&p("/Group/Sub")));
    assert!(!cache.is_collapsed(&p("/Group/A")));
    assert!(cache.does_collapse_children(&p("/Other")));

    assert_eq!(cache.can_subtree_be_collapsed(&p("/Group"), &stage), Some(false));
    assert_eq!(cache.can_subtree_be_collapsed(&p("/Group/A"), &stage), Some(true));
    assert_eq!(cache.can_subtree_be_collapsed(&ScenePath::root(), &stage), Some(false));
}

#[test]
fn non_imageable_children_are_ignored() {
    let mut stage = group_stage();
    stage
        .define("/Group/Holder/Cam", NodeDesc::of_kind(NodeKind::Imageable))
        .unwrap();

    let cache = cache_with(InfoCacheSettings::default(), collapsing_registry());
    cache.rebuild_all(&stage);
    assert!(cache.does_collapse_children(&p("/Group")));

    // Asking below the typeless holder does not change the group's answer.
    assert_eq!(
        cache.can_subtree_be_collapsed(&p("/Group/Holder/Cam"), &stage),
        Some(false)
    );
    assert_eq!(cache.can_subtree_be_collapsed(&p("/Group"), &stage), Some(true));
}

#[test]
fn vertex_limit_pushes_collapse_down() {
    let mut stage = group_stage();
    stage.define("/Group/Sub", NodeDesc::xform()).unwrap();
    stage.define("/Group/Sub/Small", NodeDesc::mesh(10)).unwrap();

    let cache = cache_with(
        InfoCacheSettings::default().with_max_collapsed_vertex_count(25),
        collapsing_registry(),
    );
    cache.rebuild_all(&stage);

    assert!(!cache.does_collapse_children(&p("/Group")));
    assert!(cache.does_collapse_children(&p("/Group/Sub")));
    assert!(cache.is_collapsed(&p("/Group/Sub/Small")));
    assert!(!cache.is_collapsed(&p("/Group/A")));
}

#[test]
fn skeletal_roots_never_collapse() {
    let mut stage = MemoryStage::new();
    stage.define("/Char", NodeDesc::of_kind(NodeKind::SkelRoot)).unwrap();
    stage.define("/Char/Body", NodeDesc::mesh(10)).unwrap();

    let mut registry = collapsing_registry();
    registry.register_shared("SkelRoot", Arc::new(CollapsingGroupCapability));
    let cache = cache_with(InfoCacheSettings::default(), registry);
    cache.rebuild_all(&stage);

    assert!(!cache.does_collapse_children(&p("/Char")));
    assert!(!cache.is_collapsed(&p("/Char/Body")));
}

#[test]
fn nested_groups_collapse_at_the_top() {
    let mut stage = MemoryStage::new();
    stage.define("/Outer", NodeDesc::xform()).unwrap();
    stage.define("/Outer/Inner", NodeDesc::xform()).unwrap();
    stage.define("/Outer/Inner/Mesh", NodeDesc::mesh(3)).unwrap();

    let cache = cache_with(InfoCacheSettings::default(), collapsing_registry());
    cache.rebuild_all(&stage);

    assert!(cache.does_collapse_children(&p("/Outer")));
    // The inner group is never asked.
    assert!(!cache.does_collapse_children(&p("/Outer/Inner")));
    assert!(cache.is_collapsed(&p("/Outer/Inner")));
    assert_eq!(
        cache.unwind_to_non_collapsed_root(&p("/Outer/Inner/Mesh")),
        p("/Outer")
    );
}

/// Collapses only light subtrees.
struct LightweightGroup;

impl SchemaCapability for LightweightGroup {
    fn collapses_children(&self, query: &SchemaQuery<'_>) -> bool {
        query.subtree_vertex_count().is_some_and(|count| count < 15)
            && query.subtree_can_collapse() == Some(true)
    }
}

#[test]
fn capabilities_see_subtree_vertex_counts() {
    let mut stage = MemoryStage::new();
    for (group, vertices) in [("/Light", 5), ("/Heavy", 50)] {
        stage
            .define(group, NodeDesc::xform().with_type_name("Lightweight"))
            .unwrap();
        stage
            .define(format!("{group}/Mesh"), NodeDesc::mesh(vertices))
            .unwrap();
    }

    let mut registry = collapsing_registry();
    registry.register_shared("Lightweight", Arc::new(LightweightGroup));
    let cache = cache_with(InfoCacheSettings::default(), registry);
    cache.rebuild_all(&stage);

    assert!(cache.does_collapse_children(&p("/Light")));
    assert!(!cache.does_collapse_children(&p("/Heavy")));
}

#[test]
fn uncollapsible_subtrees_make_imageable_ancestors_uncollapsible() {
    let mut stage = MemoryStage::new();
    stage.define("/A", NodeDesc::xform()).unwrap();
    stage.define("/A/B", NodeDesc::xform()).unwrap();
    stage.define("/A/B/C", NodeDesc::scope()).unwrap();
    stage
        .define("/A/B/C/Cam", NodeDesc::of_kind(NodeKind::Imageable))
        .unwrap();
    stage.define("/A/Side", NodeDesc::mesh(4)).unwrap();

    let cache = cache_with(InfoCacheSettings::default(), collapsing_registry());
    cache.rebuild_all(&stage);

    assert_eq!(cache.can_subtree_be_collapsed(&p("/A/B/C/Cam"), &stage), Some(false));
    for ancestor in ["/A/B/C", "/A/B", "/A"] {
        assert_eq!(
            cache.can_subtree_be_collapsed(&p(ancestor), &stage),
            Some(false),
            "{ancestor}"
        );
    }
    assert_eq!(cache.can_subtree_be_collapsed(&p("/A/Side"), &stage), Some(true));
    assert_eq!(cache.can_subtree_be_collapsed(&p("/Missing"), &stage), None);
}

// ============================================================================
// Partial Rebuilds
// ============================================================================

#[test]
fn adding_and_removing_a_camera_flips_collapse() {
    let mut stage = group_stage();
    let cache = cache_with(InfoCacheSettings::default(), collapsing_registry());
    cache.rebuild_all(&stage);
    assert!(cache.does_collapse_children(&p("/Group")));

    stage
        .define("/Group/Cam", NodeDesc::of_kind(NodeKind::Imageable))
        .unwrap();
    cache.rebuild_subtree(&stage, &p("/Group/Cam"));
    assert!(!cache.does_collapse_children(&p("/Group")));
    assert!(!cache.is_collapsed(&p("/Group/A")));

    stage.remove(&p("/Group/Cam"));
    cache.rebuild_subtree(&stage, &p("/Group/Cam"));
    assert!(cache.does_collapse_children(&p("/Group")));
    assert!(cache.is_collapsed(&p("/Group/A")));
}

#[test]
fn growing_past_the_limit_stops_collapse() {
    let mut stage = group_stage();
    let cache = cache_with(
        InfoCacheSettings::default().with_max_collapsed_vertex_count(100),
        collapsing_registry(),
    );
    cache.rebuild_all(&stage);
    assert!(cache.does_collapse_children(&p("/Group")));

    stage.get_mut(&p("/Group/B")).unwrap().vertex_count = 500;
    cache.rebuild_subtree(&stage, &p("/Group/B"));
    assert!(!cache.does_collapse_children(&p("/Group")));
    assert_eq!(cache.subtree_vertex_count(&p("/Group")), Some(510));
}
