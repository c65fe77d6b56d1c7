//! Persistence & Settings Integration Tests
//!
//! Tests for:
//! - Snapshot dump/reload and rejection of bad dumps
//! - Copying one cache into another
//! - Settings serialization, validation and live changes
//! - Translated-prototype bookkeeping and clearing

mod common;

use common::*;
use sceneinfo::{InfoCache, InfoCacheError, InfoCacheSettings, NodeDesc, ScenePath};

// ============================================================================
// Snapshots
// ============================================================================

#[test]
fn snapshot_round_trip_preserves_every_answer() -> anyhow::Result<()> {
    init_logger();
    let stage = scenario_b();
    let cache = new_cache();
    cache.rebuild_all(&stage);

    let mut dump = Vec::new();
    cache.serialize(&mut dump)?;

    let restored = new_cache();
    restored.deserialize(dump.as_slice())?;
    assert_eq!(all_answers(&restored, &stage), all_answers(&cache, &stage));
    Ok(())
}

#[test]
fn restored_cache_supports_partial_rebuilds() -> anyhow::Result<()> {
    let mut stage = scenario_a();
    let cache = new_cache();
    cache.rebuild_all(&stage);
    let mut dump = Vec::new();
    cache.serialize(&mut dump)?;

    let restored = new_cache();
    restored.deserialize(dump.as_slice())?;
    stage.remove(&p("/A/C"));
    restored.rebuild_subtree(&stage, &p("/A/C"));

    let reference = new_cache();
    reference.rebuild_all(&stage);
    assert_eq!(all_answers(&restored, &stage), all_answers(&reference, &stage));
    Ok(())
}

#[test]
fn snapshot_taken_after_removal_reuses_free_slots() -> anyhow::Result<()> {
    let mut stage = scenario_a();
    let cache = new_cache();
    cache.rebuild_all(&stage);
    stage.remove(&p("/A/C"));
    cache.rebuild_subtree(&stage, &p("/A/C"));

    let mut dump = Vec::new();
    cache.serialize(&mut dump)?;
    let restored = new_cache();
    restored.deserialize(dump.as_slice())?;

    stage.define("/A/D", NodeDesc::mesh(5))?;
    restored.rebuild_subtree(&stage, &p("/A/D"));
    assert_eq!(restored.subtree_vertex_count(&p("/A")), Some(105));
    assert_eq!(restored.len(), 4);
    Ok(())
}

#[test]
fn malformed_dump_leaves_cache_untouched() {
    let cache = new_cache();
    cache.rebuild_all(&scenario_a());
    let before = cache.len();

    let result = cache.deserialize(&b"{ not json"[..]);
    assert!(matches!(result, Err(InfoCacheError::Snapshot(_))));
    assert_eq!(cache.len(), before);
    assert_eq!(cache.subtree_vertex_count(&p("/A")), Some(150));
}

#[test]
fn inconsistent_dump_is_rejected() -> anyhow::Result<()> {
    let cache = new_cache();
    cache.rebuild_all(&scenario_a());
    let mut dump = Vec::new();
    cache.serialize(&mut dump)?;

    let mut value: serde_json::Value = serde_json::from_slice(&dump)?;
    value["free_indices"]
        .as_array_mut()
        .expect("free list")
        .push(serde_json::json!(9999));
    let tampered = serde_json::to_vec(&value)?;

    let result = cache.deserialize(tampered.as_slice());
    assert!(matches!(result, Err(InfoCacheError::CorruptSnapshot(_))));
    assert_eq!(cache.subtree_vertex_count(&p("/A")), Some(150));
    Ok(())
}

// ============================================================================
// Copying
// ============================================================================

#[test]
fn copy_from_duplicates_entries_and_prototypes() {
    let stage = scenario_b();
    let source = new_cache();
    source.rebuild_all(&stage);
    source.mark_prototype_as_translated(&p("/Proto"));

    let copy = new_cache();
    copy.rebuild_all(&scenario_a());
    copy.copy_from(&source);

    assert_eq!(all_answers(&copy, &stage), all_answers(&source, &stage));
    assert!(copy.is_prototype_translated(&p("/Proto")));
    assert!(!copy.contains(&p("/A")));

    // Copying onto itself is a no-op.
    source.copy_from(&source);
    assert_eq!(source.subtree_vertex_count(&p("/P")), Some(600));
}

// ============================================================================
// Settings
// ============================================================================

#[test]
fn settings_survive_json() -> anyhow::Result<()> {
    let settings = InfoCacheSettings::default()
        .with_lock_shard_count(7)
        .with_max_collapsed_vertex_count(1234)
        .with_worker_threads(2);
    let json = serde_json::to_string(&settings)?;
    let back: InfoCacheSettings = serde_json::from_str(&json)?;
    assert_eq!(back, settings);
    Ok(())
}

#[test]
fn invalid_settings_are_rejected() {
    let result = InfoCache::new(InfoCacheSettings::default().with_lock_shard_count(0));
    assert!(matches!(result, Err(InfoCacheError::InvalidSettings(_))));

    let result = InfoCache::new(InfoCacheSettings::default().with_worker_threads(0));
    assert!(matches!(result, Err(InfoCacheError::InvalidSettings(_))));

    let mut cache = new_cache();
    let before = cache.settings().clone();
    assert!(
        cache
            .set_settings(InfoCacheSettings::default().with_lock_shard_count(0))
            .is_err()
    );
    assert_eq!(cache.settings(), &before);
}

#[test]
fn changing_shard_count_keeps_answers() -> anyhow::Result<()> {
    let mut stage = scenario_a();
    let mut cache = new_cache();
    cache.rebuild_all(&stage);
    let before = all_answers(&cache, &stage);

    cache.set_settings(InfoCacheSettings::default().with_lock_shard_count(3))?;
    assert_eq!(cache.settings().lock_shard_count, 3);
    assert_eq!(all_answers(&cache, &stage), before);

    stage.get_mut(&p("/A/B")).unwrap().vertex_count = 1;
    cache.rebuild_subtree(&stage, &p("/A/B"));
    assert_eq!(cache.subtree_vertex_count(&p("/A")), Some(51));
    Ok(())
}

#[test]
fn dedicated_worker_pool_gives_the_same_answers() -> anyhow::Result<()> {
    let stage = scenario_b();
    let pooled = InfoCache::new(InfoCacheSettings::default().with_worker_threads(2))?;
    pooled.rebuild_all(&stage);
    let global = new_cache();
    global.rebuild_all(&stage);
    assert_eq!(all_answers(&pooled, &stage), all_answers(&global, &stage));
    Ok(())
}

// ============================================================================
// Bookkeeping
// ============================================================================

#[test]
fn translated_prototypes_reset_on_full_rebuild() {
    let stage = scenario_b();
    let cache = new_cache();
    cache.rebuild_all(&stage);

    cache.mark_prototype_as_translated(&p("/Proto"));
    assert!(cache.is_prototype_translated(&p("/Proto")));

    // Partial rebuilds keep the registry.
    cache.rebuild_subtree(&stage, &p("/P"));
    assert!(cache.is_prototype_translated(&p("/Proto")));

    cache.rebuild_all(&stage);
    assert!(!cache.is_prototype_translated(&p("/Proto")));

    cache.mark_prototype_as_translated(&p("/Proto"));
    cache.reset_translated_prototypes();
    assert!(!cache.is_prototype_translated(&p("/Proto")));
}

#[test]
fn clear_empties_the_cache() {
    let cache = new_cache();
    cache.rebuild_all(&scenario_a());
    assert!(!cache.is_empty());

    cache.clear();
    assert!(cache.is_empty());
    assert_eq!(cache.len(), 0);
    assert!(cache.known_paths().is_empty());
    assert_eq!(cache.subtree_vertex_count(&ScenePath::root()), None);
}
