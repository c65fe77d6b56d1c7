//! Geometry Cache Classification
//!
//! Finds subtrees whose static and animated meshes can be merged into a
//! single animated geometry cache.
//!
//! # Overview
//!
//! A bottom-up pass assigns every node a depth (distance to its deepest
//! animated mesh, -1 if none) and a [`GeometryCacheState`]:
//!
//! - meshes are `MESH`, unless skinned inside a skeletal root
//! - transforms are `XFORM` plus whatever their children carry
//! - scopes pass `MESH`-carrying children's flags through
//! - everything else is `UNCOLLAPSIBLE`
//!
//! Nodes referencing or payloading a recognised file type are potential roots.
//! When one has animated content below, a top-down search claims the highest
//! node in its subtree with no uncollapsible branch and a depth within the
//! configured maximum. The potential root then reports depth -1 so its
//! ancestors do not claim it again.

use std::ops::Deref;

use rayon::prelude::*;
use sceneinfo_core::{GeometryAccessor, NodeKind, ScenePath};

use crate::context::PassContext;
use crate::record::{GeometryCacheState, NodeIndex};
use crate::store::{StoreIndex, StoreRead, StoreView};

/// Runs the whole-tree classifier when enabled and the stage has animation.
pub(crate) fn classify(view: &StoreRead<'_>, ctx: &PassContext<'_>) {
    let settings = &ctx.settings.geometry_cache;
    if !settings.enabled || !settings.collapse_subtrees {
        return;
    }
    let Some(root) = view.root() else {
        return;
    };

    let paths: Vec<&ScenePath> = view.paths().map(|(path, _)| path).collect();
    if !paths.par_iter().any(|path| ctx.stage.is_animated_mesh(path)) {
        return;
    }

    let (depth, _) = classify_node(view, ctx, root, false);
    if depth > -1 {
        if depth > settings.max_depth {
            log::warn!(
                "The stage has a geometry cache {depth} levels deep, which exceeds the limit of {}",
                settings.max_depth
            );
        }
        // The absolute root never becomes a geometry cache itself.
        view.children_of(root)
            .par_iter()
            .for_each(|&child| {
                find_valid_root(view, ctx, child);
            });
    }
}

fn classify_node(
    view: &StoreRead<'_>,
    ctx: &PassContext<'_>,
    index: NodeIndex,
    inside_skel_root: bool,
) -> (i32, GeometryCacheState) {
    let Some(path) = view.path_of(index) else {
        return (-1, GeometryCacheState::empty());
    };
    let stage = ctx.stage;
    if !stage.contains(&path) {
        return (-1, GeometryCacheState::empty());
    }
    let kind = stage.kind(&path);
    let inside_skel_root = inside_skel_root || kind == NodeKind::SkelRoot;

    let children: Vec<(i32, GeometryCacheState)> = view
        .children_of(index)
        .par_iter()
        .map(|&child| classify_node(view, ctx, child, inside_skel_root))
        .collect();

    let mut depth = if stage.is_animated_mesh(&path) {
        0
    } else {
        children
            .iter()
            .filter(|(d, _)| *d > -1)
            .map(|(d, _)| d + 1)
            .max()
            .unwrap_or(-1)
    };

    let children_state = children
        .iter()
        .fold(GeometryCacheState::empty(), |acc, (_, state)| acc | *state);

    let mut state = match kind {
        NodeKind::Mesh if inside_skel_root && stage.is_skinned(&path) => {
            GeometryCacheState::UNCOLLAPSIBLE
        }
        NodeKind::Mesh => GeometryCacheState::MESH,
        NodeKind::Xform => children_state | GeometryCacheState::XFORM,
        NodeKind::Scope if children_state.intersects(GeometryCacheState::MESH) => children_state,
        _ => GeometryCacheState::UNCOLLAPSIBLE,
    };

    let settings = &ctx.settings.geometry_cache;
    let potential_root = stage
        .external_references(&path)
        .iter()
        .any(|asset| settings.accepts_asset(asset));

    if let Some(mut record) = view.write(index) {
        record.geometry_cache_depth = depth;
        record.geometry_cache_state = state;
    }

    if potential_root && depth > -1 {
        if depth > settings.max_depth {
            log::warn!(
                "Node '{path}' is potentially a geometry cache {depth} levels deep, which exceeds the limit of {}",
                settings.max_depth
            );
        }
        state = find_valid_root(view, ctx, index);
        depth = -1;
    }

    (depth, state)
}

/// Claims `index` as a root if it qualifies, otherwise marks it
/// uncollapsible and searches its collapsible children.
fn find_valid_root(view: &StoreRead<'_>, ctx: &PassContext<'_>, index: NodeIndex) -> GeometryCacheState {
    {
        let Some(mut record) = view.write(index) else {
            return GeometryCacheState::UNCOLLAPSIBLE;
        };
        let valid_depth = ctx
            .settings
            .geometry_cache
            .depth_in_range(record.geometry_cache_depth);
        if valid_depth
            && !record
                .geometry_cache_state
                .contains(GeometryCacheState::UNCOLLAPSIBLE)
        {
            record.geometry_cache_state = GeometryCacheState::VALID_ROOT;
            return GeometryCacheState::VALID_ROOT;
        }
        record.geometry_cache_state = GeometryCacheState::UNCOLLAPSIBLE;
    }

    let collapsible: Vec<NodeIndex> = view
        .children_of(index)
        .into_iter()
        .filter(|&child| {
            view.read(child).is_some_and(|r| {
                r.geometry_cache_state
                    .intersects(GeometryCacheState::COLLAPSIBLE)
            })
        })
        .collect();
    collapsible.par_iter().for_each(|&child| {
        find_valid_root(view, ctx, child);
    });

    GeometryCacheState::UNCOLLAPSIBLE
}

/// Whether the record is a claimed geometry-cache root. Unclassified records
/// are resolved lazily: animated meshes become roots on their own.
pub(crate) fn resolve_root<G, A>(view: &StoreView<'_, G>, geometry: &A, index: NodeIndex) -> bool
where
    G: Deref<Target = StoreIndex>,
    A: GeometryAccessor + ?Sized,
{
    let Some(mut record) = view.write(index) else {
        return false;
    };
    if record.geometry_cache_state.is_empty() {
        record.geometry_cache_state = if geometry.is_animated_mesh(&record.path) {
            GeometryCacheState::VALID_ROOT
        } else {
            GeometryCacheState::UNCOLLAPSIBLE
        };
    }
    record.geometry_cache_state == GeometryCacheState::VALID_ROOT
}
