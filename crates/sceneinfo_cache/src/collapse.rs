//! Collapse Decisions
//!
//! Two related questions:
//!
//! - *Can* the subtree under a node be folded into a single asset? Answered by
//!   [`subtree_can_collapse`], memoized per node and combined over imageable
//!   children.
//! - *Does* a node fold its subtree? Answered top-down by
//!   [`query_collapses_children`], which asks the node's capability and stops
//!   descending as soon as a node collapses.
//!
//! A node that cannot collapse makes every ancestor unable to collapse too, so
//! a negative answer is painted upwards until the first ancestor that already
//! has an answer, or until the chain leaves the imageable hierarchy.

use rayon::prelude::*;
use sceneinfo_core::NodeKind;

use crate::capability::SchemaQuery;
use crate::context::PassContext;
use crate::dependency::register_auxiliary;
use crate::geometry_cache::resolve_root;
use crate::record::NodeIndex;
use crate::store::StoreRead;

/// Whether every imageable node under `index` can be collapsed into it.
pub(crate) fn subtree_can_collapse(view: &StoreRead<'_>, ctx: &PassContext<'_>, index: NodeIndex) -> bool {
    let (path, children) = {
        let Some(record) = view.read(index) else {
            return false;
        };
        if let Some(memo) = record.subtree_can_collapse {
            return memo;
        }
        (record.path.clone(), record.children.clone())
    };

    let stage = ctx.stage;
    let query = SchemaQuery::new(&path, stage);
    let mut can_collapse = ctx
        .capabilities
        .for_path(stage, &path)
        .can_collapse(&query);

    if can_collapse {
        can_collapse = children
            .par_iter()
            .filter(|&&child| {
                view.path_of(child)
                    .is_some_and(|child_path| stage.kind(&child_path).is_imageable())
            })
            .all(|&child| subtree_can_collapse(view, ctx, child));
    }

    let parent = {
        let Some(mut record) = view.write(index) else {
            return can_collapse;
        };
        record.subtree_can_collapse = Some(can_collapse);
        record.parent
    };

    if !can_collapse && stage.kind(&path).is_imageable() {
        paint_ancestors_uncollapsible(view, ctx, parent);
    }
    can_collapse
}

/// Marks ancestors uncollapsible while the chain stays imageable: a
/// non-imageable link is ignored by its parent's answer.
fn paint_ancestors_uncollapsible(view: &StoreRead<'_>, ctx: &PassContext<'_>, mut current: Option<NodeIndex>) {
    while let Some(ancestor) = current {
        let path = {
            let Some(mut record) = view.write(ancestor) else {
                break;
            };
            if record.subtree_can_collapse.is_some() {
                break;
            }
            record.subtree_can_collapse = Some(false);
            current = record.parent;
            record.path.clone()
        };
        if !ctx.stage.kind(&path).is_imageable() {
            break;
        }
    }
}

/// Top-down pass deciding which nodes fold their children into themselves.
pub(crate) fn query_collapses_children(view: &StoreRead<'_>, ctx: &PassContext<'_>, index: NodeIndex) {
    let (path, children, vertex_count) = {
        let Some(record) = view.read(index) else {
            return;
        };
        if record.collapses_children {
            return;
        }
        (
            record.path.clone(),
            record.children.clone(),
            record.subtree_vertex_count,
        )
    };

    let stage = ctx.stage;
    if !stage.contains(&path) {
        return;
    }

    let capability = ctx.capabilities.for_path(stage, &path);
    let decide = || subtree_can_collapse(view, ctx, index);
    let mut query = SchemaQuery::new(&path, stage);
    query.subtree_vertex_count = vertex_count;
    query.decider = Some(&decide);

    let collapses = is_geometry_cache_root(view, ctx, index)
        || (capability.collapses_children(&query)
            && mesh_subtree_fits(ctx, query.kind, vertex_count));

    if collapses {
        if let Some(mut record) = view.write(index) {
            record.collapses_children = true;
        }
    } else {
        children
            .par_iter()
            .for_each(|&child| query_collapses_children(view, ctx, child));
    }

    // Collapsed nodes are never visited: their collapse root already accounts
    // for the whole subtree.
    let auxiliary = capability.collect_auxiliary_paths(&query);
    register_auxiliary(view, &path, &auxiliary);
}

fn is_geometry_cache_root(view: &StoreRead<'_>, ctx: &PassContext<'_>, index: NodeIndex) -> bool {
    ctx.settings.geometry_cache.enabled && resolve_root(view, ctx.stage, index)
}

/// Skeletal roots never collapse, and neither do subtrees over the vertex limit.
fn mesh_subtree_fits(ctx: &PassContext<'_>, kind: NodeKind, vertex_count: Option<u64>) -> bool {
    if kind == NodeKind::SkelRoot {
        return false;
    }
    let Some(vertex_count) = vertex_count else {
        debug_assert!(false, "collapse queried before aggregates were collected");
        log::error!("Collapse queried before aggregates were collected; not collapsing");
        return false;
    };
    vertex_count <= ctx.settings.max_collapsed_vertex_count
}
