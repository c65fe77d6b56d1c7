//! Aggregate Propagation
//!
//! Bottom-up pass computing, for every node, how many vertices and which
//! material slots its subtree would produce if translated.
//!
//! # Rules
//!
//! - Memoized nodes return their memo without descending.
//! - Children are visited in parallel; the parent combines their results.
//! - Renderable nodes add their own vertices and slots to their children's.
//! - Invisible nodes (hidden, or with a purpose that is not loaded) are still
//!   walked so their descendants get memos, but contribute nothing.
//! - Instancers contribute nothing here and are queued for the instancing
//!   pass, which needs every prototype's totals first.
//!
//! Material-user links are discovered on the way: bindings are inherited down
//! the hierarchy and every imageable node under one registers as a user.
//! A node authoring a collection binding depends on the collection members.

use rayon::prelude::*;
use sceneinfo_core::{MaterialSlot, NodeKind, ScenePath};

use crate::context::PassContext;
use crate::dependency::{
    material_user_for, register_auxiliary, register_material_users, restore_material_users,
};
use crate::record::NodeIndex;
use crate::store::StoreRead;

/// Totals handed from a child to its parent.
#[derive(Debug, Default, Clone)]
pub(crate) struct SubtreeTotals {
    pub vertex_count: u64,
    pub slots: Vec<MaterialSlot>,
}

/// Runs the pass from the absolute root.
pub(crate) fn propagate(view: &StoreRead<'_>, ctx: &PassContext<'_>) -> u64 {
    view.root()
        .map_or(0, |root| propagate_node(view, ctx, root, None).vertex_count)
}

fn propagate_node(
    view: &StoreRead<'_>,
    ctx: &PassContext<'_>,
    index: NodeIndex,
    inherited_binding: Option<&ScenePath>,
) -> SubtreeTotals {
    let (path, children) = {
        let Some(record) = view.read(index) else {
            return SubtreeTotals::default();
        };
        if let Some(vertex_count) = record.subtree_vertex_count {
            return SubtreeTotals {
                vertex_count,
                slots: record.collected_material_slots().to_vec(),
            };
        }
        (record.path.clone(), record.children.clone())
    };

    let stage = ctx.stage;
    if !stage.contains(&path) {
        return SubtreeTotals::default();
    }
    let kind = stage.kind(&path);

    if kind == NodeKind::Material {
        restore_material_users(view, ctx, index);
    }
    let binding = stage
        .direct_material_binding(&path)
        .or_else(|| inherited_binding.cloned());
    if !path.is_root() {
        register_bindings(view, ctx, &path, binding.as_ref());
    }

    let child_totals: Vec<SubtreeTotals> = children
        .par_iter()
        .map(|&child| propagate_node(view, ctx, child, binding.as_ref()))
        .collect();

    let invisible = ctx.is_invisible(&path);
    if kind == NodeKind::Instancer && !invisible {
        ctx.transient.instancers.lock().push(path);
        return SubtreeTotals::default();
    }

    let mut totals = SubtreeTotals::default();
    if !invisible {
        if kind.is_renderable() {
            totals.vertex_count = stage.vertex_count(&path);
            totals.slots = stage.material_slots(&path);
        }
        for child in child_totals {
            totals.vertex_count = totals.vertex_count.saturating_add(child.vertex_count);
            totals.slots.extend(child.slots);
        }
    }

    if let Some(mut record) = view.write(index) {
        record.subtree_vertex_count = Some(totals.vertex_count);
        record.subtree_material_slots.clone_from(&totals.slots);
    }
    totals
}

fn register_bindings(
    view: &StoreRead<'_>,
    ctx: &PassContext<'_>,
    path: &ScenePath,
    binding: Option<&ScenePath>,
) {
    for collection in ctx.stage.collection_bindings(path) {
        let users: Vec<ScenePath> = collection
            .members
            .iter()
            .filter_map(|member| material_user_for(ctx, member))
            .collect();
        register_material_users(view, &collection.material, &users);
        // Members rebuilt on their own must bring this binding back.
        register_auxiliary(view, path, &collection.members);
    }
    if let Some(material) = binding {
        if let Some(user) = material_user_for(ctx, path) {
            register_material_users(view, material, std::slice::from_ref(&user));
        }
    }
}
