//! Dependency Registrar
//!
//! Records which nodes depend on which, so that invalidating one node can
//! find every other node whose collected data was derived from it.
//!
//! # Link kinds
//!
//! - **Aux/Main**: `main` depends on `aux`. Stored on both sides:
//!   `aux ∈ main.aux_prims` and `main ∈ aux.main_prims`.
//! - **Material users**: a material lists its users in
//!   `material_user_main_prims`, and each user lists the material in its
//!   `aux_prims`. The material's `main_prims` is left alone, so editing a
//!   material does not invalidate every mesh that uses it.
//!
//! A link is only recorded when both ends have an entry.

use std::collections::BTreeSet;
use std::ops::Deref;

use rayon::prelude::*;
use rustc_hash::FxHashSet;
use sceneinfo_core::{NodeKind, ScenePath};

use crate::context::{PassContext, TransientState};
use crate::record::NodeIndex;
use crate::store::{StoreIndex, StoreRead, StoreView, StoreWrite};

// ─── Registration ──────────────────────────────────────────────────────────

/// Records that `main` depends on each of `aux_paths`.
pub fn register_auxiliary<G: Deref<Target = StoreIndex>>(
    view: &StoreView<'_, G>,
    main: &ScenePath,
    aux_paths: &[ScenePath],
) {
    if aux_paths.is_empty() {
        return;
    }
    let Some(main_index) = view.lookup(main) else {
        return;
    };
    let existing: Vec<&ScenePath> = aux_paths
        .iter()
        .filter(|aux| *aux != main && view.lookup(aux).is_some())
        .collect();
    if existing.is_empty() {
        return;
    }

    if let Some(mut record) = view.write(main_index) {
        record.aux_prims.extend(existing.iter().map(|p| (*p).clone()));
    }
    for aux in existing {
        if let Some(mut record) = view.write_path(aux) {
            record.main_prims.insert(main.clone());
        }
    }
}

/// Records that each of `users` renders with `material`.
pub fn register_material_users<G: Deref<Target = StoreIndex>>(
    view: &StoreView<'_, G>,
    material: &ScenePath,
    users: &[ScenePath],
) {
    if users.is_empty() {
        return;
    }
    let Some(material_index) = view.lookup(material) else {
        return;
    };
    let existing: Vec<&ScenePath> = users
        .iter()
        .filter(|user| view.lookup(user).is_some())
        .collect();

    if let Some(mut record) = view.write(material_index) {
        record
            .material_user_main_prims
            .extend(existing.iter().map(|p| (*p).clone()));
    }
    for user in existing {
        if let Some(mut record) = view.write_path(user) {
            record.aux_prims.insert(material.clone());
        }
    }
}

/// Node registered as the user of a material bound on `path`, if any.
/// Geometry subsets register their mesh.
pub(crate) fn material_user_for(ctx: &PassContext<'_>, path: &ScenePath) -> Option<ScenePath> {
    match ctx.stage.kind(path) {
        NodeKind::GeomSubset => path.parent(),
        kind if kind.is_imageable() => Some(path.clone()),
        _ => None,
    }
}

/// Re-attaches users stashed when this material was reset. Users that were
/// themselves reset re-register on their own if they are still bound.
pub(crate) fn restore_material_users(view: &StoreRead<'_>, ctx: &PassContext<'_>, material: NodeIndex) {
    let Some(path) = view.path_of(material) else {
        return;
    };
    let stashed = ctx.transient.stale_material_users.lock().get(&path).cloned();
    let Some(stashed) = stashed else {
        return;
    };
    let users: Vec<ScenePath> = {
        let reset = ctx.transient.reset_paths.lock();
        stashed.into_iter().filter(|u| !reset.contains(u)).collect()
    };
    register_material_users(view, &path, &users);
}

// ─── Teardown ──────────────────────────────────────────────────────────────

/// Drops every link of every record reset during invalidation, on both sides.
/// Material users are stashed so an unchanged material can restore them.
pub(crate) fn disconnect_reset_links(view: &StoreWrite<'_>, transient: &TransientState) {
    let indices: Vec<NodeIndex> = transient.to_disconnect.lock().drain().collect();
    let mut stale = transient.stale_material_users.lock();

    for index in indices {
        let (path, aux, main, users) = {
            let Some(mut record) = view.write(index) else {
                continue;
            };
            (
                record.path.clone(),
                std::mem::take(&mut record.aux_prims),
                std::mem::take(&mut record.main_prims),
                std::mem::take(&mut record.material_user_main_prims),
            )
        };

        for aux_path in &aux {
            if let Some(mut other) = view.write_path(aux_path) {
                other.main_prims.remove(&path);
                other.material_user_main_prims.remove(&path);
            }
        }
        for main_path in main.iter().chain(users.iter()) {
            if let Some(mut other) = view.write_path(main_path) {
                other.aux_prims.remove(&path);
            }
        }
        if !users.is_empty() {
            stale.entry(path).or_default().extend(users);
        }
    }
}

// ─── Instance fan-out ──────────────────────────────────────────────────────

/// Makes every node inside a native instance depend on its path-relative
/// counterpart in the instance's composition sources.
pub(crate) fn register_instance_dependencies(view: &StoreRead<'_>, ctx: &PassContext<'_>) {
    let stage = ctx.stage;
    let prototypes: Vec<ScenePath> = if ctx.transient.full_rebuild {
        stage.prototypes()
    } else {
        let touched: BTreeSet<ScenePath> = {
            let roots = ctx.transient.instance_roots.lock();
            let reset = ctx.transient.reset_paths.lock();
            roots
                .iter()
                .chain(reset.iter())
                .filter_map(|path| stage.prototype_of(path))
                .collect()
        };
        touched.into_iter().collect()
    };

    prototypes
        .par_iter()
        .for_each(|prototype| register_prototype_instances(view, ctx, prototype));
}

fn register_prototype_instances(view: &StoreRead<'_>, ctx: &PassContext<'_>, prototype: &ScenePath) {
    let instances = ctx.stage.instances(prototype);
    let Some(first) = instances.first() else {
        return;
    };
    // Every instance of a prototype shares the same arcs.
    let sources = ctx.stage.local_arc_sources(first);
    if sources.is_empty() {
        return;
    }

    instances
        .par_iter()
        .for_each(|instance| register_instance(view, instance, &sources));
}

fn register_instance(view: &StoreRead<'_>, instance: &ScenePath, sources: &[ScenePath]) {
    let Some(index) = view.lookup(instance) else {
        return;
    };
    {
        let Some(mut record) = view.write(index) else {
            return;
        };
        if record.instance_aux_registered {
            return;
        }
        record.instance_aux_registered = true;
    }

    register_auxiliary(view, instance, sources);

    let mut pending = view.children_of(index);
    let mut seen = FxHashSet::default();
    while let Some(child) = pending.pop() {
        if !seen.insert(child) {
            continue;
        }
        let Some(child_path) = view.path_of(child) else {
            continue;
        };
        if let Some(relative) = child_path.relative_to(instance) {
            let counterparts: Vec<ScenePath> = sources
                .iter()
                .filter_map(|source| source.join_relative(relative).ok())
                .collect();
            register_auxiliary(view, &child_path, &counterparts);
        }
        pending.extend(view.children_of(child));
    }
}
