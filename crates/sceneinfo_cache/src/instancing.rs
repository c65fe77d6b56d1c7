//! Instancing Resolution
//!
//! Instancers can stamp any subtree of the scene, including other instancers,
//! so their totals are only known once every prototype has been aggregated.
//! This pass runs after the aggregate pass:
//!
//! 1. Order the queued instancers so that an instancer living inside another
//!    one's prototype is resolved first (ties broken lexically).
//! 2. Set each instancer's totals to `Σ prototype total × repeat count`.
//! 3. Recompute every ancestor from its children's memos, up to the first
//!    ancestor that is an instancer itself (it will be resolved on its own).
//!
//! Ancestor slots end up in child order whether the instancer was resolved in
//! this pass or memoized by an earlier one.

use std::collections::BTreeSet;

use sceneinfo_core::{InstancerInfo, NodeKind, ScenePath};

use crate::context::PassContext;
use crate::dependency::register_auxiliary;
use crate::record::NodeIndex;
use crate::store::StoreRead;

/// Resolves every instancer queued by the aggregate pass.
pub(crate) fn resolve_instancers(view: &StoreRead<'_>, ctx: &PassContext<'_>) {
    let queued = std::mem::take(&mut *ctx.transient.instancers.lock());
    if queued.is_empty() {
        return;
    }
    let instancers: Vec<(ScenePath, InstancerInfo)> = queued
        .into_iter()
        .map(|path| {
            let info = ctx.stage.instancer(&path).unwrap_or_default();
            (path, info)
        })
        .collect();

    for index in resolution_order(&instancers) {
        let (path, info) = &instancers[index];
        resolve_one(view, ctx, path, info);
    }
}

/// Kahn's algorithm over "lies inside one of my prototypes" edges.
pub(crate) fn resolution_order(instancers: &[(ScenePath, InstancerInfo)]) -> Vec<usize> {
    let mut by_path: Vec<usize> = (0..instancers.len()).collect();
    by_path.sort_by(|&a, &b| instancers[a].0.cmp(&instancers[b].0));
    // rank[i] = lexical position of instancer i
    let mut rank = vec![0; instancers.len()];
    for (position, &i) in by_path.iter().enumerate() {
        rank[i] = position;
    }

    let n = instancers.len();
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut blockers = vec![0usize; n];
    for (x, (_, info)) in instancers.iter().enumerate() {
        for (y, (y_path, _)) in instancers.iter().enumerate() {
            if x != y && info.prototype_paths().any(|proto| y_path.has_prefix(proto)) {
                dependents[y].push(x);
                blockers[x] += 1;
            }
        }
    }

    let mut ready: BTreeSet<usize> = (0..n)
        .filter(|&i| blockers[i] == 0)
        .map(|i| rank[i])
        .collect();
    let mut order = Vec::with_capacity(n);
    while let Some(position) = ready.pop_first() {
        let i = by_path[position];
        order.push(i);
        for &dependent in &dependents[i] {
            blockers[dependent] -= 1;
            if blockers[dependent] == 0 {
                ready.insert(rank[dependent]);
            }
        }
    }

    if order.len() < n {
        let cyclic: Vec<usize> = by_path
            .iter()
            .copied()
            .filter(|&i| blockers[i] > 0)
            .collect();
        for &i in &cyclic {
            log::warn!(
                "Instancer '{}' takes part in a prototype cycle; its totals may be incomplete",
                instancers[i].0
            );
        }
        order.extend(cyclic);
    }
    order
}

fn resolve_one(view: &StoreRead<'_>, ctx: &PassContext<'_>, path: &ScenePath, info: &InstancerInfo) {
    let Some(index) = view.lookup(path) else {
        return;
    };

    let mut vertex_count = 0u64;
    let mut slots = Vec::new();
    for prototype in &info.prototypes {
        if ctx.is_invisible(&prototype.path) {
            continue;
        }
        let Some(record) = view.read_path(&prototype.path) else {
            log::warn!(
                "Instancer '{path}' references missing prototype '{}'",
                prototype.path
            );
            continue;
        };
        let Some(prototype_count) = record.subtree_vertex_count else {
            log::warn!(
                "Prototype '{}' of instancer '{path}' has no totals yet",
                prototype.path
            );
            continue;
        };
        vertex_count =
            vertex_count.saturating_add(prototype_count.saturating_mul(prototype.repeat_count));
        slots.extend(record.collected_material_slots().iter().cloned());
    }

    if let Some(mut record) = view.write(index) {
        record.subtree_vertex_count = Some(vertex_count);
        record.subtree_material_slots.clone_from(&slots);
    }

    // A missing prototype is watched through its nearest existing ancestor,
    // so creating it later invalidates this instancer.
    let dependencies: Vec<ScenePath> = info
        .prototype_paths()
        .filter_map(|prototype| {
            if view.lookup(prototype).is_some() {
                Some(prototype.clone())
            } else {
                view.nearest_existing_ancestor(prototype)
                    .and_then(|ancestor| view.path_of(ancestor))
            }
        })
        .collect();
    register_auxiliary(view, path, &dependencies);

    let mut current = view.parent_of(index);
    while let Some(ancestor) = current {
        let Some(ancestor_path) = view.path_of(ancestor) else {
            break;
        };
        if ctx.stage.kind(&ancestor_path) == NodeKind::Instancer
            || ctx.is_invisible(&ancestor_path)
        {
            break;
        }
        recollect(view, ctx, ancestor, &ancestor_path);
        current = view.parent_of(ancestor);
    }
}

/// Recomputes an ancestor's totals from its own geometry and its children's
/// memos. Slots stay in child order, wherever the instancer sits.
fn recollect(view: &StoreRead<'_>, ctx: &PassContext<'_>, index: NodeIndex, path: &ScenePath) {
    let (mut vertex_count, mut slots) = if ctx.stage.kind(path).is_renderable() {
        (ctx.stage.vertex_count(path), ctx.stage.material_slots(path))
    } else {
        (0, Vec::new())
    };
    for child in view.children_of(index) {
        let Some(record) = view.read(child) else {
            continue;
        };
        // Instancers later in the order have no memo yet.
        vertex_count = vertex_count.saturating_add(record.subtree_vertex_count.unwrap_or(0));
        slots.extend(record.collected_material_slots().iter().cloned());
    }

    if let Some(mut record) = view.write(index) {
        record.subtree_vertex_count = Some(vertex_count);
        record.subtree_material_slots = slots;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sceneinfo_core::PrototypeRef;

    fn p(s: &str) -> ScenePath {
        ScenePath::parse(s).unwrap()
    }

    fn instancer(path: &str, prototypes: &[&str]) -> (ScenePath, InstancerInfo) {
        (
            p(path),
            InstancerInfo {
                prototypes: prototypes
                    .iter()
                    .map(|proto| PrototypeRef {
                        path: p(proto),
                        repeat_count: 1,
                    })
                    .collect(),
            },
        )
    }

    #[test]
    fn nested_instancer_resolves_first() {
        let instancers = vec![
            instancer("/L", &["/L/Protos/Nest"]),
            instancer("/L/Protos/Nest/R", &["/L/Protos/Nest/R/Leaf"]),
        ];
        let order = resolution_order(&instancers);
        assert_eq!(order, vec![1, 0]);
    }

    #[test]
    fn independent_instancers_are_lexical() {
        let instancers = vec![
            instancer("/C", &["/PC"]),
            instancer("/A", &["/PA"]),
            instancer("/B", &["/PB"]),
        ];
        let order: Vec<_> = resolution_order(&instancers)
            .into_iter()
            .map(|i| instancers[i].0.clone())
            .collect();
        assert_eq!(order, vec![p("/A"), p("/B"), p("/C")]);
    }

    #[test]
    fn sibling_prototype_dependency_overrides_lexical_order() {
        // "/A" stamps a prototype that contains instancer "/Z/Inner".
        let instancers = vec![
            instancer("/A", &["/Z"]),
            instancer("/Z/Inner", &["/Leaf"]),
        ];
        let order = resolution_order(&instancers);
        assert_eq!(order, vec![1, 0]);
    }

    #[test]
    fn cycles_still_yield_every_instancer() {
        let instancers = vec![instancer("/A", &["/B"]), instancer("/B", &["/A"])];
        let mut order = resolution_order(&instancers);
        order.sort_unstable();
        assert_eq!(order, vec![0, 1]);
    }
}
