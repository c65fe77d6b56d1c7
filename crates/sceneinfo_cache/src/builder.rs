//! Subtree Builder
//!
//! Creates entries for a subtree of the live tree and wires them into the
//! store. Runs single-threaded under the map write lock.

use rustc_hash::FxHashMap;
use sceneinfo_core::{ScenePath, Stage};

use crate::context::TransientState;
use crate::record::NodeIndex;
use crate::store::StoreWrite;

/// Builds entries for `root` and everything below it, in source order.
///
/// If `root` has no parent entry, building starts from the highest missing
/// ancestor instead so the new subtree is always attached. When `root` is gone
/// from the stage, its deepest surviving ancestor is built in its place.
/// Returns the number of entries created.
pub(crate) fn build_subtree(
    view: &mut StoreWrite<'_>,
    stage: &dyn Stage,
    root: &ScenePath,
    transient: &TransientState,
) -> usize {
    let mut start = root.clone();
    while !stage.contains(&start) {
        match start.parent() {
            Some(parent) => start = parent,
            None => return 0,
        }
    }
    if view.lookup(&start).is_some() {
        if &start == root {
            log::debug!("Subtree '{root}' is already built, skipping");
        }
        return 0;
    }

    while let Some(parent) = start.parent() {
        if view.lookup(&parent).is_some() {
            break;
        }
        if !stage.contains(&parent) {
            log::warn!("Cannot build '{root}': ancestor '{parent}' is missing from the stage");
            return 0;
        }
        start = parent;
    }
    let attach_point = start
        .parent()
        .and_then(|parent| view.lookup(&parent).map(|index| (parent, index)));
    let parent_index = attach_point.as_ref().map(|(_, index)| *index);

    let mut created = 0;
    let mut pending: Vec<(ScenePath, Option<NodeIndex>)> = vec![(start, parent_index)];
    while let Some((path, parent)) = pending.pop() {
        if view.lookup(&path).is_some() {
            continue;
        }
        let index = view.create_entry(path.clone());
        created += 1;

        if let Some(mut record) = view.write(index) {
            record.parent = parent;
        }
        if let Some(mut parent_record) = parent.and_then(|p| view.write(p)) {
            parent_record.children.push(index);
        }

        if stage.prototype_of(&path).is_some() {
            transient.instance_roots.lock().insert(path.clone());
        }

        let children = stage.children(&path);
        pending.extend(children.into_iter().rev().map(|child| (child, Some(index))));
    }

    if let Some((parent_path, parent)) = attach_point {
        restore_source_order(view, stage, &parent_path, parent);
    }
    created
}

/// Puts the children of an existing entry back into stage order.
fn restore_source_order(
    view: &mut StoreWrite<'_>,
    stage: &dyn Stage,
    parent_path: &ScenePath,
    parent: NodeIndex,
) {
    let ranks: FxHashMap<ScenePath, usize> = stage
        .children(parent_path)
        .into_iter()
        .enumerate()
        .map(|(rank, path)| (path, rank))
        .collect();
    let mut ranked: Vec<(usize, NodeIndex)> = view
        .children_of(parent)
        .into_iter()
        .map(|child| {
            let rank = view
                .path_of(child)
                .and_then(|path| ranks.get(&path).copied())
                .unwrap_or(usize::MAX);
            (rank, child)
        })
        .collect();
    ranked.sort_by_key(|(rank, _)| *rank);

    if let Some(mut record) = view.write(parent) {
        record.children = ranked.into_iter().map(|(_, child)| child).collect();
    }
}
