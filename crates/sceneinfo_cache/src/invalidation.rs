//! Incremental Invalidation
//!
//! Prepares the store for a partial rebuild:
//!
//! 1. Reduce the requested paths to minimal subtree roots.
//! 2. For each root, reset the nearest existing ancestor chain and, through
//!    main links, everything derived from it.
//! 3. Detach the root's old subtree from its parent and release its entries.
//! 4. Tear down the links of every reset entry, stashing material users.
//!
//! The builder then recreates each root and the passes refill whatever was
//! reset. Entries that were not reset keep their memos and are skipped.

use sceneinfo_core::ScenePath;

use crate::context::TransientState;
use crate::dependency::disconnect_reset_links;
use crate::record::NodeIndex;
use crate::store::StoreWrite;

/// Drops paths that lie under another requested path. The absolute root
/// swallows everything.
pub(crate) fn subtree_roots_to_rebuild(paths: &[ScenePath]) -> Vec<ScenePath> {
    if paths.iter().any(ScenePath::is_root) {
        return vec![ScenePath::root()];
    }

    let mut by_depth: Vec<&ScenePath> = paths.iter().collect();
    by_depth.sort_by_key(|path| path.depth());

    let mut roots: Vec<ScenePath> = Vec::new();
    for path in by_depth {
        if !roots.iter().any(|root| path.has_prefix(root)) {
            roots.push(path.clone());
        }
    }
    roots.sort();
    roots
}

/// What a cleanup pass did, for logging.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CleanupStats {
    pub reset: usize,
    pub released: usize,
}

/// Resets and removes everything the given roots invalidate, then tears
/// down the staged links and drops released records.
pub(crate) fn invalidate(
    view: &mut StoreWrite<'_>,
    roots: &[ScenePath],
    transient: &TransientState,
) -> CleanupStats {
    let mut stats = CleanupStats::default();
    for root in roots {
        stats.released += clean_up_subtree(view, root, transient);
    }
    stats.reset = transient.to_disconnect.lock().len();

    disconnect_reset_links(view, transient);
    view.purge_released();
    stats
}

/// Resets the ancestors of `root`'s attachment point and removes `root`'s
/// existing subtree. Returns the number of released entries.
fn clean_up_subtree(view: &mut StoreWrite<'_>, root: &ScenePath, transient: &TransientState) -> usize {
    let existing = view.lookup(root);

    // A brand new subtree still invalidates the ancestors it will attach to.
    let attach_point = match existing {
        Some(index) => view.parent_of(index),
        None => view.nearest_existing_ancestor(root),
    };
    if let Some(ancestor) = attach_point {
        reset_entry(view, transient, ancestor);
    }

    let Some(index) = existing else {
        return 0;
    };
    if let Some(mut parent) = attach_point.and_then(|parent| view.write(parent)) {
        parent.children.retain(|&child| child != index);
    }
    remove_subtree(view, transient, index)
}

/// Resets `index`, its ancestors and, transitively, every entry that depends
/// on any of them. Already reset entries stop the walk.
fn reset_entry(view: &StoreWrite<'_>, transient: &TransientState, index: NodeIndex) {
    let mut pending = vec![index];
    while let Some(index) = pending.pop() {
        let (path, parent, mains) = {
            let Some(mut record) = view.write(index) else {
                continue;
            };
            if record.is_reset() {
                continue;
            }
            record.reset_collected_info();
            (
                record.path.clone(),
                record.parent,
                record.main_prims.iter().cloned().collect::<Vec<_>>(),
            )
        };

        transient.to_disconnect.lock().insert(index);
        transient.reset_paths.lock().insert(path);

        pending.extend(mains.iter().filter_map(|main| view.lookup(main)));
        pending.extend(parent);
    }
}

/// Resets every entry of the subtree (following main links out of it) and
/// releases the subtree's indices.
fn remove_subtree(view: &mut StoreWrite<'_>, transient: &TransientState, root: NodeIndex) -> usize {
    let mut released = 0;
    let mut pending = vec![root];
    while let Some(index) = pending.pop() {
        reset_entry(view, transient, index);
        // Links are torn down after the walk, so keep the record around.
        transient.to_disconnect.lock().insert(index);
        pending.extend(view.children_of(index));
        view.release(index);
        released += 1;
    }
    released
}
