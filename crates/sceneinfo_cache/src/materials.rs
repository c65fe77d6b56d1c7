//! Material Slot Merging
//!
//! The aggregate pass only appends slots. When identical slots may be merged,
//! this pass dedups them on nodes that will become a single asset: the
//! absolute root, collapse roots and everything they collapse. Geometry-cache
//! roots keep their slots as-is.
//!
//! Merging never loses the collected list: parents re-aggregating on a later
//! partial rebuild must see the same slots a full rebuild would, and a node
//! that stops being collapsed gets its unmerged slots back. Nodes already in
//! the right state are left alone.

use rayon::prelude::*;
use rustc_hash::FxHashSet;
use sceneinfo_core::MaterialSlot;

use crate::context::PassContext;
use crate::geometry_cache::resolve_root;
use crate::record::NodeIndex;
use crate::store::StoreRead;

pub(crate) fn merge_material_slots(
    view: &StoreRead<'_>,
    ctx: &PassContext<'_>,
    index: NodeIndex,
    collapsed: bool,
) {
    if !ctx.settings.merge_identical_material_slots {
        return;
    }

    let (is_root, collapses, children) = {
        let Some(record) = view.read(index) else {
            return;
        };
        (
            record.path.is_root(),
            record.collapses_children,
            record.children.clone(),
        )
    };

    let collapsed = collapsed || collapses;
    let mergeable = (collapsed || is_root)
        && !(ctx.settings.geometry_cache.enabled && resolve_root(view, ctx.stage, index));

    if let Some(mut record) = view.write(index) {
        if mergeable && !record.slots_were_merged {
            let mut merged = record.subtree_material_slots.clone();
            dedup_slots(&mut merged);
            if merged.len() != record.subtree_material_slots.len() {
                record.unmerged_material_slots =
                    Some(std::mem::replace(&mut record.subtree_material_slots, merged));
            }
            record.slots_were_merged = true;
        } else if !mergeable && record.slots_were_merged {
            // No longer part of a single asset.
            if let Some(unmerged) = record.unmerged_material_slots.take() {
                record.subtree_material_slots = unmerged;
            }
            record.slots_were_merged = false;
        }
    }

    children
        .par_iter()
        .for_each(|&child| merge_material_slots(view, ctx, child, collapsed));
}

/// Drops repeated slots, keeping first occurrences in order.
pub(crate) fn dedup_slots(slots: &mut Vec<MaterialSlot>) {
    let mut seen = FxHashSet::default();
    slots.retain(|slot| seen.insert(slot.clone()));
}
