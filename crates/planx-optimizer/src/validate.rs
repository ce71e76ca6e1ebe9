//! Structural checks on an optimizer's output relative to its input.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use planx_core::id::{PlanNodeId, PlanNodeIdAllocator};
use planx_core::plan::{for_each_node, PlanNode, PlanRef};

use crate::error::RewriteViolation;

/// Check that `after` is a legal rewrite of `before`:
///
/// - every id names exactly one position in `after`, unless `before` already
///   held that same node at as many positions;
/// - an id carried over from `before` still names the very same node;
/// - every other id was issued by `ids`.
///
/// Keeping an input subtree by reference is fine; placing it under two
/// parents is not.
pub fn validate_rewrite(
    before: &PlanRef,
    after: &PlanRef,
    ids: &PlanNodeIdAllocator,
) -> Result<(), RewriteViolation> {
    RewriteValidator::new().check(before, after, ids)
}

/// Validates a sequence of rewrites and remembers which ids they retired.
///
/// An id that left the tree in one step may not come back as a new node in
/// a later one. The pipeline keeps one validator per run.
#[derive(Debug, Default)]
pub struct RewriteValidator {
    retired: BTreeSet<PlanNodeId>,
}

impl RewriteValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids dropped by the rewrites checked so far.
    pub fn retired(&self) -> &BTreeSet<PlanNodeId> {
        &self.retired
    }

    /// Same rules as [`validate_rewrite`], plus the retired-id check. On
    /// success the ids `before` held and `after` lost are retired.
    pub fn check(
        &mut self,
        before: &PlanRef,
        after: &PlanRef,
        ids: &PlanNodeIdAllocator,
    ) -> Result<(), RewriteViolation> {
        if Arc::ptr_eq(before, after) {
            return Ok(());
        }

        let original = positions(before);
        let mut seen: BTreeMap<PlanNodeId, (*const PlanNode, usize)> = BTreeMap::new();
        let mut violation = None;
        for_each_node(after, &mut |node| {
            if violation.is_some() {
                return;
            }
            let id = node.id();
            let ptr = Arc::as_ptr(node);
            let count = match seen.entry(id) {
                Entry::Occupied(mut prev) => {
                    if prev.get().0 != ptr {
                        violation = Some(RewriteViolation::DuplicateId { id });
                        return;
                    }
                    prev.get_mut().1 += 1;
                    prev.get().1
                }
                Entry::Vacant(slot) => slot.insert((ptr, 1)).1,
            };
            violation = match original.get(&id) {
                Some(&(old, _)) if old != ptr => Some(RewriteViolation::ReusedId { id }),
                Some(&(_, held)) if count > held => Some(RewriteViolation::DuplicateId { id }),
                Some(_) => None,
                None if count > 1 => Some(RewriteViolation::DuplicateId { id }),
                None if self.retired.contains(&id) => Some(RewriteViolation::RetiredId { id }),
                None if !ids.has_issued(id) => Some(RewriteViolation::ForeignId { id }),
                None => None,
            };
        });
        if let Some(violation) = violation {
            return Err(violation);
        }

        self.retired
            .extend(original.keys().filter(|id| !seen.contains_key(*id)));
        Ok(())
    }
}

/// Node pointer and number of positions per id.
fn positions(root: &PlanRef) -> BTreeMap<PlanNodeId, (*const PlanNode, usize)> {
    let mut out: BTreeMap<PlanNodeId, (*const PlanNode, usize)> = BTreeMap::new();
    for_each_node(root, &mut |node| {
        out.entry(node.id()).or_insert((Arc::as_ptr(node), 0)).1 += 1;
    });
    out
}
