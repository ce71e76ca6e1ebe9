//! Id-targeted substitution with structural sharing.
//!
//! `substitute` swaps nodes by id and rebuilds only the root→edit spines:
//! - an edited node is replaced by its replacement as-is (the replacement's
//!   own subtree is not searched for further edits);
//! - each ancestor of an edited node is rebuilt with a fresh id, the same
//!   payload, and its untouched children kept by reference;
//! - any subtree with no edit inside it is returned by reference.
//!
//! When edits nest (an ancestor and one of its descendants are both targeted)
//! the ancestor wins: its replacement subsumes whatever the descendant edit
//! would have produced. The result depends only on the tree and the edit set,
//! never on map iteration order.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::Result;
use crate::id::{PlanNodeId, PlanNodeIdAllocator};
use crate::plan::PlanRef;

pub fn substitute(
    root: &PlanRef,
    edits: &BTreeMap<PlanNodeId, PlanRef>,
    ids: &PlanNodeIdAllocator,
) -> Result<PlanRef> {
    if edits.is_empty() {
        return Ok(Arc::clone(root));
    }
    substitute_node(root, edits, ids)
}

fn substitute_node(
    node: &PlanRef,
    edits: &BTreeMap<PlanNodeId, PlanRef>,
    ids: &PlanNodeIdAllocator,
) -> Result<PlanRef> {
    // Checked before descending: anything the descendants would produce is
    // discarded by the ancestor's replacement anyway.
    if let Some(replacement) = edits.get(&node.id()) {
        return Ok(Arc::clone(replacement));
    }

    let children = node.children();
    if children.is_empty() {
        return Ok(Arc::clone(node));
    }

    let mut changed = false;
    let mut rewritten = Vec::with_capacity(children.len());
    for child in children {
        let new_child = substitute_node(child, edits, ids)?;
        changed |= !Arc::ptr_eq(&new_child, child);
        rewritten.push(new_child);
    }

    if changed {
        node.with_children(ids.next_id(), rewritten)
    } else {
        Ok(Arc::clone(node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{JoinType, PlanKind, PlanNode};

    struct Fixture {
        ids: PlanNodeIdAllocator,
        orders: PlanRef,
        filter: PlanRef,
        customer: PlanRef,
        join: PlanRef,
        root: PlanRef,
    }

    // Limit(Join(Filter(Scan orders), Scan customer))
    fn fixture() -> Fixture {
        let ids = PlanNodeIdAllocator::new();
        let orders = PlanNode::scan(&ids, "orders", vec![]);
        let filter = PlanNode::filter(&ids, orders.clone(), "o_total > 10");
        let customer = PlanNode::scan(&ids, "customer", vec![]);
        let join = PlanNode::join(&ids, filter.clone(), customer.clone(), JoinType::Inner, vec![]);
        let root = PlanNode::limit(&ids, join.clone(), 5);
        Fixture {
            ids,
            orders,
            filter,
            customer,
            join,
            root,
        }
    }

    #[test]
    fn no_edits_returns_same_root() {
        let f = fixture();
        let out = substitute(&f.root, &BTreeMap::new(), &f.ids).unwrap();
        assert!(Arc::ptr_eq(&out, &f.root));
    }

    #[test]
    fn unknown_target_returns_same_root() {
        let f = fixture();
        let edits = BTreeMap::from([(PlanNodeId::new(999), PlanNode::scan(&f.ids, "x", vec![]))]);
        let out = substitute(&f.root, &edits, &f.ids).unwrap();
        assert!(Arc::ptr_eq(&out, &f.root));
    }

    #[test]
    fn leaf_edit_rebuilds_only_the_spine() {
        let f = fixture();
        let lineitem = PlanNode::scan(&f.ids, "lineitem", vec![]);
        let before = f.ids.peek();
        let edits = BTreeMap::from([(f.orders.id(), lineitem.clone())]);

        let out = substitute(&f.root, &edits, &f.ids).unwrap();

        // Limit, Join, Filter rebuilt with fresh ids.
        assert!(out.id() >= before);
        let join = out.children()[0];
        assert!(join.id() >= before);
        let filter = join.children()[0];
        assert!(filter.id() >= before);
        assert!(Arc::ptr_eq(filter.children()[0], &lineitem));

        // Off-path subtree shared.
        assert!(Arc::ptr_eq(join.children()[1], &f.customer));
        assert_eq!(f.ids.peek().get() - before.get(), 3);

        match filter.kind() {
            PlanKind::Filter(n) => assert_eq!(n.predicate, "o_total > 10"),
            k => panic!("unexpected {}", k.name()),
        }
    }

    #[test]
    fn root_edit_has_no_rebuilt_ancestors() {
        let f = fixture();
        let replacement = PlanNode::limit(&f.ids, f.join.clone(), 1);
        let before = f.ids.peek();
        let edits = BTreeMap::from([(f.root.id(), replacement.clone())]);

        let out = substitute(&f.root, &edits, &f.ids).unwrap();
        assert!(Arc::ptr_eq(&out, &replacement));
        assert_eq!(f.ids.peek(), before);
    }

    #[test]
    fn ancestor_edit_subsumes_descendant_edit() {
        let f = fixture();
        let new_filter = PlanNode::filter(&f.ids, f.orders.clone(), "true");
        let new_join = PlanNode::join(
            &f.ids,
            f.customer.clone(),
            f.orders.clone(),
            JoinType::Left,
            vec![],
        );
        let edits = BTreeMap::from([
            (f.filter.id(), new_filter),
            (f.join.id(), new_join.clone()),
        ]);

        let out = substitute(&f.root, &edits, &f.ids).unwrap();
        assert!(Arc::ptr_eq(out.children()[0], &new_join));
    }

    #[test]
    fn sibling_edits_share_one_rebuilt_parent() {
        let f = fixture();
        let a = PlanNode::scan(&f.ids, "a", vec![]);
        let b = PlanNode::scan(&f.ids, "b", vec![]);
        let before = f.ids.peek();
        let edits = BTreeMap::from([(f.filter.id(), a.clone()), (f.customer.id(), b.clone())]);

        let out = substitute(&f.root, &edits, &f.ids).unwrap();
        let join = out.children()[0];
        assert!(Arc::ptr_eq(join.children()[0], &a));
        assert!(Arc::ptr_eq(join.children()[1], &b));
        // Join + Limit only.
        assert_eq!(f.ids.peek().get() - before.get(), 2);
    }
}
