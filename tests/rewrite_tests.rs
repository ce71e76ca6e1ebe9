//! Rewrite engine guarantees: sharing, fresh ids, pass-through.

mod common;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use common::{all_ids, cols, Env};
use planx::core::prelude::*;
use planx::optimizer::{rewrite_with, PlanOptimizer, PlanRewriter, RewriteContext};
use planx::optimizer::{OptimizerContext, Result};

/// Rewrites every `Limit` to 7999, unconditionally.
struct SetLimit7999;

impl PlanRewriter for SetLimit7999 {
    type Context = ();

    fn visit_limit(
        &self,
        _node: &PlanRef,
        limit: &LimitNode,
        ctx: &RewriteContext<'_, Self>,
    ) -> Option<PlanRef> {
        Some(PlanNode::new(
            ctx.ids(),
            PlanKind::Limit(LimitNode {
                count: 7999,
                ..limit.clone()
            }),
        ))
    }
}

impl PlanOptimizer for SetLimit7999 {
    fn name(&self) -> &str {
        "set_limit_7999"
    }

    fn optimize(&self, plan: PlanRef, ctx: &OptimizerContext<'_>) -> Result<PlanRef> {
        Ok(rewrite_with(self, &plan, &(), ctx.ids))
    }
}

/// Intercepts only `Filter`s; never fires.
struct FilterOnly;

impl PlanRewriter for FilterOnly {
    type Context = ();

    fn visit_filter(
        &self,
        _node: &PlanRef,
        _filter: &FilterNode,
        _ctx: &RewriteContext<'_, Self>,
    ) -> Option<PlanRef> {
        None
    }
}

/// Join(Limit(Filter(Scan orders)), Project(Scan customer))
fn two_branch_plan(ids: &PlanNodeIdAllocator) -> PlanRef {
    let orders = PlanNode::scan(ids, "orders", cols(&["o_id", "o_custkey"]));
    let left = PlanNode::limit(ids, PlanNode::filter(ids, orders, "o_id > 0"), 100);
    let right = PlanNode::project(
        ids,
        PlanNode::scan(ids, "customer", cols(&["c_custkey"])),
        cols(&["c_custkey"]),
    );
    PlanNode::join(
        ids,
        left,
        right,
        JoinType::Inner,
        vec![("o_custkey".into(), "c_custkey".into())],
    )
}

#[test]
fn test_limit_rewrite_scenario() {
    let env = Env::new();
    let scan = PlanNode::scan(&env.ids, "orders", vec![]);
    let plan = PlanNode::limit(&env.ids, scan.clone(), 10_000);

    let out = SetLimit7999.optimize(plan.clone(), &env.ctx()).unwrap();

    match out.kind() {
        PlanKind::Limit(limit) => {
            assert_eq!(limit.count, 7999);
            assert!(Arc::ptr_eq(&limit.source, &scan));
        }
        other => panic!("expected Limit, got {}", other.name()),
    }
    assert_ne!(out.id(), plan.id());
    assert!(!all_ids(&plan).contains(&out.id()));
}

#[test]
fn test_no_hook_returns_input_root() {
    let env = Env::new();
    let plan = PlanNode::limit(&env.ids, PlanNode::scan(&env.ids, "orders", vec![]), 10_000);
    let out = rewrite_with(&FilterOnly, &plan, &(), &env.ids);
    assert!(Arc::ptr_eq(&out, &plan));
}

#[test]
fn test_untargeted_subtrees_are_shared() {
    let env = Env::new();
    let plan = two_branch_plan(&env.ids);
    let right_before = match plan.kind() {
        PlanKind::Join(j) => Arc::clone(&j.right),
        _ => unreachable!(),
    };
    let filter_before = match plan.kind() {
        PlanKind::Join(j) => Arc::clone(j.left.children()[0]),
        _ => unreachable!(),
    };

    let out = SetLimit7999.optimize(plan.clone(), &env.ctx()).unwrap();

    match out.kind() {
        PlanKind::Join(j) => {
            assert!(Arc::ptr_eq(&j.right, &right_before));
            assert!(Arc::ptr_eq(j.left.children()[0], &filter_before));
        }
        other => panic!("expected Join, got {}", other.name()),
    }
}

#[test]
fn test_rebuilt_nodes_get_fresh_ids() {
    let env = Env::new();
    let plan = two_branch_plan(&env.ids);
    let before: BTreeSet<PlanNodeId> = all_ids(&plan).into_iter().collect();
    let watermark = env.ids.peek();

    let out = SetLimit7999.optimize(plan.clone(), &env.ctx()).unwrap();

    let mut fresh = 0;
    planx::core::plan::for_each_node(&out, &mut |node| {
        if before.contains(&node.id()) {
            return;
        }
        fresh += 1;
        assert!(node.id() >= watermark, "{} predates the rewrite", node.id());
    });
    // Rebuilt: the Limit (changed) and the Join above it.
    assert_eq!(fresh, 2);
    assert_eq!(out.node_count(), plan.node_count());
}

#[test]
fn test_plan_without_target_kind_is_untouched() {
    let env = Env::new();
    let orders = PlanNode::scan(&env.ids, "orders", vec![]);
    let plan = PlanNode::project(&env.ids, orders, cols(&["o_id"]));
    let out = SetLimit7999.optimize(plan.clone(), &env.ctx()).unwrap();
    assert!(Arc::ptr_eq(&out, &plan));
}

#[test]
fn test_substitute_matches_rewrite_shape() {
    let env = Env::new();
    let plan = two_branch_plan(&env.ids);
    let (limit_id, filter) = match plan.kind() {
        PlanKind::Join(j) => (j.left.id(), Arc::clone(j.left.children()[0])),
        _ => unreachable!(),
    };

    let mut edits = BTreeMap::new();
    edits.insert(limit_id, PlanNode::limit(&env.ids, filter, 7999));
    let substituted = substitute(&plan, &edits, &env.ids).unwrap();

    let rewritten = SetLimit7999.optimize(plan, &env.ctx()).unwrap();
    assert_eq!(fingerprint(&substituted), fingerprint(&rewritten));
    assert_ne!(substituted.id(), rewritten.id());
}
