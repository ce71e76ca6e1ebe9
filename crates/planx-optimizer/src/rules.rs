//! Built-in optimizers. The pipeline always runs these, in this order, before
//! any plugged-in optimizer.

use std::sync::Arc;

use planx_core::plan::{FilterNode, LimitNode, PlanKind, PlanNode, PlanRef};

use crate::error::Result;
use crate::optimizer::{OptimizerContext, PlanOptimizer};
use crate::rewrite::{rewrite_with, PlanRewriter, RewriteContext};

/// `Limit(a, Limit(b, x))` → `Limit(min(a, b), x)` for final limits.
#[derive(Debug, Default, Clone, Copy)]
pub struct MergeLimits;

impl PlanOptimizer for MergeLimits {
    fn name(&self) -> &str {
        "merge_limits"
    }

    fn optimize(&self, plan: PlanRef, ctx: &OptimizerContext<'_>) -> Result<PlanRef> {
        Ok(rewrite_with(self, &plan, &(), ctx.ids))
    }
}

impl PlanRewriter for MergeLimits {
    type Context = ();

    fn visit_limit(
        &self,
        _node: &PlanRef,
        outer: &LimitNode,
        ctx: &RewriteContext<'_, Self>,
    ) -> Option<PlanRef> {
        if outer.partial {
            return None;
        }
        let inner = match outer.source.kind() {
            PlanKind::Limit(inner) if !inner.partial => inner,
            _ => return None,
        };
        Some(PlanNode::new(
            ctx.ids(),
            PlanKind::Limit(LimitNode {
                source: Arc::clone(&inner.source),
                count: outer.count.min(inner.count),
                partial: false,
            }),
        ))
    }
}

/// Drops `Filter` nodes whose predicate is the literal `true`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RemoveTrivialFilter;

impl PlanOptimizer for RemoveTrivialFilter {
    fn name(&self) -> &str {
        "remove_trivial_filter"
    }

    fn optimize(&self, plan: PlanRef, ctx: &OptimizerContext<'_>) -> Result<PlanRef> {
        Ok(rewrite_with(self, &plan, &(), ctx.ids))
    }
}

impl PlanRewriter for RemoveTrivialFilter {
    type Context = ();

    fn visit_filter(
        &self,
        _node: &PlanRef,
        filter: &FilterNode,
        _ctx: &RewriteContext<'_, Self>,
    ) -> Option<PlanRef> {
        filter
            .predicate
            .trim()
            .eq_ignore_ascii_case("true")
            .then(|| Arc::clone(&filter.source))
    }
}

/// Built-in optimizers in pipeline order.
pub fn builtin_optimizers() -> Vec<Arc<dyn PlanOptimizer>> {
    vec![Arc::new(RemoveTrivialFilter), Arc::new(MergeLimits)]
}
