//! Generic plan rewriting.
//!
//! A `PlanRewriter` intercepts the node kinds it cares about and leaves the
//! rest to the default rule:
//!
//! - the traversal is depth-first, entered top-down;
//! - a node's children are rewritten first, by the same rule;
//! - the node is rebuilt (fresh id) only if some child changed by reference,
//!   otherwise the original `PlanRef` is returned untouched;
//! - then the hook for the node's kind sees the settled node. `Some(new)`
//!   takes the node's place; `None` keeps it. A replacement's subtree is not
//!   visited again unless the hook recurses through `RewriteContext::rewrite`.
//!
//! Hooks do not fail. A hook that cannot handle an occurrence returns `None`.
//!
//! ```
//! use planx_core::prelude::*;
//! use planx_optimizer::rewrite::{rewrite_with, PlanRewriter, RewriteContext};
//!
//! struct CapLimits(u64);
//!
//! impl PlanRewriter for CapLimits {
//!     type Context = ();
//!
//!     fn visit_limit(
//!         &self,
//!         _node: &PlanRef,
//!         limit: &LimitNode,
//!         ctx: &RewriteContext<'_, Self>,
//!     ) -> Option<PlanRef> {
//!         (limit.count > self.0).then(|| {
//!             PlanNode::new(
//!                 ctx.ids(),
//!                 PlanKind::Limit(LimitNode { count: self.0, ..limit.clone() }),
//!             )
//!         })
//!     }
//! }
//!
//! let ids = PlanNodeIdAllocator::new();
//! let scan = PlanNode::scan(&ids, "orders", vec![]);
//! let plan = PlanNode::limit(&ids, scan, 10_000);
//! let out = rewrite_with(&CapLimits(100), &plan, &(), &ids);
//! assert!(out.explain().starts_with("Limit[count=100]"));
//! ```

use std::sync::Arc;

use planx_core::id::{PlanNodeId, PlanNodeIdAllocator};
use planx_core::plan::{
    AggregateNode, ExchangeNode, FilterNode, JoinNode, LimitNode, OutputNode, PlanKind, PlanNode,
    PlanRef, ProjectNode, ScanNode, SortNode, ValuesNode,
};

/// Per-kind hooks over a plan tree. Every hook defaults to "not intercepted".
pub trait PlanRewriter {
    /// Read-only value threaded through the whole traversal.
    type Context;

    /// Dispatch on the node's kind. Override only to intercept every kind at
    /// once; the catch-all arm keeps new kinds passing through.
    fn visit(&self, node: &PlanRef, ctx: &RewriteContext<'_, Self>) -> Option<PlanRef> {
        match node.kind() {
            PlanKind::Scan(n) => self.visit_scan(node, n, ctx),
            PlanKind::Values(n) => self.visit_values(node, n, ctx),
            PlanKind::Filter(n) => self.visit_filter(node, n, ctx),
            PlanKind::Project(n) => self.visit_project(node, n, ctx),
            PlanKind::Limit(n) => self.visit_limit(node, n, ctx),
            PlanKind::Sort(n) => self.visit_sort(node, n, ctx),
            PlanKind::Aggregate(n) => self.visit_aggregate(node, n, ctx),
            PlanKind::Exchange(n) => self.visit_exchange(node, n, ctx),
            PlanKind::Join(n) => self.visit_join(node, n, ctx),
            PlanKind::Output(n) => self.visit_output(node, n, ctx),
            _ => None,
        }
    }

    fn visit_scan(
        &self,
        _node: &PlanRef,
        _scan: &ScanNode,
        _ctx: &RewriteContext<'_, Self>,
    ) -> Option<PlanRef> {
        None
    }

    fn visit_values(
        &self,
        _node: &PlanRef,
        _values: &ValuesNode,
        _ctx: &RewriteContext<'_, Self>,
    ) -> Option<PlanRef> {
        None
    }

    fn visit_filter(
        &self,
        _node: &PlanRef,
        _filter: &FilterNode,
        _ctx: &RewriteContext<'_, Self>,
    ) -> Option<PlanRef> {
        None
    }

    fn visit_project(
        &self,
        _node: &PlanRef,
        _project: &ProjectNode,
        _ctx: &RewriteContext<'_, Self>,
    ) -> Option<PlanRef> {
        None
    }

    fn visit_limit(
        &self,
        _node: &PlanRef,
        _limit: &LimitNode,
        _ctx: &RewriteContext<'_, Self>,
    ) -> Option<PlanRef> {
        None
    }

    fn visit_sort(
        &self,
        _node: &PlanRef,
        _sort: &SortNode,
        _ctx: &RewriteContext<'_, Self>,
    ) -> Option<PlanRef> {
        None
    }

    fn visit_aggregate(
        &self,
        _node: &PlanRef,
        _aggregate: &AggregateNode,
        _ctx: &RewriteContext<'_, Self>,
    ) -> Option<PlanRef> {
        None
    }

    fn visit_exchange(
        &self,
        _node: &PlanRef,
        _exchange: &ExchangeNode,
        _ctx: &RewriteContext<'_, Self>,
    ) -> Option<PlanRef> {
        None
    }

    fn visit_join(
        &self,
        _node: &PlanRef,
        _join: &JoinNode,
        _ctx: &RewriteContext<'_, Self>,
    ) -> Option<PlanRef> {
        None
    }

    fn visit_output(
        &self,
        _node: &PlanRef,
        _output: &OutputNode,
        _ctx: &RewriteContext<'_, Self>,
    ) -> Option<PlanRef> {
        None
    }
}

/// What a hook can see while the engine walks the tree.
pub struct RewriteContext<'a, R: PlanRewriter + ?Sized> {
    rewriter: &'a R,
    context: &'a R::Context,
    ids: &'a PlanNodeIdAllocator,
    depth: usize,
}

impl<'a, R: PlanRewriter + ?Sized> RewriteContext<'a, R> {
    /// The caller-supplied traversal context.
    pub fn get(&self) -> &'a R::Context {
        self.context
    }

    /// Session id allocator; every node a hook builds must take its id here.
    pub fn ids(&self) -> &'a PlanNodeIdAllocator {
        self.ids
    }

    pub fn next_id(&self) -> PlanNodeId {
        self.ids.next_id()
    }

    /// Distance from the root of the tree being rewritten (root = 0).
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Rewrite `node` (children and hook) as if it sat one level below the
    /// current node. Use this to process a subtree a hook just built.
    pub fn rewrite(&self, node: &PlanRef) -> PlanRef {
        self.descend().rewrite_node(node)
    }

    /// Apply the default rule to `node`'s children only; the hook for `node`
    /// itself is not consulted.
    pub fn default_rewrite(&self, node: &PlanRef) -> PlanRef {
        self.rewrite_children(node)
    }

    fn descend(&self) -> Self {
        Self {
            rewriter: self.rewriter,
            context: self.context,
            ids: self.ids,
            depth: self.depth + 1,
        }
    }

    fn rewrite_node(&self, node: &PlanRef) -> PlanRef {
        let settled = self.rewrite_children(node);
        self.rewriter.visit(&settled, self).unwrap_or(settled)
    }

    fn rewrite_children(&self, node: &PlanRef) -> PlanRef {
        let children = node.children();
        if children.is_empty() {
            return Arc::clone(node);
        }

        let below = self.descend();
        let rewritten: Vec<PlanRef> = children.iter().map(|c| below.rewrite_node(c)).collect();
        let changed = rewritten
            .iter()
            .zip(children.iter().copied())
            .any(|(new, old)| !Arc::ptr_eq(new, old));
        if !changed {
            return Arc::clone(node);
        }

        let mut replacements = rewritten.into_iter();
        let kind = node
            .kind()
            .map_children(|old| replacements.next().unwrap_or_else(|| Arc::clone(old)));
        PlanNode::with_id(self.ids.next_id(), kind)
    }
}

/// Rewrite `plan` with `rewriter`. Returns `plan` itself (same `Arc`) when no
/// hook fired anywhere in the tree.
pub fn rewrite_with<R: PlanRewriter + ?Sized>(
    rewriter: &R,
    plan: &PlanRef,
    context: &R::Context,
    ids: &PlanNodeIdAllocator,
) -> PlanRef {
    let ctx = RewriteContext {
        rewriter,
        context,
        ids,
        depth: 0,
    };
    ctx.rewrite_node(plan)
}
