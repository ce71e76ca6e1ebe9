//! Plugins shipped with the crate, registered by `bundled_registry`.

use planx_core::plan::{LimitNode, PlanKind, PlanNode, PlanRef};
use planx_core::session::WarningCollector;

use crate::deps::PlannerDependencies;
use crate::error::{FactoryError, Result};
use crate::factory::OptimizerFactory;
use crate::optimizer::{OptimizerContext, PlanOptimizer};
use crate::rewrite::{rewrite_with, PlanRewriter, RewriteContext};

/// Registry identifier of `LimitCapFactory`.
pub const LIMIT_CAP: &str = "limit_cap";

/// Plugin setting holding the row ceiling.
pub const LIMIT_CAP_MAX_ROWS: &str = "limit_cap.max_rows";

/// Session property that turns the cap off for one query (`false`).
pub const LIMIT_CAP_ENABLED: &str = "limit_cap.enabled";

pub const DEFAULT_LIMIT_CAP: u64 = 7999;

/// Builds `LimitCap` with the ceiling from `limit_cap.max_rows`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LimitCapFactory;

impl OptimizerFactory for LimitCapFactory {
    fn build(
        &self,
        deps: &PlannerDependencies,
    ) -> std::result::Result<Box<dyn PlanOptimizer>, FactoryError> {
        let max_rows = match deps.config().plugin_setting(LIMIT_CAP_MAX_ROWS) {
            None => DEFAULT_LIMIT_CAP,
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .map_err(|e| FactoryError::InvalidSetting {
                    key: LIMIT_CAP_MAX_ROWS.to_string(),
                    value: raw.to_string(),
                    reason: e.to_string(),
                })?,
        };
        Ok(Box::new(LimitCap { max_rows }))
    }
}

/// Caps every `Limit` at `max_rows`.
#[derive(Debug, Clone, Copy)]
pub struct LimitCap {
    max_rows: u64,
}

impl LimitCap {
    pub fn new(max_rows: u64) -> Self {
        Self { max_rows }
    }

    pub fn max_rows(&self) -> u64 {
        self.max_rows
    }
}

impl PlanOptimizer for LimitCap {
    fn name(&self) -> &str {
        LIMIT_CAP
    }

    fn optimize(&self, plan: PlanRef, ctx: &OptimizerContext<'_>) -> Result<PlanRef> {
        if ctx.session.flag(LIMIT_CAP_ENABLED) == Some(false) {
            return Ok(plan);
        }
        let rewriter = CapLimits {
            max_rows: self.max_rows,
            warnings: ctx.warnings,
        };
        Ok(rewrite_with(&rewriter, &plan, &(), ctx.ids))
    }
}

struct CapLimits<'a> {
    max_rows: u64,
    warnings: &'a WarningCollector,
}

impl PlanRewriter for CapLimits<'_> {
    type Context = ();

    fn visit_limit(
        &self,
        _node: &PlanRef,
        limit: &LimitNode,
        ctx: &RewriteContext<'_, Self>,
    ) -> Option<PlanRef> {
        if limit.count <= self.max_rows {
            return None;
        }
        self.warnings.add(
            LIMIT_CAP,
            format!("limit {} capped to {}", limit.count, self.max_rows),
        );
        Some(PlanNode::new(
            ctx.ids(),
            PlanKind::Limit(LimitNode {
                count: self.max_rows,
                ..limit.clone()
            }),
        ))
    }
}
