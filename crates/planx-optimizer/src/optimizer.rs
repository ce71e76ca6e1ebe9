//! The `PlanOptimizer` contract shared by built-in and plugged-in optimizers.

use planx_core::id::PlanNodeIdAllocator;
use planx_core::plan::PlanRef;
use planx_core::session::{Session, WarningCollector};

use crate::error::Result;

/// Ambient, read-only inputs of one optimizer invocation.
#[derive(Clone, Copy)]
pub struct OptimizerContext<'a> {
    pub session: &'a Session,
    pub warnings: &'a WarningCollector,
    pub ids: &'a PlanNodeIdAllocator,
}

impl<'a> OptimizerContext<'a> {
    pub fn new(
        session: &'a Session,
        warnings: &'a WarningCollector,
        ids: &'a PlanNodeIdAllocator,
    ) -> Self {
        Self {
            session,
            warnings,
            ids,
        }
    }
}

/// One transformation step of the pipeline.
///
/// Invariants:
/// - `optimize` depends only on `plan` and `ctx`; no state carried between calls.
/// - It terminates and never fails for a structurally valid plan unless the
///   optimizer itself is broken.
/// - It returns `plan` itself (same `Arc`) when nothing applies, otherwise a
///   tree whose new nodes all take ids from `ctx.ids` and whose untouched
///   subtrees are shared with the input.
/// - It is not required to reach a fixpoint.
pub trait PlanOptimizer: Send + Sync {
    /// Stable name used in logs, traces and stats.
    fn name(&self) -> &str;

    fn optimize(&self, plan: PlanRef, ctx: &OptimizerContext<'_>) -> Result<PlanRef>;
}
