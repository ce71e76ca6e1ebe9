#![forbid(unsafe_code)]
//! planx: an extensible query-plan optimizer pipeline.
//!
//! This crate re-exports the workspace crates and adds `Planner`, the
//! per-planner-instance glue a host needs: load the configured plugins once,
//! then optimize any number of plans with the same pipeline.

pub use planx_core as core;
pub use planx_optimizer as optimizer;

use std::sync::Arc;

use tracing::info;

use planx_core::plan::PlanRef;
use planx_optimizer::{
    load_configured, FactoryRegistry, LoadError, LoadedOptimizers, OptimizerContext,
    OptimizerPipeline, PipelineOutcome, PlannerDependencies, PlanOptimizer, Result,
};

/// A built pipeline bound to the dependency bundle it was loaded with.
pub struct Planner {
    deps: PlannerDependencies,
    loaded: LoadedOptimizers,
    pipeline: OptimizerPipeline,
}

impl Planner {
    /// Built-ins plus every plugin listed in `deps.config()` that loads.
    pub fn new(registry: &FactoryRegistry, deps: PlannerDependencies) -> Self {
        Self::with_builtins(planx_optimizer::builtin_optimizers(), registry, deps)
    }

    pub fn with_builtins(
        builtins: Vec<Arc<dyn PlanOptimizer>>,
        registry: &FactoryRegistry,
        deps: PlannerDependencies,
    ) -> Self {
        let loaded = load_configured(registry, &deps);
        let pipeline = OptimizerPipeline::new(builtins)
            .with_plugins(&loaded)
            .with_config(deps.config())
            .with_stats(Arc::clone(deps.rule_stats()));
        info!(
            optimizers = pipeline.len(),
            plugins = loaded.len(),
            skipped = loaded.failures().len(),
            "planner ready"
        );
        Self {
            deps,
            loaded,
            pipeline,
        }
    }

    pub fn pipeline(&self) -> &OptimizerPipeline {
        &self.pipeline
    }

    pub fn dependencies(&self) -> &PlannerDependencies {
        &self.deps
    }

    /// Plugins that were configured but could not be loaded.
    pub fn load_failures(&self) -> &[LoadError] {
        self.loaded.failures()
    }

    /// One pass of the pipeline.
    pub fn optimize(&self, plan: PlanRef, ctx: &OptimizerContext<'_>) -> Result<PipelineOutcome> {
        self.pipeline.run(plan, ctx)
    }

    /// Passes until the plan stops changing, capped by
    /// `PlannerConfig::max_fixpoint_iterations`.
    pub fn optimize_to_fixpoint(
        &self,
        plan: PlanRef,
        ctx: &OptimizerContext<'_>,
    ) -> Result<PipelineOutcome> {
        self.pipeline
            .run_to_fixpoint(plan, ctx, self.deps.config().max_fixpoint_iterations)
    }
}
