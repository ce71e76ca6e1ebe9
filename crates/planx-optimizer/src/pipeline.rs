//! Runs the built-in optimizers followed by the plugged-in ones.
//!
//! The order is fixed at construction: every built-in, in the order given,
//! then every plugin, in load order. Plugins cannot be interleaved with
//! built-ins.

use std::sync::Arc;

use tracing::{debug, warn};

use planx_core::config::PlannerConfig;
use planx_core::hash::{fingerprint, Hash256};
use planx_core::plan::PlanRef;

use crate::deps::RuleStatsRecorder;
use crate::error::{OptimizerError, Result};
use crate::optimizer::{OptimizerContext, PlanOptimizer};
use crate::registry::LoadedOptimizers;
use crate::rules::builtin_optimizers;
use crate::validate::RewriteValidator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOrigin {
    Builtin,
    Plugin,
}

/// What one optimizer did during one pass over the plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassTrace {
    pub optimizer: String,
    pub origin: PassOrigin,
    /// 1-based pass number.
    pub iteration: usize,
    /// The optimizer returned a different `PlanRef` than it was given.
    pub changed: bool,
    /// Fingerprints, present only when tracing is on.
    pub before: Option<Hash256>,
    pub after: Option<Hash256>,
}

impl PassTrace {
    /// Changed by reference but not in shape: the optimizer only renumbered.
    pub fn renumbered_only(&self) -> bool {
        self.changed && self.before.is_some() && self.before == self.after
    }
}

#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub plan: PlanRef,
    pub passes: Vec<PassTrace>,
    /// Whole-pipeline passes executed.
    pub iterations: usize,
}

impl PipelineOutcome {
    pub fn changed(&self) -> bool {
        self.passes.iter().any(|p| p.changed)
    }

    pub fn changes(&self) -> usize {
        self.passes.iter().filter(|p| p.changed).count()
    }
}

#[derive(Clone)]
struct Stage {
    optimizer: Arc<dyn PlanOptimizer>,
    origin: PassOrigin,
}

/// Ordered list of optimizers plus run options.
#[derive(Clone)]
pub struct OptimizerPipeline {
    stages: Vec<Stage>,
    validate: bool,
    trace: bool,
    stats: Option<Arc<RuleStatsRecorder>>,
}

impl OptimizerPipeline {
    pub fn new(builtins: Vec<Arc<dyn PlanOptimizer>>) -> Self {
        Self {
            stages: builtins
                .into_iter()
                .map(|optimizer| Stage {
                    optimizer,
                    origin: PassOrigin::Builtin,
                })
                .collect(),
            validate: true,
            trace: false,
            stats: None,
        }
    }

    /// Pipeline seeded with `builtin_optimizers()`.
    pub fn with_builtins() -> Self {
        Self::new(builtin_optimizers())
    }

    /// Append every successfully loaded plugin, after whatever is already
    /// in the pipeline.
    pub fn with_plugins(mut self, loaded: &LoadedOptimizers) -> Self {
        self.stages
            .extend(loaded.optimizers().into_iter().map(|optimizer| Stage {
                optimizer,
                origin: PassOrigin::Plugin,
            }));
        self
    }

    pub fn with_config(mut self, config: &PlannerConfig) -> Self {
        self.validate = config.validate_rewrites;
        self.trace = config.trace_pipeline;
        self
    }

    pub fn with_validation(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    pub fn with_tracing(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    pub fn with_stats(mut self, stats: Arc<RuleStatsRecorder>) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Optimizers in execution order.
    pub fn optimizers(&self) -> Vec<Arc<dyn PlanOptimizer>> {
        self.stages.iter().map(|s| Arc::clone(&s.optimizer)).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.optimizer.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// One pass: thread `plan` through every optimizer in order.
    ///
    /// Ids one optimizer drops stay retired for the rest of the run.
    pub fn run(&self, plan: PlanRef, ctx: &OptimizerContext<'_>) -> Result<PipelineOutcome> {
        let mut passes = Vec::with_capacity(self.stages.len());
        let mut validator = RewriteValidator::new();
        let plan = self.pass(plan, ctx, 1, &mut validator, &mut passes)?;
        Ok(PipelineOutcome {
            plan,
            passes,
            iterations: 1,
        })
    }

    /// Repeat whole passes until none changes the plan or `max_iterations`
    /// passes have run.
    pub fn run_to_fixpoint(
        &self,
        plan: PlanRef,
        ctx: &OptimizerContext<'_>,
        max_iterations: usize,
    ) -> Result<PipelineOutcome> {
        let mut passes = Vec::new();
        let mut validator = RewriteValidator::new();
        let mut plan = plan;
        let mut iterations = 0;

        while iterations < max_iterations {
            iterations += 1;
            let before = passes.len();
            plan = self.pass(plan, ctx, iterations, &mut validator, &mut passes)?;
            if !passes[before..].iter().any(|p: &PassTrace| p.changed) {
                debug!(iterations, "pipeline reached fixpoint");
                return Ok(PipelineOutcome {
                    plan,
                    passes,
                    iterations,
                });
            }
        }

        if max_iterations > 0 {
            warn!(max_iterations, "pipeline stopped before reaching a fixpoint");
        }
        Ok(PipelineOutcome {
            plan,
            passes,
            iterations,
        })
    }

    fn pass(
        &self,
        mut plan: PlanRef,
        ctx: &OptimizerContext<'_>,
        iteration: usize,
        validator: &mut RewriteValidator,
        passes: &mut Vec<PassTrace>,
    ) -> Result<PlanRef> {
        for stage in &self.stages {
            let name = stage.optimizer.name();
            let before_hash = self.trace.then(|| fingerprint(&plan));

            let out = stage
                .optimizer
                .optimize(Arc::clone(&plan), ctx)
                .map_err(|e| attribute(name, e))?;
            let changed = !Arc::ptr_eq(&out, &plan);

            if changed && self.validate {
                validator.check(&plan, &out, ctx.ids).map_err(|violation| {
                    OptimizerError::Rewrite {
                        optimizer: name.to_string(),
                        violation,
                    }
                })?;
            }
            if let Some(stats) = &self.stats {
                stats.record(name, changed);
            }

            debug!(optimizer = name, iteration, changed, "optimizer pass");
            passes.push(PassTrace {
                optimizer: name.to_string(),
                origin: stage.origin,
                iteration,
                changed,
                before: before_hash,
                after: self.trace.then(|| fingerprint(&out)),
            });
            plan = out;
        }
        Ok(plan)
    }
}

impl Default for OptimizerPipeline {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl std::fmt::Debug for OptimizerPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OptimizerPipeline")
            .field("optimizers", &self.names())
            .field("validate", &self.validate)
            .field("trace", &self.trace)
            .finish()
    }
}

/// Make sure an aborted run names the optimizer that failed.
fn attribute(optimizer: &str, err: OptimizerError) -> OptimizerError {
    match err {
        OptimizerError::Core(e) => OptimizerError::Failed {
            optimizer: optimizer.to_string(),
            reason: e.to_string(),
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RewriteViolation;
    use crate::plugins::LimitCap;
    use planx_core::id::PlanNodeIdAllocator;
    use planx_core::plan::{LimitNode, PlanKind, PlanNode};
    use planx_core::session::{Session, WarningCollector};

    struct Env {
        session: Session,
        warnings: WarningCollector,
        ids: PlanNodeIdAllocator,
    }

    impl Env {
        fn new() -> Self {
            Self {
                session: Session::default(),
                warnings: WarningCollector::new(),
                ids: PlanNodeIdAllocator::new(),
            }
        }

        fn ctx(&self) -> OptimizerContext<'_> {
            OptimizerContext::new(&self.session, &self.warnings, &self.ids)
        }
    }

    /// Rewrites the root Limit in place, keeping its id.
    struct KeepsRootId;

    impl PlanOptimizer for KeepsRootId {
        fn name(&self) -> &str {
            "keeps_root_id"
        }

        fn optimize(&self, plan: PlanRef, _ctx: &OptimizerContext<'_>) -> Result<PlanRef> {
            match plan.kind() {
                PlanKind::Limit(l) => Ok(PlanNode::with_id(
                    plan.id(),
                    PlanKind::Limit(LimitNode {
                        count: l.count + 1,
                        ..l.clone()
                    }),
                )),
                _ => Ok(plan),
            }
        }
    }

    /// Rebuilds the root with a fresh id and an identical payload.
    struct Renumber;

    impl PlanOptimizer for Renumber {
        fn name(&self) -> &str {
            "renumber"
        }

        fn optimize(&self, plan: PlanRef, ctx: &OptimizerContext<'_>) -> Result<PlanRef> {
            Ok(PlanNode::new(ctx.ids, plan.kind().clone()))
        }
    }

    struct Broken;

    impl PlanOptimizer for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn optimize(&self, _plan: PlanRef, _ctx: &OptimizerContext<'_>) -> Result<PlanRef> {
            Err(planx_core::Error::Invariant("boom".into()).into())
        }
    }

    #[test]
    fn empty_pipeline_returns_input() {
        let env = Env::new();
        let plan = PlanNode::scan(&env.ids, "t", vec![]);
        let out = OptimizerPipeline::new(vec![])
            .run(plan.clone(), &env.ctx())
            .unwrap();
        assert!(Arc::ptr_eq(&out.plan, &plan));
        assert!(!out.changed());
    }

    #[test]
    fn records_one_trace_per_optimizer() {
        let env = Env::new();
        let plan = PlanNode::limit(
            &env.ids,
            PlanNode::filter(&env.ids, PlanNode::scan(&env.ids, "t", vec![]), "true"),
            10,
        );
        let out = OptimizerPipeline::with_builtins()
            .with_tracing(true)
            .run(plan, &env.ctx())
            .unwrap();

        let names: Vec<&str> = out.passes.iter().map(|p| p.optimizer.as_str()).collect();
        assert_eq!(names, ["remove_trivial_filter", "merge_limits"]);
        assert!(out.passes[0].changed);
        assert!(!out.passes[1].changed);
        assert!(out.passes[0].before.is_some());
        assert_ne!(out.passes[0].before, out.passes[0].after);
    }

    #[test]
    fn validation_rejects_reused_root_id() {
        let env = Env::new();
        let plan = PlanNode::limit(&env.ids, PlanNode::scan(&env.ids, "t", vec![]), 10);
        let err = OptimizerPipeline::new(vec![Arc::new(KeepsRootId)])
            .run(plan.clone(), &env.ctx())
            .unwrap_err();
        match err {
            OptimizerError::Rewrite {
                optimizer,
                violation,
            } => {
                assert_eq!(optimizer, "keeps_root_id");
                assert_eq!(violation, RewriteViolation::ReusedId { id: plan.id() });
            }
            other => panic!("unexpected {other}"),
        }
    }

    #[test]
    fn validation_can_be_switched_off() {
        let env = Env::new();
        let plan = PlanNode::limit(&env.ids, PlanNode::scan(&env.ids, "t", vec![]), 10);
        let out = OptimizerPipeline::new(vec![Arc::new(KeepsRootId)])
            .with_validation(false)
            .run(plan, &env.ctx())
            .unwrap();
        assert!(out.changed());
    }

    #[test]
    fn failing_optimizer_is_named() {
        let env = Env::new();
        let plan = PlanNode::scan(&env.ids, "t", vec![]);
        let err = OptimizerPipeline::new(vec![Arc::new(Broken)])
            .run(plan, &env.ctx())
            .unwrap_err();
        assert!(matches!(
            err,
            OptimizerError::Failed { ref optimizer, .. } if optimizer == "broken"
        ));
    }

    #[test]
    fn fixpoint_stops_when_nothing_changes() {
        let env = Env::new();
        let plan = PlanNode::limit(
            &env.ids,
            PlanNode::limit(&env.ids, PlanNode::scan(&env.ids, "t", vec![]), 20_000),
            30_000,
        );
        let pipeline = OptimizerPipeline::new(vec![
            Arc::new(LimitCap::new(100)),
            Arc::new(crate::rules::MergeLimits),
        ]);
        let out = pipeline.run_to_fixpoint(plan, &env.ctx(), 8).unwrap();

        assert_eq!(out.iterations, 2);
        assert_eq!(out.plan.node_count(), 2);
        match out.plan.kind() {
            PlanKind::Limit(l) => assert_eq!(l.count, 100),
            k => panic!("unexpected {}", k.name()),
        }
    }

    #[test]
    fn fixpoint_respects_iteration_cap() {
        let env = Env::new();
        let plan = PlanNode::limit(&env.ids, PlanNode::scan(&env.ids, "t", vec![]), 1);
        let out = OptimizerPipeline::new(vec![Arc::new(KeepsRootId)])
            .with_validation(false)
            .run_to_fixpoint(plan, &env.ctx(), 3)
            .unwrap();
        assert_eq!(out.iterations, 3);
        assert_eq!(out.changes(), 3);
    }

    #[test]
    fn stats_count_invocations_and_changes() {
        let env = Env::new();
        let stats = Arc::new(RuleStatsRecorder::new());
        let pipeline = OptimizerPipeline::with_builtins().with_stats(Arc::clone(&stats));
        let plan = PlanNode::filter(&env.ids, PlanNode::scan(&env.ids, "t", vec![]), "true");
        pipeline.run(plan, &env.ctx()).unwrap();

        let filter = stats.get("remove_trivial_filter").unwrap();
        assert_eq!((filter.invocations, filter.changes), (1, 1));
        let merge = stats.get("merge_limits").unwrap();
        assert_eq!((merge.invocations, merge.changes), (1, 0));
    }

    #[test]
    fn renumbered_only_needs_an_identical_payload() {
        let env = Env::new();
        let plan = PlanNode::limit(&env.ids, PlanNode::scan(&env.ids, "t", vec![]), 10_000);
        let out = OptimizerPipeline::new(vec![Arc::new(Renumber), Arc::new(LimitCap::new(10))])
            .with_tracing(true)
            .run(plan, &env.ctx())
            .unwrap();
        assert!(out.passes[0].renumbered_only());
        assert!(out.passes[1].changed);
        assert!(!out.passes[1].renumbered_only());
    }
}
