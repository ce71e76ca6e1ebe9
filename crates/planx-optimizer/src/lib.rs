#![forbid(unsafe_code)]
//! planx-optimizer: everything that turns a plan into a better plan.
//!
//! - `rewrite`: the generic tree rewrite engine (`PlanRewriter`, `rewrite_with`).
//! - `optimizer` / `factory`: the two plugin-facing traits.
//! - `deps`: the dependency bundle factories build from.
//! - `registry`: identifier → factory table and the fault-isolating loader.
//! - `pipeline`: built-ins first, then plugins, with per-pass validation.
//! - `rules` / `plugins`: the built-in optimizers and the bundled plugin.
//! - `dsl`: YAML plan descriptions for the CLI and tests.

pub mod deps;
pub mod dsl;
pub mod error;
pub mod factory;
pub mod optimizer;
pub mod pipeline;
pub mod plugins;
pub mod registry;
pub mod rewrite;
pub mod rules;
pub mod validate;

pub use deps::{PlannerDependencies, RuleStatsRecorder};
pub use dsl::yaml::{parse_yaml_document, parse_yaml_plan, DslError, ParsedPlan};
pub use error::{FactoryError, LoadError, LoadStage, OptimizerError, Result, RewriteViolation};
pub use factory::OptimizerFactory;
pub use optimizer::{OptimizerContext, PlanOptimizer};
pub use pipeline::{OptimizerPipeline, PassOrigin, PassTrace, PipelineOutcome};
pub use plugins::{LimitCap, LimitCapFactory, LIMIT_CAP};
pub use registry::{
    bundled_registry, load_configured, load_optimizers, FactoryRegistry, LoadedOptimizer,
    LoadedOptimizers,
};
pub use rewrite::{rewrite_with, PlanRewriter, RewriteContext};
pub use rules::{builtin_optimizers, MergeLimits, RemoveTrivialFilter};
pub use validate::{validate_rewrite, RewriteValidator};
