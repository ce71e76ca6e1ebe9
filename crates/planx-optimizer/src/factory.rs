//! The factory half of the plugin protocol.
//!
//! A factory is constructed with no arguments (by its registry constructor)
//! and turns the planner's dependency bundle into a ready optimizer. It holds
//! no configuration of its own: anything it needs comes from the bundle.

use crate::deps::PlannerDependencies;
use crate::error::FactoryError;
use crate::optimizer::PlanOptimizer;

pub trait OptimizerFactory: Send + Sync {
    /// Build an optimizer. Must not do I/O beyond cheap local lookups and must
    /// not have side effects other than constructing the optimizer.
    fn build(&self, deps: &PlannerDependencies) -> Result<Box<dyn PlanOptimizer>, FactoryError>;
}
