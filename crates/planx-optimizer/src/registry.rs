//! Registration table and loader for plugged-in optimizers.
//!
//! Plugins are configured by name. The host fills a `FactoryRegistry` with
//! `identifier → constructor` entries at start-up (no reflection, no global
//! state), then `load_optimizers` walks the configured identifiers:
//!
//! ```text
//! Pending --resolve--> Resolved --construct--> Instantiated --build--> Built
//!    \___________________\________________________\____________> Failed (logged, skipped)
//! ```
//!
//! A failing entry never stops the others; the output keeps configuration
//! order with failed entries left out.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::deps::PlannerDependencies;
use crate::error::{FactoryError, LoadError, LoadStage};
use crate::factory::OptimizerFactory;
use crate::optimizer::PlanOptimizer;
use crate::plugins::{LimitCapFactory, LIMIT_CAP};

/// No-argument factory constructor.
pub type FactoryConstructor =
    Arc<dyn Fn() -> Result<Box<dyn OptimizerFactory>, FactoryError> + Send + Sync>;

#[derive(Clone, Default)]
pub struct FactoryRegistry {
    constructors: BTreeMap<String, FactoryConstructor>,
}

impl FactoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `constructor` under `identifier`. A later registration under
    /// the same identifier replaces the earlier one.
    pub fn register<F>(&mut self, identifier: impl Into<String>, constructor: F)
    where
        F: Fn() -> Result<Box<dyn OptimizerFactory>, FactoryError> + Send + Sync + 'static,
    {
        let identifier = identifier.into();
        if self
            .constructors
            .insert(identifier.clone(), Arc::new(constructor))
            .is_some()
        {
            warn!(identifier = %identifier, "replacing registered optimizer factory");
        }
    }

    /// Register a factory type built with `Default`.
    pub fn register_default<F>(&mut self, identifier: impl Into<String>)
    where
        F: OptimizerFactory + Default + 'static,
    {
        self.register(identifier, || {
            Ok(Box::new(F::default()) as Box<dyn OptimizerFactory>)
        });
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.constructors.contains_key(identifier)
    }

    /// Registered identifiers, sorted.
    pub fn identifiers(&self) -> Vec<&str> {
        self.constructors.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }

    fn resolve(&self, identifier: &str) -> Option<&FactoryConstructor> {
        self.constructors.get(identifier)
    }
}

impl fmt::Debug for FactoryRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactoryRegistry")
            .field("identifiers", &self.identifiers())
            .finish()
    }
}

/// Registry preloaded with the plugins shipped in this crate.
pub fn bundled_registry() -> FactoryRegistry {
    let mut registry = FactoryRegistry::new();
    registry.register_default::<LimitCapFactory>(LIMIT_CAP);
    registry
}

/// One successfully built plugin.
#[derive(Clone)]
pub struct LoadedOptimizer {
    pub identifier: String,
    pub optimizer: Arc<dyn PlanOptimizer>,
}

impl fmt::Debug for LoadedOptimizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedOptimizer")
            .field("identifier", &self.identifier)
            .field("optimizer", &self.optimizer.name())
            .finish()
    }
}

/// Result of loading the configured plugins.
#[derive(Debug, Default)]
pub struct LoadedOptimizers {
    loaded: Vec<LoadedOptimizer>,
    failures: Vec<LoadError>,
}

impl LoadedOptimizers {
    /// Built optimizers, in configuration order.
    pub fn loaded(&self) -> &[LoadedOptimizer] {
        &self.loaded
    }

    pub fn failures(&self) -> &[LoadError] {
        &self.failures
    }

    pub fn len(&self) -> usize {
        self.loaded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loaded.is_empty()
    }

    pub fn optimizers(&self) -> Vec<Arc<dyn PlanOptimizer>> {
        self.loaded.iter().map(|l| Arc::clone(&l.optimizer)).collect()
    }

    pub fn into_optimizers(self) -> Vec<Arc<dyn PlanOptimizer>> {
        self.loaded.into_iter().map(|l| l.optimizer).collect()
    }
}

/// Resolve, instantiate and build every configured identifier.
///
/// Blank identifiers are skipped silently. Every other failure is logged once
/// (`identifier`, `stage`, `reason`) and recorded in `failures`.
pub fn load_optimizers<S: AsRef<str>>(
    registry: &FactoryRegistry,
    identifiers: &[S],
    deps: &PlannerDependencies,
) -> LoadedOptimizers {
    let mut out = LoadedOptimizers::default();

    for raw in identifiers {
        let identifier = raw.as_ref().trim();
        if identifier.is_empty() {
            continue;
        }

        match load_one(registry, identifier, deps) {
            Ok(optimizer) => {
                info!(identifier, optimizer = optimizer.name(), "loaded plan optimizer");
                out.loaded.push(LoadedOptimizer {
                    identifier: identifier.to_string(),
                    optimizer,
                });
            }
            Err(err) => {
                warn!(
                    identifier,
                    stage = ?err.stage(),
                    reason = %err,
                    "skipping plan optimizer"
                );
                out.failures.push(err);
            }
        }
    }

    out
}

/// `load_optimizers` over `deps.config().additional_plan_optimizers`.
pub fn load_configured(registry: &FactoryRegistry, deps: &PlannerDependencies) -> LoadedOptimizers {
    load_optimizers(registry, &deps.config().additional_plan_optimizers, deps)
}

fn load_one(
    registry: &FactoryRegistry,
    identifier: &str,
    deps: &PlannerDependencies,
) -> Result<Arc<dyn PlanOptimizer>, LoadError> {
    let constructor = registry
        .resolve(identifier)
        .ok_or_else(|| LoadError::Unresolved {
            identifier: identifier.to_string(),
        })?;
    debug!(identifier, stage = ?LoadStage::Resolved, "optimizer factory resolved");

    let factory = contain(|| (**constructor)()).map_err(|reason| LoadError::Instantiate {
        identifier: identifier.to_string(),
        reason,
    })?;
    debug!(identifier, stage = ?LoadStage::Instantiated, "optimizer factory instantiated");

    let optimizer = contain(|| factory.build(deps)).map_err(|reason| LoadError::Build {
        identifier: identifier.to_string(),
        reason,
    })?;
    debug!(identifier, stage = ?LoadStage::Built, "optimizer built");

    Ok(Arc::from(optimizer))
}

/// Run plugin code, turning both errors and panics into a reason string.
fn contain<T>(f: impl FnOnce() -> Result<T, FactoryError>) -> Result<T, String> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(err.to_string()),
        Err(payload) => Err(format!("panicked: {}", panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
