use thiserror::Error;

use planx_core::id::PlanNodeId;

/// Raised by factory constructors and `OptimizerFactory::build`.
#[derive(Debug, Error)]
pub enum FactoryError {
    #[error("missing capability: {0}")]
    MissingCapability(String),

    #[error("invalid setting {key}={value:?}: {reason}")]
    InvalidSetting {
        key: String,
        value: String,
        reason: String,
    },

    #[error("{0}")]
    Other(String),
}

/// How far a configured entry got before loading stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LoadStage {
    Pending,
    Resolved,
    Instantiated,
    Built,
}

/// Per-entry load failure. Always recovered by the loader: the entry is
/// logged and skipped.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("no optimizer factory registered as '{identifier}'")]
    Unresolved { identifier: String },

    #[error("cannot instantiate optimizer factory '{identifier}': {reason}")]
    Instantiate { identifier: String, reason: String },

    #[error("optimizer factory '{identifier}' failed to build: {reason}")]
    Build { identifier: String, reason: String },
}

impl LoadError {
    pub fn identifier(&self) -> &str {
        match self {
            LoadError::Unresolved { identifier }
            | LoadError::Instantiate { identifier, .. }
            | LoadError::Build { identifier, .. } => identifier,
        }
    }

    /// Last stage the entry completed before failing.
    pub fn stage(&self) -> LoadStage {
        match self {
            LoadError::Unresolved { .. } => LoadStage::Pending,
            LoadError::Instantiate { .. } => LoadStage::Resolved,
            LoadError::Build { .. } => LoadStage::Instantiated,
        }
    }
}

/// Structurally invalid optimizer output. Fatal for the pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RewriteViolation {
    #[error("{id} appears more than once in the rewritten plan")]
    DuplicateId { id: PlanNodeId },

    #[error("{id} was reused for a different node than in the input plan")]
    ReusedId { id: PlanNodeId },

    #[error("{id} was not issued by the session id allocator")]
    ForeignId { id: PlanNodeId },

    #[error("{id} was dropped by an earlier rewrite and cannot name a new node")]
    RetiredId { id: PlanNodeId },
}

/// Result type for a pipeline run.
pub type Result<T> = std::result::Result<T, OptimizerError>;

#[derive(Debug, Error)]
pub enum OptimizerError {
    #[error("optimizer '{optimizer}' produced an invalid plan: {violation}")]
    Rewrite {
        optimizer: String,
        violation: RewriteViolation,
    },

    #[error("optimizer '{optimizer}' failed: {reason}")]
    Failed { optimizer: String, reason: String },

    #[error(transparent)]
    Core(#[from] planx_core::Error),
}
