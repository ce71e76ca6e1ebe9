//! Read-only session state handed to optimizers, and the warning sink.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Session-scoped settings for one query. Optimizers read these; they never
/// change during a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub query_id: Uuid,
    pub user: String,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl Session {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            query_id: Uuid::new_v4(),
            user: user.into(),
            properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Boolean session property; anything other than `true`/`false` counts as unset.
    pub fn flag(&self, key: &str) -> Option<bool> {
        self.property(key).and_then(|v| v.parse().ok())
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new("planx")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanWarning {
    /// Who raised it (usually an optimizer name).
    pub source: String,
    pub message: String,
}

/// Collects non-fatal planner warnings for the current query.
///
/// Takes `&self` so it can live in a shared context; the lock is uncontended
/// because a pipeline run is sequential.
#[derive(Debug, Default)]
pub struct WarningCollector {
    warnings: Mutex<Vec<PlanWarning>>,
}

impl WarningCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, source: impl Into<String>, message: impl Into<String>) {
        let warning = PlanWarning {
            source: source.into(),
            message: message.into(),
        };
        tracing::debug!(source = %warning.source, message = %warning.message, "planner warning");
        self.warnings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(warning);
    }

    pub fn warnings(&self) -> Vec<PlanWarning> {
        self.warnings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_empty(&self) -> bool {
        self.warnings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }
}
