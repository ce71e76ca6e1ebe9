//! Planner configuration that downstream crates can serialize/deserialize.
//!
//! Layering, lowest to highest: `Default` → YAML document → environment →
//! explicit overrides by the host (e.g. CLI flags).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Factory identifiers for plugged-in optimizers, in pipeline order.
    /// They run after every built-in optimizer.
    pub additional_plan_optimizers: Vec<String>,

    /// Check every optimizer's output for id/ownership violations.
    pub validate_rewrites: bool,

    /// Upper bound on whole-pipeline passes when running to a fixpoint.
    pub max_fixpoint_iterations: usize,

    /// Plan for a single node (no remote exchanges).
    pub force_single_node: bool,

    /// Record per-pass fingerprints in the pipeline outcome.
    pub trace_pipeline: bool,

    /// Free-form settings plugins may read at build time, e.g.
    /// `limit_cap.max_rows: "7999"`.
    pub plugin_settings: BTreeMap<String, String>,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            additional_plan_optimizers: Vec::new(),
            validate_rewrites: true,
            max_fixpoint_iterations: 16,
            force_single_node: false,
            trace_pipeline: false,
            plugin_settings: BTreeMap::new(),
        }
    }
}

impl PlannerConfig {
    /// Parse a YAML document; missing keys keep their defaults.
    pub fn from_yaml(src: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(src)?)
    }

    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `PLANX_ADDITIONAL_PLAN_OPTIMIZERS`: comma-separated factory identifiers
    /// - `PLANX_VALIDATE_REWRITES`: `true`/`false`
    /// - `PLANX_MAX_FIXPOINT_ITERATIONS`: pass cap for fixpoint runs
    /// - `PLANX_FORCE_SINGLE_NODE`: `true`/`false`
    /// - `PLANX_TRACE_PIPELINE`: `true`/`false`
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.apply_env();
        cfg
    }

    /// Overlay environment variables onto `self`. Unparseable values are
    /// ignored with a warning.
    pub fn apply_env(&mut self) {
        self.apply_vars(|key| std::env::var(key).ok());
    }

    fn apply_vars(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(s) = var("PLANX_ADDITIONAL_PLAN_OPTIMIZERS") {
            self.additional_plan_optimizers = parse_identifier_list(&s);
        }

        if let Some(s) = var("PLANX_VALIDATE_REWRITES") {
            set_parsed(&mut self.validate_rewrites, "PLANX_VALIDATE_REWRITES", &s);
        }

        if let Some(s) = var("PLANX_MAX_FIXPOINT_ITERATIONS") {
            set_parsed(
                &mut self.max_fixpoint_iterations,
                "PLANX_MAX_FIXPOINT_ITERATIONS",
                &s,
            );
        }

        if let Some(s) = var("PLANX_FORCE_SINGLE_NODE") {
            set_parsed(&mut self.force_single_node, "PLANX_FORCE_SINGLE_NODE", &s);
        }

        if let Some(s) = var("PLANX_TRACE_PIPELINE") {
            set_parsed(&mut self.trace_pipeline, "PLANX_TRACE_PIPELINE", &s);
        }
    }

    pub fn plugin_setting(&self, key: &str) -> Option<&str> {
        self.plugin_settings.get(key).map(String::as_str)
    }
}

/// Split a comma-separated identifier list, trimming blanks.
pub fn parse_identifier_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

fn set_parsed<T: std::str::FromStr>(slot: &mut T, key: &str, raw: &str) {
    match raw.trim().parse::<T>() {
        Ok(v) => *slot = v,
        Err(_) => tracing::warn!(key, value = raw, "ignoring unparseable config value"),
    }
}
