#![forbid(unsafe_code)]
//! planx-core: the plan tree every optimizer rewrites, plus the small amount of
//! shared state a planning session carries around.
//!
//! - `plan`: immutable `PlanNode`s, shared through `PlanRef = Arc<PlanNode>`.
//! - `id`: typed node ids and the per-session `PlanNodeIdAllocator`.
//! - `sharing`: id-targeted substitution that rebuilds only the affected spine.
//! - `session`: read-only session settings and the planner warning sink.
//! - `config`: `PlannerConfig` (defaults → YAML → env).
//!
//! No optimizer logic lives here; see `planx-optimizer`.

pub mod config;
pub mod error;
pub mod hash;
pub mod id;
pub mod plan;
pub mod prelude;
pub mod session;
pub mod sharing;

pub use config::PlannerConfig;
pub use error::{Error, Result};
pub use id::{PlanNodeId, PlanNodeIdAllocator};
pub use plan::{PlanKind, PlanNode, PlanRef};
pub use session::{PlanWarning, Session, WarningCollector};
pub use sharing::substitute;
