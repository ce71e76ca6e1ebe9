//! Convenient re-exports for downstream crates.

pub use crate::config::PlannerConfig;
pub use crate::error::{Error, Result};
pub use crate::hash::{fingerprint, Hash256};
pub use crate::id::{PlanNodeId, PlanNodeIdAllocator};
pub use crate::plan::{
    AggregateNode, ExchangeNode, ExchangeScope, FilterNode, JoinNode, JoinType, LimitNode,
    OutputNode, PlanKind, PlanNode, PlanRef, ProjectNode, ScanNode, SortNode, ValuesNode,
};
pub use crate::session::{PlanWarning, Session, WarningCollector};
pub use crate::sharing::substitute;
