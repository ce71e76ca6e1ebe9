//! YAML → plan tree parser.
//!
//! Example:
//! ```yaml
//! config:
//!   additional_plan_optimizers: [limit_cap]
//! plan:
//!   op: limit
//!   count: 10000
//!   source:
//!     op: filter
//!     predicate: "o_total > 100"
//!     source: { op: scan, table: orders, columns: [o_id, o_total] }
//! ```
//!
//! Ids are allocated children first, so leaves carry the smallest ids.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use planx_core::config::PlannerConfig;
use planx_core::id::PlanNodeIdAllocator;
use planx_core::plan::{
    AggregateNode, ExchangeNode, ExchangeScope, FilterNode, JoinNode, JoinType, LimitNode,
    OutputNode, PlanKind, PlanNode, PlanRef, ProjectNode, ScanNode, SortNode, ValuesNode,
};

#[derive(Debug, Error)]
pub enum DslError {
    #[error("yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid plan: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanDocument {
    #[serde(default)]
    pub config: Option<PlannerConfig>,
    pub plan: NodeDef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "op")]
pub enum NodeDef {
    Scan {
        table: String,
        #[serde(default)]
        columns: Vec<String>,
    },
    Values {
        columns: Vec<String>,
        #[serde(default)]
        rows: Vec<Vec<String>>,
    },
    Filter {
        predicate: String,
        source: Box<NodeDef>,
    },
    Project {
        columns: Vec<String>,
        source: Box<NodeDef>,
    },
    Limit {
        count: u64,
        #[serde(default)]
        partial: bool,
        source: Box<NodeDef>,
    },
    Sort {
        order_by: Vec<String>,
        source: Box<NodeDef>,
    },
    Aggregate {
        #[serde(default)]
        group_by: Vec<String>,
        aggregates: Vec<String>,
        source: Box<NodeDef>,
    },
    Exchange {
        scope: ExchangeScope,
        #[serde(default)]
        partitioning: Vec<String>,
        sources: Vec<NodeDef>,
    },
    Join {
        #[serde(default)]
        join_type: JoinType,
        #[serde(default)]
        on: Vec<(String, String)>,
        left: Box<NodeDef>,
        right: Box<NodeDef>,
    },
    Output {
        columns: Vec<String>,
        source: Box<NodeDef>,
    },
}

#[derive(Debug, Clone)]
pub struct ParsedPlan {
    pub plan: PlanRef,
    pub config: PlannerConfig,
}

/// Parse a plan document, returning the tree and its embedded config
/// (defaults when the document has none).
pub fn parse_yaml_document(src: &str, ids: &PlanNodeIdAllocator) -> Result<ParsedPlan, DslError> {
    let doc: PlanDocument = serde_yaml::from_str(src)?;
    Ok(ParsedPlan {
        plan: build(&doc.plan, ids)?,
        config: doc.config.unwrap_or_default(),
    })
}

/// Parse a plan document and return only the tree.
pub fn parse_yaml_plan(src: &str, ids: &PlanNodeIdAllocator) -> Result<PlanRef, DslError> {
    parse_yaml_document(src, ids).map(|parsed| parsed.plan)
}

fn build(def: &NodeDef, ids: &PlanNodeIdAllocator) -> Result<PlanRef, DslError> {
    let kind = match def {
        NodeDef::Scan { table, columns } => {
            if table.trim().is_empty() {
                return Err(DslError::Invalid("scan needs a table".into()));
            }
            PlanKind::Scan(ScanNode {
                table: table.clone(),
                columns: columns.clone(),
            })
        }
        NodeDef::Values { columns, rows } => {
            if let Some(bad) = rows.iter().position(|r| r.len() != columns.len()) {
                return Err(DslError::Invalid(format!(
                    "values row {bad} has {} fields, expected {}",
                    rows[bad].len(),
                    columns.len()
                )));
            }
            PlanKind::Values(ValuesNode {
                columns: columns.clone(),
                rows: rows.clone(),
            })
        }
        NodeDef::Filter { predicate, source } => PlanKind::Filter(FilterNode {
            source: build(source, ids)?,
            predicate: predicate.clone(),
        }),
        NodeDef::Project { columns, source } => PlanKind::Project(ProjectNode {
            source: build(source, ids)?,
            columns: columns.clone(),
        }),
        NodeDef::Limit {
            count,
            partial,
            source,
        } => PlanKind::Limit(LimitNode {
            source: build(source, ids)?,
            count: *count,
            partial: *partial,
        }),
        NodeDef::Sort { order_by, source } => PlanKind::Sort(SortNode {
            source: build(source, ids)?,
            order_by: order_by.clone(),
        }),
        NodeDef::Aggregate {
            group_by,
            aggregates,
            source,
        } => PlanKind::Aggregate(AggregateNode {
            source: build(source, ids)?,
            group_by: group_by.clone(),
            aggregates: aggregates.clone(),
        }),
        NodeDef::Exchange {
            scope,
            partitioning,
            sources,
        } => {
            if sources.is_empty() {
                return Err(DslError::Invalid("exchange needs at least one source".into()));
            }
            PlanKind::Exchange(ExchangeNode {
                sources: sources
                    .iter()
                    .map(|s| build(s, ids))
                    .collect::<Result<_, _>>()?,
                scope: *scope,
                partitioning: partitioning.clone(),
            })
        }
        NodeDef::Join {
            join_type,
            on,
            left,
            right,
        } => {
            let left = build(left, ids)?;
            let right = build(right, ids)?;
            PlanKind::Join(JoinNode {
                left,
                right,
                join_type: *join_type,
                on: on.clone(),
            })
        }
        NodeDef::Output { columns, source } => PlanKind::Output(OutputNode {
            source: build(source, ids)?,
            columns: columns.clone(),
        }),
    };
    Ok(PlanNode::new(ids, kind))
}
