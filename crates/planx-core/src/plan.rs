//! Immutable plan tree.
//!
//! A `PlanNode` is one step of query execution. Nodes are always handled
//! through `PlanRef = Arc<PlanNode>`: children are shared by reference, and a
//! "modified" node is a new node with a fresh id. Identity comparisons use
//! `Arc::ptr_eq`, which is what lets rewrites detect untouched subtrees cheaply.

use std::fmt::{self, Write as _};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::id::{PlanNodeId, PlanNodeIdAllocator};

/// Shared handle to an immutable plan node.
pub type PlanRef = Arc<PlanNode>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinType {
    #[default]
    Inner,
    Left,
    Right,
    Full,
}

/// Where an exchange moves rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeScope {
    /// Between drivers of the same task.
    Local,
    /// Across tasks / workers.
    Remote,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanNode {
    pub table: String,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValuesNode {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FilterNode {
    pub source: PlanRef,
    pub predicate: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectNode {
    pub source: PlanRef,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LimitNode {
    pub source: PlanRef,
    pub count: u64,
    /// Partial limits run before an exchange; a final limit follows it.
    pub partial: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SortNode {
    pub source: PlanRef,
    pub order_by: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AggregateNode {
    pub source: PlanRef,
    pub group_by: Vec<String>,
    pub aggregates: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExchangeNode {
    pub sources: Vec<PlanRef>,
    pub scope: ExchangeScope,
    /// Partitioning columns; empty means gather/round-robin.
    pub partitioning: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JoinNode {
    pub left: PlanRef,
    pub right: PlanRef,
    pub join_type: JoinType,
    pub on: Vec<(String, String)>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutputNode {
    pub source: PlanRef,
    pub columns: Vec<String>,
}

/// Kind-specific payload plus the node's children.
///
/// Non-exhaustive: rewriters outside this crate must keep a catch-all arm, so
/// adding a kind never breaks an existing optimizer.
#[derive(Debug, Clone, Serialize)]
#[non_exhaustive]
pub enum PlanKind {
    Scan(ScanNode),
    Values(ValuesNode),
    Filter(FilterNode),
    Project(ProjectNode),
    Limit(LimitNode),
    Sort(SortNode),
    Aggregate(AggregateNode),
    Exchange(ExchangeNode),
    Join(JoinNode),
    Output(OutputNode),
}

impl PlanKind {
    /// Stable, human-readable kind name.
    pub fn name(&self) -> &'static str {
        use PlanKind::*;
        match self {
            Scan(_) => "Scan",
            Values(_) => "Values",
            Filter(_) => "Filter",
            Project(_) => "Project",
            Limit(_) => "Limit",
            Sort(_) => "Sort",
            Aggregate(_) => "Aggregate",
            Exchange(_) => "Exchange",
            Join(_) => "Join",
            Output(_) => "Output",
        }
    }

    /// Children in order.
    pub fn children(&self) -> Vec<&PlanRef> {
        use PlanKind::*;
        match self {
            Scan(_) | Values(_) => vec![],
            Filter(n) => vec![&n.source],
            Project(n) => vec![&n.source],
            Limit(n) => vec![&n.source],
            Sort(n) => vec![&n.source],
            Aggregate(n) => vec![&n.source],
            Output(n) => vec![&n.source],
            Exchange(n) => n.sources.iter().collect(),
            Join(n) => vec![&n.left, &n.right],
        }
    }

    /// Same payload, each child replaced by `f(child)`. Arity is preserved by
    /// construction.
    pub fn map_children(&self, mut f: impl FnMut(&PlanRef) -> PlanRef) -> PlanKind {
        use PlanKind::*;
        match self {
            Scan(n) => Scan(n.clone()),
            Values(n) => Values(n.clone()),
            Filter(n) => Filter(FilterNode {
                source: f(&n.source),
                predicate: n.predicate.clone(),
            }),
            Project(n) => Project(ProjectNode {
                source: f(&n.source),
                columns: n.columns.clone(),
            }),
            Limit(n) => Limit(LimitNode {
                source: f(&n.source),
                count: n.count,
                partial: n.partial,
            }),
            Sort(n) => Sort(SortNode {
                source: f(&n.source),
                order_by: n.order_by.clone(),
            }),
            Aggregate(n) => Aggregate(AggregateNode {
                source: f(&n.source),
                group_by: n.group_by.clone(),
                aggregates: n.aggregates.clone(),
            }),
            Output(n) => Output(OutputNode {
                source: f(&n.source),
                columns: n.columns.clone(),
            }),
            Exchange(n) => Exchange(ExchangeNode {
                sources: n.sources.iter().map(&mut f).collect(),
                scope: n.scope,
                partitioning: n.partitioning.clone(),
            }),
            Join(n) => Join(JoinNode {
                left: f(&n.left),
                right: f(&n.right),
                join_type: n.join_type,
                on: n.on.clone(),
            }),
        }
    }

    /// Same payload, different children. The child count must match.
    pub fn replace_children(&self, children: Vec<PlanRef>) -> Result<PlanKind> {
        let expected = self.children().len();
        if children.len() != expected {
            return Err(Error::Invariant(format!(
                "{} expects {} children, got {}",
                self.name(),
                expected,
                children.len()
            )));
        }
        let mut it = children.into_iter();
        Ok(self.map_children(|old| it.next().unwrap_or_else(|| Arc::clone(old))))
    }

    pub(crate) fn label(&self) -> String {
        use PlanKind::*;
        match self {
            Scan(n) => format!("Scan[table={}, columns={:?}]", n.table, n.columns),
            Values(n) => format!("Values[columns={:?}, rows={}]", n.columns, n.rows.len()),
            Filter(n) => format!("Filter[{}]", n.predicate),
            Project(n) => format!("Project[{:?}]", n.columns),
            Limit(n) => format!(
                "Limit[count={}{}]",
                n.count,
                if n.partial { ", partial" } else { "" }
            ),
            Sort(n) => format!("Sort[{:?}]", n.order_by),
            Aggregate(n) => format!(
                "Aggregate[group_by={:?}, aggs={:?}]",
                n.group_by, n.aggregates
            ),
            Exchange(n) => format!("Exchange[{:?}, partitioning={:?}]", n.scope, n.partitioning),
            Join(n) => format!("Join[{:?}, on={:?}]", n.join_type, n.on),
            Output(n) => format!("Output[{:?}]", n.columns),
        }
    }
}

/// One immutable step of a query plan.
#[derive(Debug, Serialize)]
pub struct PlanNode {
    id: PlanNodeId,
    kind: PlanKind,
}

impl PlanNode {
    /// Build a node with a fresh id from `ids`.
    pub fn new(ids: &PlanNodeIdAllocator, kind: PlanKind) -> PlanRef {
        Arc::new(Self {
            id: ids.next_id(),
            kind,
        })
    }

    /// Build a node with a caller-chosen id. Hosts use this when importing
    /// plans numbered elsewhere; optimizers should use `new`.
    pub fn with_id(id: PlanNodeId, kind: PlanKind) -> PlanRef {
        Arc::new(Self { id, kind })
    }

    pub fn id(&self) -> PlanNodeId {
        self.id
    }

    pub fn kind(&self) -> &PlanKind {
        &self.kind
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn children(&self) -> Vec<&PlanRef> {
        self.kind.children()
    }

    pub fn is_leaf(&self) -> bool {
        self.children().is_empty()
    }

    /// Rebuild this node under `id` with `children` in place of the current ones.
    pub fn with_children(&self, id: PlanNodeId, children: Vec<PlanRef>) -> Result<PlanRef> {
        Ok(Self::with_id(id, self.kind.replace_children(children)?))
    }

    /// Number of nodes in the tree rooted here (shared subtrees counted per use).
    pub fn node_count(&self) -> usize {
        1 + self
            .children()
            .into_iter()
            .map(|c| c.node_count())
            .sum::<usize>()
    }

    /// Indented, id-annotated rendering of the tree.
    pub fn explain(&self) -> String {
        let mut out = String::new();
        self.explain_into(&mut out, 0);
        out
    }

    /// Pretty JSON of the tree, ids included.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    fn explain_into(&self, out: &mut String, depth: usize) {
        let _ = writeln!(
            out,
            "{:indent$}{} #{}",
            "",
            self.kind.label(),
            self.id.get(),
            indent = depth * 2
        );
        for child in self.children() {
            child.explain_into(out, depth + 1);
        }
    }

    // Convenience constructors used by hosts, the DSL and tests.

    pub fn scan(
        ids: &PlanNodeIdAllocator,
        table: impl Into<String>,
        columns: Vec<String>,
    ) -> PlanRef {
        Self::new(
            ids,
            PlanKind::Scan(ScanNode {
                table: table.into(),
                columns,
            }),
        )
    }

    pub fn filter(
        ids: &PlanNodeIdAllocator,
        source: PlanRef,
        predicate: impl Into<String>,
    ) -> PlanRef {
        Self::new(
            ids,
            PlanKind::Filter(FilterNode {
                source,
                predicate: predicate.into(),
            }),
        )
    }

    pub fn project(ids: &PlanNodeIdAllocator, source: PlanRef, columns: Vec<String>) -> PlanRef {
        Self::new(ids, PlanKind::Project(ProjectNode { source, columns }))
    }

    pub fn limit(ids: &PlanNodeIdAllocator, source: PlanRef, count: u64) -> PlanRef {
        Self::new(
            ids,
            PlanKind::Limit(LimitNode {
                source,
                count,
                partial: false,
            }),
        )
    }

    pub fn join(
        ids: &PlanNodeIdAllocator,
        left: PlanRef,
        right: PlanRef,
        join_type: JoinType,
        on: Vec<(String, String)>,
    ) -> PlanRef {
        Self::new(
            ids,
            PlanKind::Join(JoinNode {
                left,
                right,
                join_type,
                on,
            }),
        )
    }
}

impl fmt::Display for PlanNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.explain())
    }
}

/// Pre-order walk over every node position in the tree.
pub fn for_each_node<'a>(root: &'a PlanRef, f: &mut dyn FnMut(&'a PlanRef)) {
    f(root);
    for child in root.children() {
        for_each_node(child, f);
    }
}
