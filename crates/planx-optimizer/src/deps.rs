//! The planner's shared dependency bundle.
//!
//! Everything here is owned by the host planner. The optimizer core only
//! forwards the bundle to factories; it never inspects or mutates it. The
//! traits are the interface boundary of services that live elsewhere (stats,
//! costing, splits, partitioning), with inert defaults so a host only has to
//! supply the ones it actually has.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use planx_core::config::PlannerConfig;
use planx_core::plan::PlanNode;

/// Output estimate for one plan node. `None` means unknown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanNodeStats {
    pub row_count: Option<f64>,
    pub output_bytes: Option<f64>,
}

/// Estimated cost of producing a node's output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanCost {
    pub cpu: f64,
    pub memory: f64,
    pub network: f64,
}

pub trait StatsCalculator: Send + Sync {
    fn estimate(&self, node: &PlanNode) -> PlanNodeStats;
}

pub trait CostCalculator: Send + Sync {
    fn cost(&self, node: &PlanNode, stats: &PlanNodeStats) -> PlanCost;
}

pub trait TaskCountEstimator: Send + Sync {
    /// Tasks a source-distributed stage would run with.
    fn source_distributed_task_count(&self) -> usize;
}

pub trait SplitManager: Send + Sync {
    /// Number of splits a scan of `table` would produce, if known.
    fn split_count(&self, table: &str) -> Option<usize>;
}

pub trait PageSourceManager: Send + Sync {
    /// Whether the connector behind `table` can skip unread columns.
    fn supports_column_pruning(&self, table: &str) -> bool;
}

pub trait NodePartitioningManager: Send + Sync {
    /// Partition count for an exchange on `columns` (empty = gather).
    fn partition_count(&self, columns: &[String]) -> usize;
}

/// Weighted comparison of two costs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostComparator {
    pub cpu_weight: f64,
    pub memory_weight: f64,
    pub network_weight: f64,
}

impl Default for CostComparator {
    fn default() -> Self {
        Self {
            cpu_weight: 75.0,
            memory_weight: 10.0,
            network_weight: 15.0,
        }
    }
}

impl CostComparator {
    pub fn weigh(&self, cost: &PlanCost) -> f64 {
        cost.cpu * self.cpu_weight
            + cost.memory * self.memory_weight
            + cost.network * self.network_weight
    }

    pub fn compare(&self, left: &PlanCost, right: &PlanCost) -> Ordering {
        self.weigh(left)
            .partial_cmp(&self.weigh(right))
            .unwrap_or(Ordering::Equal)
    }
}

/// Invocation/change counters per optimizer, shared by the host across runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleStats {
    pub invocations: u64,
    pub changes: u64,
}

#[derive(Debug, Default)]
pub struct RuleStatsRecorder {
    stats: Mutex<BTreeMap<String, RuleStats>>,
}

impl RuleStatsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, optimizer: &str, changed: bool) {
        let mut stats = self.lock();
        let entry = stats.entry(optimizer.to_string()).or_default();
        entry.invocations += 1;
        if changed {
            entry.changes += 1;
        }
    }

    pub fn get(&self, optimizer: &str) -> Option<RuleStats> {
        self.lock().get(optimizer).copied()
    }

    pub fn snapshot(&self) -> BTreeMap<String, RuleStats> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, RuleStats>> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// Inert defaults.

/// Knows nothing about anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnknownStats;

impl StatsCalculator for UnknownStats {
    fn estimate(&self, _node: &PlanNode) -> PlanNodeStats {
        PlanNodeStats::default()
    }
}

/// Costs rows as CPU; everything else is free.
#[derive(Debug, Default, Clone, Copy)]
pub struct RowCountCost;

impl CostCalculator for RowCountCost {
    fn cost(&self, _node: &PlanNode, stats: &PlanNodeStats) -> PlanCost {
        PlanCost {
            cpu: stats.row_count.unwrap_or(0.0),
            ..PlanCost::default()
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedTaskCount(pub usize);

impl TaskCountEstimator for FixedTaskCount {
    fn source_distributed_task_count(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoSplits;

impl SplitManager for NoSplits {
    fn split_count(&self, _table: &str) -> Option<usize> {
        None
    }
}

impl PageSourceManager for NoSplits {
    fn supports_column_pruning(&self, _table: &str) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedPartitioning(pub usize);

impl NodePartitioningManager for FixedPartitioning {
    fn partition_count(&self, columns: &[String]) -> usize {
        if columns.is_empty() {
            1
        } else {
            self.0
        }
    }
}

/// Immutable set of planner services handed to every `OptimizerFactory::build`.
#[derive(Clone)]
pub struct PlannerDependencies {
    config: Arc<PlannerConfig>,
    stats: Arc<dyn StatsCalculator>,
    cost: Arc<dyn CostCalculator>,
    exchange_cost: Arc<dyn CostCalculator>,
    cost_comparator: CostComparator,
    task_count: Arc<dyn TaskCountEstimator>,
    splits: Arc<dyn SplitManager>,
    page_sources: Arc<dyn PageSourceManager>,
    partitioning: Arc<dyn NodePartitioningManager>,
    rule_stats: Arc<RuleStatsRecorder>,
}

impl PlannerDependencies {
    pub fn builder() -> PlannerDependenciesBuilder {
        PlannerDependenciesBuilder::default()
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn force_single_node(&self) -> bool {
        self.config.force_single_node
    }

    pub fn stats(&self) -> &Arc<dyn StatsCalculator> {
        &self.stats
    }

    pub fn cost(&self) -> &Arc<dyn CostCalculator> {
        &self.cost
    }

    /// Cost calculator that also accounts for the exchanges a plan will need.
    pub fn exchange_cost(&self) -> &Arc<dyn CostCalculator> {
        &self.exchange_cost
    }

    pub fn cost_comparator(&self) -> &CostComparator {
        &self.cost_comparator
    }

    pub fn task_count(&self) -> &Arc<dyn TaskCountEstimator> {
        &self.task_count
    }

    pub fn splits(&self) -> &Arc<dyn SplitManager> {
        &self.splits
    }

    pub fn page_sources(&self) -> &Arc<dyn PageSourceManager> {
        &self.page_sources
    }

    pub fn partitioning(&self) -> &Arc<dyn NodePartitioningManager> {
        &self.partitioning
    }

    pub fn rule_stats(&self) -> &Arc<RuleStatsRecorder> {
        &self.rule_stats
    }
}

impl Default for PlannerDependencies {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl fmt::Debug for PlannerDependencies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlannerDependencies")
            .field("config", &self.config)
            .field("cost_comparator", &self.cost_comparator)
            .finish_non_exhaustive()
    }
}

/// Unset services fall back to the inert defaults above.
#[derive(Default)]
pub struct PlannerDependenciesBuilder {
    config: Option<PlannerConfig>,
    stats: Option<Arc<dyn StatsCalculator>>,
    cost: Option<Arc<dyn CostCalculator>>,
    exchange_cost: Option<Arc<dyn CostCalculator>>,
    cost_comparator: Option<CostComparator>,
    task_count: Option<Arc<dyn TaskCountEstimator>>,
    splits: Option<Arc<dyn SplitManager>>,
    page_sources: Option<Arc<dyn PageSourceManager>>,
    partitioning: Option<Arc<dyn NodePartitioningManager>>,
    rule_stats: Option<Arc<RuleStatsRecorder>>,
}

impl PlannerDependenciesBuilder {
    pub fn config(mut self, config: PlannerConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn stats(mut self, stats: Arc<dyn StatsCalculator>) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn cost(mut self, cost: Arc<dyn CostCalculator>) -> Self {
        self.cost = Some(cost);
        self
    }

    pub fn exchange_cost(mut self, cost: Arc<dyn CostCalculator>) -> Self {
        self.exchange_cost = Some(cost);
        self
    }

    pub fn cost_comparator(mut self, comparator: CostComparator) -> Self {
        self.cost_comparator = Some(comparator);
        self
    }

    pub fn task_count(mut self, estimator: Arc<dyn TaskCountEstimator>) -> Self {
        self.task_count = Some(estimator);
        self
    }

    pub fn splits(mut self, splits: Arc<dyn SplitManager>) -> Self {
        self.splits = Some(splits);
        self
    }

    pub fn page_sources(mut self, page_sources: Arc<dyn PageSourceManager>) -> Self {
        self.page_sources = Some(page_sources);
        self
    }

    pub fn partitioning(mut self, partitioning: Arc<dyn NodePartitioningManager>) -> Self {
        self.partitioning = Some(partitioning);
        self
    }

    pub fn rule_stats(mut self, recorder: Arc<RuleStatsRecorder>) -> Self {
        self.rule_stats = Some(recorder);
        self
    }

    pub fn build(self) -> PlannerDependencies {
        let cost = self.cost.unwrap_or_else(|| Arc::new(RowCountCost));
        PlannerDependencies {
            config: Arc::new(self.config.unwrap_or_default()),
            stats: self.stats.unwrap_or_else(|| Arc::new(UnknownStats)),
            exchange_cost: self.exchange_cost.unwrap_or_else(|| Arc::clone(&cost)),
            cost,
            cost_comparator: self.cost_comparator.unwrap_or_default(),
            task_count: self.task_count.unwrap_or_else(|| Arc::new(FixedTaskCount(1))),
            splits: self.splits.unwrap_or_else(|| Arc::new(NoSplits)),
            page_sources: self.page_sources.unwrap_or_else(|| Arc::new(NoSplits)),
            partitioning: self
                .partitioning
                .unwrap_or_else(|| Arc::new(FixedPartitioning(1))),
            rule_stats: self
                .rule_stats
                .unwrap_or_else(|| Arc::new(RuleStatsRecorder::new())),
        }
    }
}
