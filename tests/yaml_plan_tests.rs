//! YAML plan documents through the whole pipeline.

mod common;

use std::sync::Arc;

use common::Env;
use planx::core::prelude::*;
use planx::optimizer::{
    bundled_registry, parse_yaml_document, parse_yaml_plan, DslError, PlannerDependencies,
};
use planx::Planner;

const TPCH_LIKE: &str = r#"
config:
  additional_plan_optimizers: [limit_cap]
  plugin_settings:
    limit_cap.max_rows: "100"
plan:
  op: output
  columns: [o_id, c_name]
  source:
    op: limit
    count: 10000
    source:
      op: sort
      order_by: [o_total]
      source:
        op: join
        on: [[o_custkey, c_custkey]]
        left:
          op: filter
          predicate: "true"
          source: { op: scan, table: orders, columns: [o_id, o_custkey, o_total] }
        right:
          op: exchange
          scope: remote
          partitioning: [c_custkey]
          sources:
            - { op: scan, table: customer, columns: [c_custkey, c_name] }
"#;

#[test]
fn test_yaml_plan_optimizes_end_to_end() {
    let env = Env::new();
    let parsed = parse_yaml_document(TPCH_LIKE, &env.ids).unwrap();
    let planner = Planner::new(
        &bundled_registry(),
        PlannerDependencies::builder().config(parsed.config.clone()).build(),
    );
    assert!(planner.load_failures().is_empty());

    let right_before = {
        let mut found = None;
        planx::core::plan::for_each_node(&parsed.plan, &mut |n| {
            if let PlanKind::Exchange(_) = n.kind() {
                found = Some(Arc::clone(n));
            }
        });
        found.unwrap()
    };

    let outcome = planner.optimize(parsed.plan.clone(), &env.ctx()).unwrap();
    let explain = outcome.plan.explain();

    assert!(explain.contains("Limit[count=100]"));
    assert!(!explain.contains("Filter["));
    assert_eq!(outcome.plan.node_count(), parsed.plan.node_count() - 1);

    let mut exchange_shared = false;
    planx::core::plan::for_each_node(&outcome.plan, &mut |n| {
        exchange_shared |= Arc::ptr_eq(n, &right_before);
    });
    assert!(exchange_shared);
}

#[test]
fn test_plan_serializes_with_ids() {
    let ids = PlanNodeIdAllocator::new();
    let plan = parse_yaml_plan(
        "plan: { op: limit, count: 5, source: { op: scan, table: t } }",
        &ids,
    )
    .unwrap();

    let json = serde_json::to_value(&*plan).unwrap();
    assert_eq!(json["id"], 1);
    assert_eq!(json["kind"]["Limit"]["count"], 5);
    assert_eq!(json["kind"]["Limit"]["source"]["id"], 0);
}

#[test]
fn test_missing_child_is_a_yaml_error() {
    let err =
        parse_yaml_plan("plan: { op: limit, count: 5 }", &PlanNodeIdAllocator::new()).unwrap_err();
    assert!(matches!(err, DslError::Yaml(_)));
}

#[test]
fn test_config_defaults_when_document_has_none() {
    let parsed =
        parse_yaml_document("plan: { op: scan, table: t }", &PlanNodeIdAllocator::new()).unwrap();
    assert_eq!(parsed.config, PlannerConfig::default());
}
