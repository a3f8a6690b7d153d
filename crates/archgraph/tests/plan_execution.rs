//! Integration tests for plan execution through a project engine.
//!
//! # Test Coverage
//!
//! - Atomicity: failed plans leave the graph untouched
//! - Rule enforcement on dependencies created through plans
//! - Dry runs and snapshot rollback
//! - Event ordering on commit

mod common;

use archgraph::domain::{Attributes, DependencyType, NodeId, ProjectId};
use archgraph::monitor::GraphEvent;
use archgraph::persistence::ArchitectureStore;
use archgraph::plan::{ExecuteOptions, Plan, PlanOperation, PlanState, PlanStatus};
use archgraph::rules::{Rule, RuleKind, RuleScope};
use common::{layered, named, registry_with};
use rstest::rstest;
use serde_json::json;

fn project() -> ProjectId {
    ProjectId::from("shop")
}

#[tokio::test]
async fn test_failed_plan_leaves_empty_graph_empty() {
    let (backend, registry) = registry_with(&project(), &[], &[]).await;
    let engine = registry.engine(&project()).await.unwrap();

    let plan = Plan::new(vec![
        PlanOperation::create_node(layered("a", "ui")),
        PlanOperation::create_node(layered("b", "data")),
        PlanOperation::create_dependency("a", "missing", DependencyType::Uses),
    ]);
    let outcome = engine
        .execute_plan(&plan, &ExecuteOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.status, PlanStatus::RolledBack);
    assert!(outcome.rollback_performed);
    assert_eq!(outcome.failed_step, Some(2));
    assert_eq!(outcome.failures[0].kind, "not_found");
    assert_eq!(engine.counts().await, (0, 0));
    assert!(backend.load_modules(&project()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_structural_errors_reject_before_any_change() {
    let (_, registry) = registry_with(&project(), &[("db", "database")], &[]).await;
    let engine = registry.engine(&project()).await.unwrap();
    let before = engine.graph_state().await;

    let plan = Plan::parse(
        r#"
operations:
  - action: CREATE_NODE
    data: { name: Cache }
  - action: UPDATE_NODE
    data: { status: active }
"#,
    )
    .unwrap();
    let outcome = engine
        .execute_plan(&plan, &ExecuteOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.status, PlanStatus::Rejected);
    assert_eq!(
        outcome.structural_errors,
        ["Step 1: UPDATE_NODE missing 'node_id'"]
    );
    assert_eq!(engine.graph_state().await, before);
}

#[rstest]
#[case::extends(DependencyType::Extends)]
#[case::import(DependencyType::Import)]
#[case::uses(DependencyType::Uses)]
#[case::depends_on(DependencyType::DependsOn)]
#[case::custom(DependencyType::Other("calls".into()))]
#[tokio::test]
async fn test_max_dependency_rule_rejects_fourth_dependency(#[case] fourth: DependencyType) {
    let modules = [
        ("svc", "service"),
        ("a", "module"),
        ("b", "module"),
        ("c", "module"),
        ("d", "module"),
    ];
    let deps = [
        ("svc", "a", DependencyType::Uses),
        ("svc", "b", DependencyType::Import),
        ("svc", "c", DependencyType::Extends),
    ];
    let (_, registry) = registry_with(&project(), &modules, &deps).await;
    let engine = registry.engine(&project()).await.unwrap();
    engine
        .register_rule(
            RuleScope::Global,
            Rule::new("max-three", RuleKind::MaxDependencyCount { max: 3 }),
        )
        .await;

    let outcome = engine
        .create_dependency(&"svc".into(), &"d".into(), fourth, None)
        .await
        .unwrap();

    assert_eq!(outcome.status, PlanStatus::Rejected);
    assert_eq!(outcome.failures[0].kind, "rule_violation");
    assert_eq!(outcome.violations[0].rule, "max-three");
    assert_eq!(engine.counts().await, (5, 3));
}

#[tokio::test]
async fn test_layer_rule_rejects_ui_to_data_through_plan() {
    let (_, registry) = registry_with(&project(), &[], &[]).await;
    let engine = registry.engine(&project()).await.unwrap();
    engine
        .register_rule(
            RuleScope::Global,
            Rule::new(
                "no-ui-to-data",
                RuleKind::LayerForbidden {
                    from_layer: "ui".into(),
                    to_layer: "data".into(),
                },
            )
            .with_suggested_fix("Go through the service layer"),
        )
        .await;

    let plan = Plan::new(vec![
        PlanOperation::create_node(layered("screen", "ui")),
        PlanOperation::create_node(layered("orders", "service")),
        PlanOperation::create_node(layered("store", "data")),
        PlanOperation::create_dependency("screen", "orders", DependencyType::Uses),
        PlanOperation::create_dependency("orders", "store", DependencyType::Uses),
        PlanOperation::create_dependency("screen", "store", DependencyType::Uses),
    ]);
    let outcome = engine
        .execute_plan(&plan, &ExecuteOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.status, PlanStatus::RolledBack);
    assert_eq!(outcome.failed_step, Some(5));
    assert_eq!(outcome.violations.len(), 1);
    assert_eq!(
        outcome.violations[0].suggested_fix.as_deref(),
        Some("Go through the service layer")
    );
    assert_eq!(engine.counts().await, (0, 0));
}

#[tokio::test]
async fn test_cycle_closing_dependency_reports_the_cycle() {
    let deps = [
        ("a", "b", DependencyType::Uses),
        ("b", "c", DependencyType::Uses),
    ];
    let (_, registry) = registry_with(
        &project(),
        &[("a", "module"), ("b", "module"), ("c", "module")],
        &deps,
    )
    .await;
    let engine = registry.engine(&project()).await.unwrap();

    let outcome = engine
        .create_dependency(&"c".into(), &"a".into(), DependencyType::Uses, None)
        .await
        .unwrap();

    assert_eq!(outcome.status, PlanStatus::Rejected);
    let failure = &outcome.failures[0];
    assert_eq!(failure.kind, "cycle");
    let cycle: Vec<&str> = failure.cycle.iter().map(NodeId::as_str).collect();
    assert_eq!(cycle, ["c", "a", "b", "c"]);
}

#[tokio::test]
async fn test_dry_run_changes_stay_invisible() {
    let (backend, registry) = registry_with(&project(), &[("db", "database")], &[]).await;
    let engine = registry.engine(&project()).await.unwrap();
    let mut events = engine.subscribe().await;
    let before = engine.graph_state().await;

    let plan = Plan::new(vec![
        PlanOperation::create_node(layered("api", "service")),
        PlanOperation::create_dependency("api", "db", DependencyType::Uses),
        PlanOperation::delete_node("db"),
    ]);
    let outcome = engine
        .execute_plan(&plan, &ExecuteOptions::dry_run())
        .await
        .unwrap();

    assert_eq!(outcome.status, PlanStatus::DryRun);
    assert_eq!(
        outcome.transitions,
        [
            PlanState::Validating,
            PlanState::Simulating,
            PlanState::Applying,
            PlanState::Discarded,
        ]
    );
    assert_eq!(outcome.nodes_created, 1);
    assert_eq!(outcome.nodes_deleted, 1);
    assert!(outcome.snapshot_id.is_none());

    assert_eq!(engine.graph_state().await, before);
    assert_eq!(backend.load_modules(&project()).await.unwrap().len(), 1);
    assert!(engine.recent_activity(10).await.is_empty());
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_snapshot_and_rollback_round_trip() {
    let (_, registry) = registry_with(
        &project(),
        &[("db", "database"), ("api", "service")],
        &[("api", "db", DependencyType::Uses)],
    )
    .await;
    let engine = registry.engine(&project()).await.unwrap();
    let baseline = engine.graph_state().await;
    let snapshot = engine.create_snapshot("baseline", "before refactor").await.unwrap();

    let mut patch = Attributes::new();
    patch.insert("status".into(), json!("deprecated"));
    engine.update_node(&"db".into(), patch, None).await.unwrap();
    engine.create_node(named("Cache"), None).await.unwrap();
    engine.delete_node(&"api".into(), None).await.unwrap();
    assert_ne!(engine.graph_state().await, baseline);

    let restored = engine.rollback(&snapshot).await.unwrap();
    assert_eq!(restored.snapshot.description, "before refactor");
    assert_eq!(engine.graph_state().await, baseline);

    let listed = engine.list_snapshots().await;
    assert!(listed.iter().any(|meta| meta.id == snapshot));
}

#[tokio::test]
async fn test_commit_events_are_ordered() {
    let (_, registry) = registry_with(
        &project(),
        &[("db", "database"), ("api", "service"), ("web", "service")],
        &[
            ("api", "db", DependencyType::Uses),
            ("web", "db", DependencyType::Import),
        ],
    )
    .await;
    let engine = registry.engine(&project()).await.unwrap();
    let mut events = engine.subscribe().await;

    let mut patch = Attributes::new();
    patch.insert("version".into(), json!(2));
    let outcome = engine
        .update_node(&"db".into(), patch, Some("ops"))
        .await
        .unwrap();
    assert!(outcome.is_success());

    let mut received = Vec::new();
    while let Ok(envelope) = events.try_recv() {
        received.push(envelope);
    }

    assert_eq!(received.len(), 3);
    assert!(received.windows(2).all(|w| w[0].seq < w[1].seq));
    match &received[0].event {
        GraphEvent::NodeChanged(change) => {
            assert_eq!(change.node_id.as_str(), "db");
            assert_eq!(change.actor.as_deref(), Some("ops"));
            assert!(change.changed_fields.contains("version"));
        }
        other => panic!("Expected node change first, got {other:?}"),
    }
    let mut dependents: Vec<&str> = received[1..]
        .iter()
        .map(|envelope| match &envelope.event {
            GraphEvent::DependentNeedsUpdate(update) => update.dependent_node_id.as_str(),
            other => panic!("Expected dependent notice, got {other:?}"),
        })
        .collect();
    dependents.sort_unstable();
    assert_eq!(dependents, ["api", "web"]);
}
