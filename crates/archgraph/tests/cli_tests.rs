//! Integration tests for the archgraph CLI.
//!
//! These tests run the built binary against temporary repositories.

use rstest::{fixture, rstest};
use tempfile::TempDir;

mod common;
use common::run_archgraph_in_dir;

const PLAN: &str = r#"
operations:
  - action: CREATE_NODE
    data: { id: db, name: Database, module_type: database }
  - action: CREATE_NODE
    data: { id: api, name: API, module_type: service }
  - action: CREATE_DEPENDENCY
    from: api
    to: db
    type: uses
"#;

/// Provides a temporary directory with an initialized archgraph repository
#[fixture]
fn initialized_dir() -> TempDir {
    let temp = TempDir::new().expect("Failed to create temp directory");
    let output = run_archgraph_in_dir(temp.path(), &["init", "--project", "shop", "--quiet"]);
    assert!(
        output.status.success(),
        "Failed to initialize archgraph: {:?}",
        String::from_utf8_lossy(&output.stderr)
    );
    temp
}

/// An initialized repository with the sample plan applied
#[fixture]
fn populated_dir(initialized_dir: TempDir) -> TempDir {
    std::fs::write(initialized_dir.path().join("plan.yaml"), PLAN).unwrap();
    let output = run_archgraph_in_dir(initialized_dir.path(), &["apply", "plan.yaml"]);
    assert!(
        output.status.success(),
        "Failed to apply plan: {:?}",
        String::from_utf8_lossy(&output.stderr)
    );
    initialized_dir
}

#[test]
fn test_cli_help_shows_all_commands() {
    let temp = TempDir::new().unwrap();
    let output = run_archgraph_in_dir(temp.path(), &["--help"]);
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in ["init", "nodes", "cycles", "impact", "simulate", "apply", "health"] {
        assert!(stdout.contains(command), "Help should show '{command}'");
    }
}

#[test]
fn test_command_outside_repository_fails() {
    let temp = TempDir::new().unwrap();
    let output = run_archgraph_in_dir(temp.path(), &["nodes"]);

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("archgraph init"));
}

#[rstest]
fn test_init_twice_fails(initialized_dir: TempDir) {
    let output = run_archgraph_in_dir(initialized_dir.path(), &["init"]);
    assert!(!output.status.success());
}

#[rstest]
fn test_apply_then_list_nodes_as_json(populated_dir: TempDir) {
    let output = run_archgraph_in_dir(populated_dir.path(), &["--json", "nodes"]);
    assert!(output.status.success());

    let listed: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let listed = listed.as_array().unwrap();
    assert_eq!(listed.len(), 2);
    let api = listed
        .iter()
        .find(|entry| entry["node"]["id"] == "api")
        .unwrap();
    assert_eq!(api["dependencies"][0]["to"], "db");
}

#[rstest]
fn test_dry_run_does_not_persist(initialized_dir: TempDir) {
    std::fs::write(initialized_dir.path().join("plan.yaml"), PLAN).unwrap();
    let output = run_archgraph_in_dir(
        initialized_dir.path(),
        &["apply", "plan.yaml", "--dry-run"],
    );
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("dry_run"));

    let output = run_archgraph_in_dir(initialized_dir.path(), &["--json", "info"]);
    let info: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(info["modules"], 0);
}

#[rstest]
fn test_failed_plan_exits_with_error(populated_dir: TempDir) {
    std::fs::write(
        populated_dir.path().join("bad.yaml"),
        "- action: CREATE_DEPENDENCY\n  from: db\n  to: api\n",
    )
    .unwrap();
    let output = run_archgraph_in_dir(populated_dir.path(), &["apply", "bad.yaml"]);

    assert!(!output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("api -> db") || stdout.contains("cycle"), "{stdout}");
}

#[rstest]
fn test_impact_reports_dependents(populated_dir: TempDir) {
    let output = run_archgraph_in_dir(
        populated_dir.path(),
        &["--json", "impact", "db", "--change", "delete"],
    );
    assert!(output.status.success());

    let impact: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(impact["affected_nodes"], serde_json::json!(["api"]));
}

#[rstest]
fn test_cycles_and_health_on_clean_graph(populated_dir: TempDir) {
    let output = run_archgraph_in_dir(populated_dir.path(), &["cycles"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("No circular dependencies"));

    let output = run_archgraph_in_dir(populated_dir.path(), &["health"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("Healthy"));
}
