//! Applying a plan to the in-memory graph.

use super::{ExecuteOptions, Plan, PlanOperation, PlanOutcome, PlanState, PlanStatus, StepFailure};
use crate::analysis::DependencyAnalyzer;
use crate::config::AnalysisConfig;
use crate::domain::{Attributes, ChangeKind, DependencyEdge, DependencyType, Node, NodeId, attr};
use crate::error::{Error, Result};
use crate::graph::GraphStore;
use crate::id_generation::IdGenerator;
use crate::monitor::ChangeEvent;
use crate::rules::{ProposedChange, RuleEngine, Violation};
use crate::versioning::VersionManager;
use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, warn};

const DEFAULT_NODE_TYPE: &str = "module";
const NODE_ID_PREFIX: &str = "mod";

/// A mutation that was applied to the graph
#[derive(Debug, Clone, PartialEq)]
pub enum AppliedChange {
    /// A node was created
    NodeCreated(Node),
    /// A node's attributes were merged
    NodeUpdated {
        /// The node after the update
        node: Node,
        /// Attributes before the update
        old: Attributes,
        /// Edges pointing at the node when it changed
        dependents: Vec<DependencyEdge>,
    },
    /// A node was removed together with its edges
    NodeDeleted {
        /// The removed node
        node: Node,
        /// Edges that pointed at the node
        dependents: Vec<DependencyEdge>,
    },
    /// A dependency was created
    DependencyCreated(DependencyEdge),
    /// A dependency was removed
    DependencyDeleted(DependencyEdge),
}

impl AppliedChange {
    /// Change event for node-level changes; dependency changes have none
    #[must_use]
    pub fn change_event(&self, actor: Option<&str>) -> Option<(ChangeEvent, &[DependencyEdge])> {
        let actor = actor.map(str::to_string);
        match self {
            Self::NodeCreated(node) => Some((
                ChangeEvent::new(
                    node.id.clone(),
                    ChangeKind::Create,
                    None,
                    Some(node.attributes.clone()),
                    actor,
                ),
                &[],
            )),
            Self::NodeUpdated {
                node,
                old,
                dependents,
            } => Some((
                ChangeEvent::new(
                    node.id.clone(),
                    ChangeKind::Update,
                    Some(old.clone()),
                    Some(node.attributes.clone()),
                    actor,
                ),
                dependents,
            )),
            Self::NodeDeleted { node, dependents } => Some((
                ChangeEvent::new(
                    node.id.clone(),
                    ChangeKind::Delete,
                    Some(node.attributes.clone()),
                    None,
                    actor,
                ),
                dependents,
            )),
            Self::DependencyCreated(_) | Self::DependencyDeleted(_) => None,
        }
    }
}

/// Result of running the executor
#[derive(Debug, Clone)]
pub struct Executed {
    /// What the caller sees
    pub outcome: PlanOutcome,
    /// Changes now live in the graph; empty unless the plan committed
    pub changes: Vec<AppliedChange>,
}

/// Runs plans against one project's graph.
///
/// Holds the graph, its rules and its snapshots for the duration of one
/// plan; callers serialize executors with the project lock.
#[derive(Debug)]
pub struct PlanExecutor<'a> {
    store: &'a mut GraphStore,
    rules: &'a RuleEngine,
    versions: &'a mut VersionManager,
    config: &'a AnalysisConfig,
}

impl<'a> PlanExecutor<'a> {
    /// Create an executor
    #[must_use]
    pub fn new(
        store: &'a mut GraphStore,
        rules: &'a RuleEngine,
        versions: &'a mut VersionManager,
        config: &'a AnalysisConfig,
    ) -> Self {
        Self {
            store,
            rules,
            versions,
            config,
        }
    }

    /// Execute `plan`.
    ///
    /// Rejections and step failures are reported in the outcome, never as
    /// errors. The live graph is either fully updated or left as it was.
    ///
    /// # Errors
    ///
    /// Only internal failures: the pre-plan snapshot could not be taken or
    /// could not be restored.
    pub fn execute(&mut self, plan: &Plan, options: &ExecuteOptions) -> Result<Executed> {
        let mut transitions = vec![PlanState::Validating];
        debug!(steps = plan.len(), dry_run = options.dry_run, "Validating plan");

        let structural_errors = plan.structural_errors();
        if !structural_errors.is_empty() {
            info!(errors = structural_errors.len(), "Plan rejected: structural errors");
            transitions.push(PlanState::Rejected);
            let mut outcome = PlanOutcome::new(PlanStatus::Rejected);
            outcome.transitions = transitions;
            outcome.structural_errors = structural_errors;
            return Ok(Executed {
                outcome,
                changes: Vec::new(),
            });
        }

        let snapshot_id = if options.create_snapshot && !options.dry_run {
            let name = format!("before_plan_{}", Utc::now().format("%Y%m%d_%H%M%S"));
            Some(self.versions.create_snapshot(
                self.store,
                name,
                format!("Snapshot before executing a {}-step plan", plan.len()),
            )?)
        } else {
            None
        };

        if options.dry_run {
            transitions.push(PlanState::Simulating);
        }
        transitions.push(PlanState::Applying);

        let mut work = self.store.clone();
        let mut ids = IdGenerator::with_existing(
            NODE_ID_PREFIX,
            work.all_nodes().into_iter().map(|n| n.id.0.clone()),
        );
        let mut changes = Vec::new();
        let mut violations = Vec::new();
        let mut failures = Vec::new();

        for (index, op) in plan.operations.iter().enumerate() {
            let mut step = StepContext {
                work: &mut work,
                rules: self.rules,
                config: self.config,
                options,
                ids: &mut ids,
                violations: &mut violations,
            };
            match step.apply(op) {
                Ok(change) => {
                    debug!(step = index, action = op.action(), "Applied plan step");
                    changes.push(change);
                }
                Err(error) => {
                    warn!(step = index, action = op.action(), error = %error, "Plan step failed");
                    if let Error::RuleViolation { violations: raised } = &error {
                        violations.extend(raised.iter().cloned());
                    }
                    failures.push(StepFailure::new(index, op, &error));
                }
            }
        }

        let mut outcome = PlanOutcome::new(PlanStatus::Rejected);
        outcome.rollback_available = snapshot_id.is_some();
        outcome.snapshot_id = snapshot_id;
        outcome.violations = violations;

        if failures.is_empty() {
            outcome.nodes_created = count(&changes, |c| matches!(c, AppliedChange::NodeCreated(_)));
            outcome.nodes_updated =
                count(&changes, |c| matches!(c, AppliedChange::NodeUpdated { .. }));
            outcome.nodes_deleted =
                count(&changes, |c| matches!(c, AppliedChange::NodeDeleted { .. }));
            outcome.dependencies_created =
                count(&changes, |c| matches!(c, AppliedChange::DependencyCreated(_)));
            outcome.created_node_ids = changes
                .iter()
                .filter_map(|c| match c {
                    AppliedChange::NodeCreated(node) => Some(node.id.clone()),
                    _ => None,
                })
                .collect();

            if options.dry_run {
                transitions.push(PlanState::Discarded);
                outcome.status = PlanStatus::DryRun;
                changes.clear();
                info!(steps = plan.len(), "Dry run completed; scratch copy discarded");
            } else {
                *self.store = work;
                transitions.push(PlanState::Committed);
                outcome.status = PlanStatus::Committed;
                info!(
                    steps = plan.len(),
                    nodes = self.store.node_count(),
                    edges = self.store.edge_count(),
                    "Plan committed"
                );
            }
        } else {
            changes.clear();
            outcome.failed_step = failures.first().map(|f| f.index);
            match (&outcome.snapshot_id, options.dry_run) {
                (Some(id), false) => {
                    self.versions.rollback(id, self.store)?;
                    transitions.push(PlanState::RolledBack);
                    outcome.status = PlanStatus::RolledBack;
                    outcome.rollback_performed = true;
                }
                _ => transitions.push(PlanState::Rejected),
            }
            info!(
                failures = failures.len(),
                first = ?outcome.failed_step,
                status = %outcome.status,
                "Plan failed"
            );
            outcome.failures = failures;
        }

        outcome.transitions = transitions;
        Ok(Executed { outcome, changes })
    }
}

fn count(changes: &[AppliedChange], pred: impl Fn(&AppliedChange) -> bool) -> usize {
    changes.iter().filter(|c| pred(c)).count()
}

/// Everything one step needs while applying to the working copy
struct StepContext<'s> {
    work: &'s mut GraphStore,
    rules: &'s RuleEngine,
    config: &'s AnalysisConfig,
    options: &'s ExecuteOptions,
    ids: &'s mut IdGenerator,
    violations: &'s mut Vec<Violation>,
}

impl StepContext<'_> {
    fn apply(&mut self, op: &PlanOperation) -> Result<AppliedChange> {
        match op {
            PlanOperation::CreateNode { data } => self.create_node(data.clone().unwrap_or_default()),
            PlanOperation::UpdateNode { node_id, data } => {
                let id = self.resolve(required(node_id.as_ref().map(NodeId::as_str), "node_id")?)?;
                self.update_node(&id, data.clone().unwrap_or_default())
            }
            PlanOperation::CreateDependency {
                from,
                to,
                dep_type,
                strength,
            } => {
                let from = self.resolve(required(from.as_deref(), "from")?)?;
                let to = self.resolve(required(to.as_deref(), "to")?)?;
                self.create_dependency(&from, &to, dep_type.clone().unwrap_or_default(), *strength)
            }
            PlanOperation::DeleteNode { node_id } => {
                let id = self.resolve(required(node_id.as_ref().map(NodeId::as_str), "node_id")?)?;
                self.delete_node(&id)
            }
        }
    }

    /// Keep warnings, turn error-severity violations into a failure
    fn check(&mut self, validation: crate::rules::Validation) -> Result<()> {
        let warnings = validation.into_result()?;
        self.violations.extend(warnings);
        Ok(())
    }

    fn create_node(&mut self, mut data: Attributes) -> Result<AppliedChange> {
        let node_type = match data.remove("module_type") {
            Some(Value::String(t)) if !t.is_empty() => t,
            _ => DEFAULT_NODE_TYPE.to_string(),
        };
        let id = match data.remove("id") {
            Some(Value::String(id)) if !id.is_empty() => NodeId::from(id),
            _ => {
                let name = data.get(attr::NAME).and_then(Value::as_str).unwrap_or_default();
                NodeId::from(self.ids.generate(&[name, &node_type])?)
            }
        };

        if self.options.validate {
            let validation = self.rules.validate_new_node(&id, &node_type, &data);
            self.check(validation)?;
        }
        let node = self.work.add_node(id, node_type, data)?.clone();
        Ok(AppliedChange::NodeCreated(node))
    }

    fn update_node(&mut self, id: &NodeId, data: Attributes) -> Result<AppliedChange> {
        if self.options.validate {
            let validation = self
                .rules
                .validate(self.work, id, &ProposedChange::Attributes(data.clone()))?;
            self.check(validation)?;
        }
        self.check_impact(id, ChangeKind::Update)?;

        let dependents = self.work.dependents(id)?;
        let (old, _) = self.work.update_node(id, data)?;
        let node = self.work.node(id)?.clone();
        Ok(AppliedChange::NodeUpdated {
            node,
            old,
            dependents,
        })
    }

    fn delete_node(&mut self, id: &NodeId) -> Result<AppliedChange> {
        if self.options.validate {
            let validation = self.rules.validate(self.work, id, &ProposedChange::Removal)?;
            self.check(validation)?;
        }
        self.check_impact(id, ChangeKind::Delete)?;

        let (node, edges) = self.work.remove_node(id)?;
        let dependents = edges.into_iter().filter(|e| &e.to == id).collect();
        Ok(AppliedChange::NodeDeleted { node, dependents })
    }

    fn create_dependency(
        &mut self,
        from: &NodeId,
        to: &NodeId,
        dep_type: DependencyType,
        strength: Option<f64>,
    ) -> Result<AppliedChange> {
        if from == to {
            return Err(Error::SelfReference(from.clone()));
        }
        let exists = self
            .work
            .dependencies(from)?
            .iter()
            .any(|e| &e.to == to && e.dep_type == dep_type);
        if exists {
            return Err(Error::DuplicateEdge {
                from: from.clone(),
                to: to.clone(),
                dep_type: dep_type.to_string(),
            });
        }

        let analyzer = DependencyAnalyzer::new(self.work, self.config);
        if let Some(path) = analyzer.find_cycle_path(from, to)? {
            return Err(Error::CircularDependency { path });
        }

        if self.options.validate {
            let validation = self.rules.validate(
                self.work,
                from,
                &ProposedChange::Dependency {
                    to: to.clone(),
                    dep_type: dep_type.clone(),
                },
            )?;
            self.check(validation)?;
        }

        let edge = self.work.add_edge(from, to, dep_type, strength)?;
        Ok(AppliedChange::DependencyCreated(edge))
    }

    fn check_impact(&self, id: &NodeId, kind: ChangeKind) -> Result<()> {
        let Some(threshold) = self.options.impact_block_threshold else {
            return Ok(());
        };
        let impact = DependencyAnalyzer::new(self.work, self.config).impact_analysis(id, kind)?;
        let affected: Vec<NodeId> = impact
            .above(threshold)
            .into_iter()
            .map(|s| s.node_id.clone())
            .collect();
        if affected.is_empty() {
            Ok(())
        } else {
            Err(Error::ImpactBlocked {
                node_id: id.clone(),
                affected,
            })
        }
    }

    /// A node id, or the id of the only node with that name
    fn resolve(&self, reference: &str) -> Result<NodeId> {
        let id = NodeId::from(reference);
        if self.work.contains_node(&id) {
            return Ok(id);
        }
        match self.work.find_by_name(reference).as_slice() {
            [node] => Ok(node.id.clone()),
            _ => Err(Error::NodeNotFound(id)),
        }
    }
}

fn required<'v>(value: Option<&'v str>, field: &str) -> Result<&'v str> {
    value.ok_or_else(|| Error::Structural(format!("missing '{field}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{Rule, RuleKind, RuleScope};
    use serde_json::json;

    struct Fixture {
        store: GraphStore,
        rules: RuleEngine,
        versions: VersionManager,
        config: AnalysisConfig,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                store: GraphStore::new(),
                rules: RuleEngine::new(),
                versions: VersionManager::new(10),
                config: AnalysisConfig::default(),
            }
        }

        fn with_nodes(ids: &[&str]) -> Self {
            let mut fixture = Self::new();
            for id in ids {
                let mut attrs = Attributes::new();
                attrs.insert("name".into(), json!(id.to_uppercase()));
                fixture.store.add_node((*id).into(), "module", attrs).unwrap();
            }
            fixture
        }

        fn run(&mut self, plan: &Plan, options: &ExecuteOptions) -> Executed {
            PlanExecutor::new(&mut self.store, &self.rules, &mut self.versions, &self.config)
                .execute(plan, options)
                .unwrap()
        }
    }

    fn named(name: &str) -> Attributes {
        let mut data = Attributes::new();
        data.insert("name".into(), json!(name));
        data
    }

    #[test]
    fn test_commit_creates_nodes_and_dependencies() {
        let mut fx = Fixture::new();
        let mut db = named("Database");
        db.insert("id".into(), json!("db"));
        db.insert("module_type".into(), json!("database"));
        let plan = Plan::new(vec![
            PlanOperation::create_node(db),
            PlanOperation::create_node(named("Api")),
            PlanOperation::create_dependency("Api", "db", DependencyType::Uses),
        ]);

        let executed = fx.run(&plan, &ExecuteOptions::default());
        let outcome = &executed.outcome;
        assert_eq!(outcome.status, PlanStatus::Committed);
        assert_eq!(
            outcome.transitions,
            [PlanState::Validating, PlanState::Applying, PlanState::Committed]
        );
        assert_eq!((outcome.nodes_created, outcome.dependencies_created), (2, 1));
        assert!(outcome.rollback_available);
        assert_eq!(fx.versions.len(), 1);
        assert!(fx.versions.list_snapshots()[0].name.starts_with("before_plan_"));

        let db = fx.store.node(&"db".into()).unwrap();
        assert_eq!(db.node_type, "database");
        assert!(!db.attributes.contains_key("module_type"));
        let api = &outcome.created_node_ids[1];
        assert!(api.as_str().starts_with("mod-"));
        assert_eq!(fx.store.dependencies(api).unwrap()[0].strength, 0.6);
        assert_eq!(executed.changes.len(), 3);
    }

    #[test]
    fn test_structural_error_rejects_whole_plan() {
        let mut fx = Fixture::new();
        let plan = Plan::new(vec![
            PlanOperation::create_node(named("Valid")),
            PlanOperation::create_node(Attributes::new()),
        ]);

        let executed = fx.run(&plan, &ExecuteOptions::default());
        assert_eq!(executed.outcome.status, PlanStatus::Rejected);
        assert_eq!(executed.outcome.structural_errors.len(), 1);
        assert!(fx.store.is_empty());
        assert!(fx.versions.is_empty());
        assert!(executed.changes.is_empty());
    }

    #[test]
    fn test_failure_rolls_back_and_reports_every_step() {
        let mut fx = Fixture::with_nodes(&["a", "b"]);
        fx.store
            .add_edge(&"a".into(), &"b".into(), DependencyType::Uses, None)
            .unwrap();
        let before = fx.store.state();

        let plan = Plan::new(vec![
            PlanOperation::create_node(named("C")),
            PlanOperation::create_dependency("b", "a", DependencyType::Uses),
            PlanOperation::create_dependency("a", "a", DependencyType::Uses),
            PlanOperation::delete_node("ghost"),
        ]);
        let executed = fx.run(&plan, &ExecuteOptions::default());
        let outcome = executed.outcome;

        assert_eq!(outcome.status, PlanStatus::RolledBack);
        assert!(outcome.rollback_performed);
        assert_eq!(outcome.failed_step, Some(1));
        let kinds: Vec<&str> = outcome.failures.iter().map(|f| f.kind.as_str()).collect();
        assert_eq!(kinds, ["cycle", "self_reference", "not_found"]);
        assert_eq!(outcome.failures[0].cycle.len(), 3);
        assert_eq!(outcome.nodes_created, 0);
        assert_eq!(fx.store.state(), before);
    }

    #[test]
    fn test_failure_without_snapshot_is_rejected() {
        let mut fx = Fixture::with_nodes(&["a"]);
        let before = fx.store.state();
        let options = ExecuteOptions {
            create_snapshot: false,
            ..ExecuteOptions::default()
        };
        let plan = Plan::new(vec![
            PlanOperation::create_node(named("B")),
            PlanOperation::update_node("ghost", named("X")),
        ]);

        let outcome = fx.run(&plan, &options).outcome;
        assert_eq!(outcome.status, PlanStatus::Rejected);
        assert!(!outcome.rollback_performed);
        assert!(!outcome.rollback_available);
        assert_eq!(fx.store.state(), before);
    }

    #[test]
    fn test_dry_run_never_touches_live_graph() {
        let mut fx = Fixture::with_nodes(&["a"]);
        let before = fx.store.state();
        let plan = Plan::new(vec![
            PlanOperation::create_node(named("B")),
            PlanOperation::delete_node("a"),
        ]);

        let executed = fx.run(&plan, &ExecuteOptions::dry_run());
        assert_eq!(executed.outcome.status, PlanStatus::DryRun);
        assert_eq!(
            executed.outcome.transitions,
            [
                PlanState::Validating,
                PlanState::Simulating,
                PlanState::Applying,
                PlanState::Discarded
            ]
        );
        assert_eq!(executed.outcome.nodes_deleted, 1);
        assert!(executed.changes.is_empty());
        assert!(fx.versions.is_empty());
        assert_eq!(fx.store.state(), before);
    }

    #[test]
    fn test_rule_violation_is_collected() {
        let mut fx = Fixture::with_nodes(&["a", "b", "c", "d", "e"]);
        for target in ["b", "c", "d"] {
            fx.store
                .add_edge(&"a".into(), &target.into(), DependencyType::Uses, None)
                .unwrap();
        }
        fx.rules.register(
            RuleScope::Node("a".into()),
            Rule::new("max-three", RuleKind::MaxDependencyCount { max: 3 }),
        );

        let plan = Plan::new(vec![PlanOperation::create_dependency(
            "a",
            "e",
            DependencyType::Extends,
        )]);
        let outcome = fx.run(&plan, &ExecuteOptions::default()).outcome;
        assert!(!outcome.is_success());
        assert_eq!(outcome.violations[0].rule, "max-three");
        assert_eq!(outcome.failures[0].kind, "rule_violation");
        assert_eq!(fx.store.out_degree(&"a".into()), 3);

        let unchecked = ExecuteOptions {
            validate: false,
            ..ExecuteOptions::default()
        };
        assert!(fx.run(&plan, &unchecked).outcome.is_success());
    }

    #[test]
    fn test_warnings_do_not_fail_the_plan() {
        let mut fx = Fixture::new();
        fx.rules.register(
            RuleScope::Global,
            Rule::new(
                "service-suffix",
                RuleKind::Naming {
                    prefix: None,
                    suffix: Some("Service".into()),
                },
            )
            .with_severity(crate::rules::Severity::Warning),
        );
        let outcome = fx
            .run(
                &Plan::new(vec![PlanOperation::create_node(named("Billing"))]),
                &ExecuteOptions::default(),
            )
            .outcome;
        assert_eq!(outcome.status, PlanStatus::Committed);
        assert_eq!(outcome.violations.len(), 1);
    }

    #[test]
    fn test_impact_threshold_blocks_delete() {
        let mut fx = Fixture::with_nodes(&["db", "svc"]);
        fx.store
            .add_edge(&"svc".into(), &"db".into(), DependencyType::Uses, None)
            .unwrap();
        let options = ExecuteOptions {
            impact_block_threshold: Some(0.7),
            ..ExecuteOptions::default()
        };

        let outcome = fx
            .run(&Plan::new(vec![PlanOperation::delete_node("db")]), &options)
            .outcome;
        assert_eq!(outcome.failures[0].kind, "impact_blocked");
        assert_eq!(outcome.failures[0].blocked_by, [NodeId::from("svc")]);
        assert!(fx.store.contains_node(&"db".into()));
    }

    #[test]
    fn test_change_events_carry_dependents() {
        let mut fx = Fixture::with_nodes(&["core", "api"]);
        fx.store
            .add_edge(&"api".into(), &"core".into(), DependencyType::Import, None)
            .unwrap();
        let mut data = Attributes::new();
        data.insert("status".into(), json!("deprecated"));

        let executed = fx.run(
            &Plan::new(vec![PlanOperation::update_node("core", data)]),
            &ExecuteOptions::default(),
        );
        let (event, dependents) = executed.changes[0].change_event(Some("bot")).unwrap();
        assert_eq!(event.change_kind, ChangeKind::Update);
        assert!(event.changed_fields.contains("status"));
        assert_eq!(event.actor.as_deref(), Some("bot"));
        assert_eq!(dependents.len(), 1);
        assert_eq!(dependents[0].from.as_str(), "api");
    }
}
