//! Building an in-memory graph from the durable store.

use super::ArchitectureStore;
use crate::domain::{DependencyEdge, NodeId, ProjectId, attr};
use crate::error::{Error, Result};
use crate::graph::GraphStore;
use crate::rules::{RuleEngine, RuleScope};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, warn};

/// A stored record that could not be loaded into the graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "warning", rename_all = "snake_case")]
pub enum HydrationWarning {
    /// Two modules share an id; the later one was skipped
    DuplicateModule {
        /// The repeated id
        id: NodeId,
    },
    /// A dependency references a module that does not exist
    BrokenDependency {
        /// Dependent
        from: NodeId,
        /// Target
        to: NodeId,
        /// The endpoint that is missing
        missing: NodeId,
    },
    /// A dependency points at its own source
    SelfReference {
        /// The node
        id: NodeId,
    },
    /// The same `(from, to, type)` dependency appears twice
    DuplicateDependency {
        /// Dependent
        from: NodeId,
        /// Target
        to: NodeId,
        /// Type tag
        dep_type: String,
    },
    /// A rule definition has no executable form
    UnsupportedRule {
        /// Rule kind
        kind: String,
        /// Why it was skipped
        reason: String,
    },
}

impl HydrationWarning {
    /// Whether the warning describes a dependency to a missing module
    #[must_use]
    pub fn is_broken_dependency(&self) -> bool {
        matches!(self, Self::BrokenDependency { .. })
    }
}

/// Result of hydrating one project
#[derive(Debug)]
pub struct Hydrated {
    /// Graph built from modules and dependencies
    pub store: GraphStore,
    /// Rules built from rule definitions
    pub rules: RuleEngine,
    /// Records that were skipped
    pub warnings: Vec<HydrationWarning>,
}

/// Load a project's modules, dependencies and rules.
///
/// Modules are added ordered by level. Unusable records are skipped and
/// reported as warnings rather than failing the load; dependency cycles
/// are kept as stored so that health checks can report them.
///
/// # Errors
///
/// Errors from the durable store itself.
pub async fn hydrate(backend: &dyn ArchitectureStore, project: &ProjectId) -> Result<Hydrated> {
    let mut modules = backend.load_modules(project).await?;
    let dependencies = backend.load_dependencies(project).await?;
    let definitions = backend.load_rules(project).await?;

    let mut store = GraphStore::new();
    let mut rules = RuleEngine::new();
    let mut warnings = Vec::new();

    modules.sort_by_key(|m| m.level);
    for module in modules {
        let mut attributes = module.attributes;
        attributes
            .entry(attr::LEVEL.to_string())
            .or_insert_with(|| json!(module.level));
        if let Err(Error::DuplicateNode(id)) = store.add_node(module.id, module.node_type, attributes)
        {
            warnings.push(HydrationWarning::DuplicateModule { id });
        }
    }

    for record in dependencies {
        let strength = record
            .strength
            .unwrap_or_else(|| record.dep_type.default_strength());
        let edge = DependencyEdge {
            from: record.from.clone(),
            to: record.to.clone(),
            dep_type: record.dep_type,
            strength,
            metadata: record.metadata,
        };
        match store.insert_edge(edge) {
            Ok(_) => {}
            Err(Error::NodeNotFound(missing)) => warnings.push(HydrationWarning::BrokenDependency {
                from: record.from,
                to: record.to,
                missing,
            }),
            Err(Error::SelfReference(id)) => warnings.push(HydrationWarning::SelfReference { id }),
            Err(Error::DuplicateEdge { from, to, dep_type }) => {
                warnings.push(HydrationWarning::DuplicateDependency { from, to, dep_type });
            }
            Err(other) => return Err(other),
        }
    }

    for (ordinal, definition) in definitions.into_iter().enumerate() {
        let kind = definition.kind.clone();
        let scope = definition.scope.clone();
        match definition.into_rule(ordinal + 1) {
            Ok(rule) => rules.register(scope, rule),
            Err(e) => warnings.push(HydrationWarning::UnsupportedRule {
                kind,
                reason: e.to_string(),
            }),
        }
    }

    for warning in &warnings {
        warn!(project = %project, warning = ?warning, "Hydration warning");
    }
    debug!(
        project = %project,
        nodes = store.node_count(),
        edges = store.edge_count(),
        rules = rules.len(),
        "Hydrated project"
    );

    Ok(Hydrated {
        store,
        rules,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Attributes, DependencyType};
    use crate::persistence::{DependencyRecord, InMemoryArchitectureStore, ModuleRecord};
    use crate::rules::RuleDefinition;

    fn module(id: &str, level: i64) -> ModuleRecord {
        ModuleRecord {
            id: id.into(),
            node_type: "module".to_string(),
            attributes: Attributes::new(),
            level,
        }
    }

    fn dependency(from: &str, to: &str) -> DependencyRecord {
        DependencyRecord {
            from: from.into(),
            to: to.into(),
            dep_type: DependencyType::Uses,
            strength: None,
            metadata: None,
        }
    }

    #[tokio::test]
    async fn test_hydrate_builds_graph_and_rules() {
        let backend = InMemoryArchitectureStore::new();
        let project = ProjectId::from("p");
        backend.seed_module(&project, module("child", 2)).await;
        backend.seed_module(&project, module("root", 0)).await;
        backend.seed_dependency(&project, dependency("child", "root")).await;
        backend
            .seed_rule(
                &project,
                RuleDefinition {
                    name: None,
                    scope: RuleScope::Global,
                    kind: "dependency".to_string(),
                    condition: json!({"max_dependencies": 3}),
                    severity: None,
                    priority: 0,
                    suggested_fix: None,
                },
            )
            .await;

        let hydrated = hydrate(&backend, &project).await.unwrap();
        assert!(hydrated.warnings.is_empty());
        assert_eq!(hydrated.store.node_count(), 2);
        assert_eq!(hydrated.store.edge_count(), 1);
        assert_eq!(hydrated.rules.rules()[0].name, "dependency_1");

        let order: Vec<&str> = hydrated
            .store
            .all_nodes()
            .iter()
            .map(|n| n.id.as_str())
            .collect();
        assert_eq!(order, ["root", "child"]);
        assert_eq!(
            hydrated.store.get_node(&"child".into()).unwrap().level(),
            Some(2)
        );
        let edge = &hydrated.store.all_edges()[0];
        assert!((edge.strength - 0.6).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_unusable_records_become_warnings() {
        let backend = InMemoryArchitectureStore::new();
        let project = ProjectId::from("p");
        backend.seed_module(&project, module("a", 0)).await;
        backend.seed_module(&project, module("a", 1)).await;
        backend.seed_dependency(&project, dependency("a", "ghost")).await;
        backend.seed_dependency(&project, dependency("a", "a")).await;
        backend
            .seed_rule(
                &project,
                RuleDefinition {
                    name: Some("lambda".to_string()),
                    scope: RuleScope::Global,
                    kind: "custom".to_string(),
                    condition: json!("x > 1"),
                    severity: None,
                    priority: 0,
                    suggested_fix: None,
                },
            )
            .await;

        let hydrated = hydrate(&backend, &project).await.unwrap();
        assert_eq!(hydrated.store.node_count(), 1);
        assert_eq!(hydrated.warnings.len(), 4);
        assert_eq!(
            hydrated
                .warnings
                .iter()
                .filter(|w| w.is_broken_dependency())
                .count(),
            1
        );
        assert!(hydrated.rules.is_empty());
    }
}
