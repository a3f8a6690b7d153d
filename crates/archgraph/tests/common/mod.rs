//! Common test utilities shared across integration tests.

#![allow(dead_code)]

use archgraph::config::EngineConfig;
use archgraph::domain::{Attributes, DependencyType, ProjectId};
use archgraph::persistence::{DependencyRecord, InMemoryArchitectureStore, ModuleRecord};
use archgraph::registry::GraphRegistry;
use serde_json::json;
use std::path::Path;
use std::process::{Command, Output};
use std::sync::Arc;

/// Run the archgraph binary in the specified directory
pub fn run_archgraph_in_dir(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_archgraph"))
        .args(args)
        .current_dir(dir)
        .env("NO_COLOR", "1")
        .output()
        .expect("Failed to execute archgraph binary")
}

/// Attributes with just a name
pub fn named(name: &str) -> Attributes {
    let mut data = Attributes::new();
    data.insert("name".into(), json!(name));
    data
}

/// Attributes with an explicit id, a name and a layer
pub fn layered(id: &str, layer: &str) -> Attributes {
    let mut data = named(id);
    data.insert("id".into(), json!(id));
    data.insert("layer".into(), json!(layer));
    data
}

/// A module record with no attributes besides its name
pub fn module(id: &str, node_type: &str) -> ModuleRecord {
    ModuleRecord {
        id: id.into(),
        node_type: node_type.into(),
        attributes: named(id),
        level: 0,
    }
}

/// A dependency record using the type's default strength
pub fn dependency(from: &str, to: &str, dep_type: DependencyType) -> DependencyRecord {
    DependencyRecord {
        from: from.into(),
        to: to.into(),
        dep_type,
        strength: None,
        metadata: None,
    }
}

/// A registry over an in-memory store seeded with `modules` and `deps`
pub async fn registry_with(
    project: &ProjectId,
    modules: &[(&str, &str)],
    deps: &[(&str, &str, DependencyType)],
) -> (Arc<InMemoryArchitectureStore>, GraphRegistry) {
    let backend = Arc::new(InMemoryArchitectureStore::new());
    for (id, node_type) in modules {
        backend.seed_module(project, module(id, node_type)).await;
    }
    for (from, to, dep_type) in deps {
        backend
            .seed_dependency(project, dependency(from, to, dep_type.clone()))
            .await;
    }
    let registry = GraphRegistry::new(backend.clone(), EngineConfig::default());
    (backend, registry)
}
