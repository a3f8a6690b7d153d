//! Application context for CLI command execution.
//!
//! [`App`] locates the `.archgraph/` directory, loads its configuration and
//! hydrates the configured project through a [`GraphRegistry`].

use crate::commands::init::{
    find_archgraph_root, ProjectConfig, ARCHGRAPH_DIR_NAME, CONFIG_FILE_NAME,
};
use crate::domain::ProjectId;
use crate::error::{Error, Result};
use crate::persistence::create_store;
use crate::registry::{GraphRegistry, ProjectEngine};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Application context for CLI operations.
pub struct App {
    engine: Arc<ProjectEngine>,

    /// Path to the archgraph directory (.archgraph)
    archgraph_dir: PathBuf,

    config: ProjectConfig,
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("archgraph_dir", &self.archgraph_dir)
            .field("project", &self.config.project)
            .field("engine", &"<ProjectEngine>")
            .finish()
    }
}

impl App {
    /// Create an App instance from the given working directory.
    ///
    /// Searches up the directory tree for `.archgraph/`, loads the
    /// configuration and hydrates the configured project.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No archgraph repository is found in the directory tree
    /// - Configuration cannot be loaded
    /// - Hydration fails or times out
    pub async fn from_directory(working_dir: &Path) -> Result<Self> {
        let root_dir = find_archgraph_root(working_dir).ok_or_else(|| {
            Error::Config("Not an archgraph repository. Run 'archgraph init' first".to_string())
        })?;

        let archgraph_dir = root_dir.join(ARCHGRAPH_DIR_NAME);
        let config = ProjectConfig::load(&archgraph_dir.join(CONFIG_FILE_NAME)).await?;

        let backend = create_store(config.storage.to_backend(&root_dir)?);
        let registry = GraphRegistry::new(backend, config.engine.clone());
        let engine = registry.engine(&ProjectId::new(config.project.as_str())).await?;

        Ok(Self {
            engine,
            archgraph_dir,
            config,
        })
    }

    /// The hydrated project engine
    pub fn engine(&self) -> &ProjectEngine {
        &self.engine
    }

    /// The configured project id
    pub fn project(&self) -> &str {
        &self.config.project
    }

    /// Path to the archgraph directory
    pub fn archgraph_dir(&self) -> &Path {
        &self.archgraph_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::init;
    use crate::domain::{Attributes, NodeId};
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_app_from_initialized_directory() {
        let temp_dir = TempDir::new().unwrap();
        init::init(temp_dir.path(), Some("shop")).await.unwrap();

        let app = App::from_directory(temp_dir.path()).await.unwrap();

        assert_eq!(app.project(), "shop");
        assert!(app.archgraph_dir().ends_with(".archgraph"));
        assert_eq!(app.engine().counts().await, (0, 0));
    }

    #[tokio::test]
    async fn test_app_from_subdirectory() {
        let temp_dir = TempDir::new().unwrap();
        init::init(temp_dir.path(), Some("proj")).await.unwrap();

        let sub_dir = temp_dir.path().join("src").join("lib");
        std::fs::create_dir_all(&sub_dir).unwrap();

        let app = App::from_directory(&sub_dir).await.unwrap();
        assert_eq!(app.project(), "proj");
    }

    #[tokio::test]
    async fn test_app_not_initialized() {
        let temp_dir = TempDir::new().unwrap();
        let err = App::from_directory(temp_dir.path()).await.unwrap_err();
        assert!(err.to_string().contains("archgraph init"));
    }

    #[tokio::test]
    async fn test_changes_survive_reopening() {
        let temp_dir = TempDir::new().unwrap();
        init::init(temp_dir.path(), Some("shop")).await.unwrap();

        {
            let app = App::from_directory(temp_dir.path()).await.unwrap();
            let mut data = Attributes::new();
            data.insert("id".into(), json!("billing"));
            data.insert("name".into(), json!("Billing"));
            let outcome = app.engine().create_node(data, None).await.unwrap();
            assert!(outcome.is_success());
            assert!(outcome.sync_warnings.is_empty());
        }

        let app = App::from_directory(temp_dir.path()).await.unwrap();
        let node = app.engine().get_node(&NodeId::from("billing")).await.unwrap();
        assert_eq!(node.name(), Some("Billing"));
    }
}
