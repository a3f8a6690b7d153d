//! Implementation of the `init` command.
//!
//! Creates the `.archgraph/` directory with a configuration file and an empty
//! architecture data file, and locates it again from any subdirectory.

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::persistence::StoreBackend;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Default project id if none specified
pub const DEFAULT_PROJECT: &str = "default";

/// Name of the archgraph directory
pub const ARCHGRAPH_DIR_NAME: &str = ".archgraph";

/// Name of the configuration file
pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// Name of the architecture data file
pub const DATA_FILE_NAME: &str = "architecture.jsonl";

/// Name of the gitignore file within .archgraph
pub const GITIGNORE_FILE_NAME: &str = ".gitignore";

/// Minimum project id length
pub const MIN_PROJECT_LENGTH: usize = 2;

/// Maximum project id length
pub const MAX_PROJECT_LENGTH: usize = 40;

/// Maximum directory depth to traverse when searching for the archgraph root
pub const MAX_TRAVERSAL_DEPTH: usize = 256;

/// Configuration file structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectConfig {
    /// Project scope the CLI works on
    pub project: String,

    /// Storage configuration
    pub storage: StorageConfig,

    /// Engine thresholds
    #[serde(default)]
    pub engine: EngineConfig,
}

/// Storage configuration section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageConfig {
    /// Backend type: `jsonl` or `memory`
    pub backend: String,

    /// Path to the data file, relative to the repository root
    pub data_file: String,
}

impl StorageConfig {
    /// Resolve the backend relative to `root`.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] for unknown backend names.
    pub fn to_backend(&self, root: &Path) -> Result<StoreBackend> {
        match self.backend.as_str() {
            "jsonl" => Ok(StoreBackend::Jsonl(root.join(&self.data_file))),
            "memory" => Ok(StoreBackend::InMemory),
            other => Err(Error::Config(format!("Unknown storage backend '{other}'"))),
        }
    }
}

impl ProjectConfig {
    /// Create a new configuration for `project`
    #[must_use]
    pub fn new(project: &str) -> Self {
        Self {
            project: project.to_string(),
            storage: StorageConfig {
                backend: "jsonl".to_string(),
                data_file: format!("{ARCHGRAPH_DIR_NAME}/{DATA_FILE_NAME}"),
            },
            engine: EngineConfig::default(),
        }
    }

    /// Load configuration from a file
    ///
    /// # Errors
    ///
    /// IO errors and [`Error::Config`] for malformed content.
    pub async fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).await?;
        serde_yaml::from_str(&content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Save configuration to a file
    ///
    /// # Errors
    ///
    /// IO and serialization errors.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let content =
            serde_yaml::to_string(self).map_err(|e| Error::Config(format!("YAML error: {e}")))?;
        fs::write(path, content).await?;
        Ok(())
    }
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self::new(DEFAULT_PROJECT)
    }
}

/// Result of the init command
#[derive(Debug)]
pub struct InitResult {
    /// Path to the created archgraph directory
    pub archgraph_dir: PathBuf,
    /// Path to the created config file
    pub config_file: PathBuf,
    /// Path to the created data file
    pub data_file: PathBuf,
    /// The project id
    pub project: String,
}

/// Validate a project id.
///
/// 2-40 characters: letters, digits, `-` and `_`. Expects trimmed input.
///
/// # Errors
///
/// [`Error::Config`] describing the first problem found.
pub fn validate_project_id(project: &str) -> Result<()> {
    if project.len() < MIN_PROJECT_LENGTH {
        return Err(Error::Config(format!(
            "Project id must be at least {MIN_PROJECT_LENGTH} characters"
        )));
    }

    if project.len() > MAX_PROJECT_LENGTH {
        return Err(Error::Config(format!(
            "Project id cannot exceed {MAX_PROJECT_LENGTH} characters"
        )));
    }

    if !project
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(Error::Config(
            "Project id must contain only letters, digits, '-' or '_'".to_string(),
        ));
    }

    Ok(())
}

/// Initialize a new archgraph repository in `base_dir`.
///
/// # Errors
///
/// Fails if `.archgraph/` already exists, the project id is invalid, or a
/// filesystem operation fails.
pub async fn init(base_dir: &Path, project: Option<&str>) -> Result<InitResult> {
    let project = project.unwrap_or(DEFAULT_PROJECT).trim();
    validate_project_id(project)?;

    let archgraph_dir = base_dir.join(ARCHGRAPH_DIR_NAME);
    if archgraph_dir.exists() {
        return Err(Error::Config(format!(
            "Archgraph is already initialized in this directory. Found existing '{ARCHGRAPH_DIR_NAME}'"
        )));
    }

    fs::create_dir_all(&archgraph_dir).await?;

    let config_file = archgraph_dir.join(CONFIG_FILE_NAME);
    ProjectConfig::new(project).save(&config_file).await?;

    let data_file = archgraph_dir.join(DATA_FILE_NAME);
    fs::write(&data_file, "").await?;

    fs::write(
        archgraph_dir.join(GITIGNORE_FILE_NAME),
        "# Temporary files left by interrupted rewrites\n*.tmp\n",
    )
    .await?;

    Ok(InitResult {
        archgraph_dir,
        config_file,
        data_file,
        project: project.to_string(),
    })
}

/// Find the directory containing `.archgraph/`, searching upwards.
///
/// Gives up at the filesystem root or after [`MAX_TRAVERSAL_DEPTH`] levels.
#[must_use]
pub fn find_archgraph_root(start_dir: &Path) -> Option<PathBuf> {
    let mut current = start_dir.to_path_buf();
    let mut depth = 0;

    loop {
        if current.join(ARCHGRAPH_DIR_NAME).exists() {
            return Some(current);
        }

        depth += 1;
        if depth > MAX_TRAVERSAL_DEPTH || !current.pop() {
            return None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    #[rstest]
    #[case::short("ab")]
    #[case::hyphenated("billing-platform")]
    #[case::underscored("core_services")]
    #[case::max_length("a".repeat(40))]
    fn test_validate_project_id_valid(#[case] project: impl AsRef<str>) {
        assert!(validate_project_id(project.as_ref()).is_ok());
    }

    #[rstest]
    #[case::too_short("a", "at least 2")]
    #[case::too_long("a".repeat(41), "cannot exceed 40")]
    #[case::space("my project", "only letters")]
    #[case::slash("a/b", "only letters")]
    fn test_validate_project_id_invalid(#[case] project: impl AsRef<str>, #[case] expected: &str) {
        let err = validate_project_id(project.as_ref()).unwrap_err().to_string();
        assert!(err.contains(expected), "Expected '{expected}' in '{err}'");
    }

    #[tokio::test]
    async fn test_config_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(CONFIG_FILE_NAME);

        let mut original = ProjectConfig::new("shop");
        original.engine.versioning.max_snapshots = 7;
        original.save(&path).await.unwrap();

        assert_eq!(ProjectConfig::load(&path).await.unwrap(), original);
    }

    #[tokio::test]
    async fn test_config_without_engine_section_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(CONFIG_FILE_NAME);
        tokio::fs::write(
            &path,
            "project: shop\nstorage:\n  backend: memory\n  data_file: unused\n",
        )
        .await
        .unwrap();

        let config = ProjectConfig::load(&path).await.unwrap();
        assert_eq!(config.engine, EngineConfig::default());
        assert!(matches!(
            config.storage.to_backend(temp_dir.path()).unwrap(),
            StoreBackend::InMemory
        ));
    }

    #[test]
    fn test_unknown_backend() {
        let mut config = ProjectConfig::default();
        config.storage.backend = "postgres".into();
        assert!(config.storage.to_backend(Path::new(".")).is_err());
    }

    #[tokio::test]
    async fn test_init_creates_directory_structure() {
        let temp_dir = TempDir::new().unwrap();
        let result = init(temp_dir.path(), Some("shop")).await.unwrap();

        assert!(result.archgraph_dir.exists());
        assert!(result.config_file.exists());
        assert!(result.data_file.exists());
        assert_eq!(result.project, "shop");
    }

    #[tokio::test]
    async fn test_init_fails_if_already_initialized() {
        let temp_dir = TempDir::new().unwrap();
        init(temp_dir.path(), None).await.unwrap();

        let err = init(temp_dir.path(), None).await.unwrap_err().to_string();
        assert!(err.contains("already initialized"));
    }

    #[test]
    fn test_find_root_from_nested_directory() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::create_dir(temp_dir.path().join(ARCHGRAPH_DIR_NAME)).unwrap();
        let nested = temp_dir.path().join("src").join("deep");
        std::fs::create_dir_all(&nested).unwrap();

        assert_eq!(find_archgraph_root(&nested), Some(temp_dir.path().to_path_buf()));
    }

    #[test]
    fn test_find_root_not_found() {
        let temp_dir = TempDir::new().unwrap();
        assert!(find_archgraph_root(temp_dir.path()).is_none());
    }
}
