//! JSON-lines file store.
//!
//! Every line of the data file is one tagged record:
//!
//! ```text
//! {"record":"module","project":"shop","data":{"id":"mod-a1b2","module_type":"service",...}}
//! {"record":"dependency","project":"shop","data":{"from":"mod-a1b2","to":"mod-c3d4","type":"uses"}}
//! {"record":"rule","project":"shop","data":{"kind":"dependency","condition":{"max_dependencies":5}}}
//! ```
//!
//! Loading is resilient: malformed lines are skipped and reported as
//! [`LoadWarning`]s. Writes rewrite the whole file through a temporary file
//! and a rename, so readers never see a half-written file.

use super::{ArchitectureStore, DependencyRecord, ModuleRecord};
use crate::domain::{DependencyEdge, Node, NodeId, ProjectId};
use crate::error::{Error, Result};
use crate::rules::RuleDefinition;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
enum Record {
    Module {
        project: ProjectId,
        data: ModuleRecord,
    },
    Dependency {
        project: ProjectId,
        data: DependencyRecord,
    },
    Rule {
        project: ProjectId,
        data: RuleDefinition,
    },
}

impl Record {
    fn project(&self) -> &ProjectId {
        match self {
            Record::Module { project, .. }
            | Record::Dependency { project, .. }
            | Record::Rule { project, .. } => project,
        }
    }
}

/// A line that could not be parsed while loading
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadWarning {
    /// 1-based line number
    pub line_number: usize,
    /// Parser message
    pub error: String,
}

/// Store backed by a single JSON-lines file
#[derive(Debug)]
pub struct JsonlArchitectureStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlArchitectureStore {
    /// Use `path` as the data file; it is created on first write
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// The data file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a rule definition for `project`.
    ///
    /// # Errors
    ///
    /// IO and serialization errors.
    pub async fn add_rule(&self, project: &ProjectId, rule: RuleDefinition) -> Result<()> {
        self.modify(|records| {
            records.push(Record::Rule {
                project: project.clone(),
                data: rule,
            });
            Ok(())
        })
        .await
    }

    /// Read every parsable record, collecting warnings for the rest.
    async fn read_records(&self) -> Result<(Vec<Record>, Vec<LoadWarning>)> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok((Vec::new(), Vec::new())),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        let mut warnings = Vec::new();
        for (index, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Record>(line) {
                Ok(record) => records.push(record),
                Err(e) => {
                    let warning = LoadWarning {
                        line_number: index + 1,
                        error: e.to_string(),
                    };
                    warn!(
                        path = %self.path.display(),
                        line = warning.line_number,
                        error = %warning.error,
                        "Skipping malformed record"
                    );
                    warnings.push(warning);
                }
            }
        }
        Ok((records, warnings))
    }

    async fn project_records(&self, project: &ProjectId) -> Result<Vec<Record>> {
        let (records, _) = self.read_records().await?;
        Ok(records
            .into_iter()
            .filter(|r| r.project() == project)
            .collect())
    }

    /// Load all records, apply `f`, and write the result back atomically.
    ///
    /// Malformed lines do not survive a rewrite.
    async fn modify<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Vec<Record>) -> Result<()> + Send,
    {
        let _guard = self.write_lock.lock().await;
        let (mut records, _) = self.read_records().await?;
        f(&mut records)?;
        self.write_atomic(&records).await
    }

    async fn write_atomic(&self, records: &[Record]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let mut buffer = Vec::new();
        for record in records {
            serde_json::to_writer(&mut buffer, record)?;
            buffer.push(b'\n');
        }

        let mut temp_name = self.path.file_name().unwrap_or_default().to_os_string();
        temp_name.push(".tmp");
        let temp_path = self.path.with_file_name(temp_name);

        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(&buffer).await?;
        file.sync_all().await?;
        drop(file);

        if let Err(e) = fs::rename(&temp_path, &self.path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        Ok(())
    }

    /// Unparsable lines currently in the file.
    ///
    /// # Errors
    ///
    /// IO errors other than a missing file.
    pub async fn load_warnings(&self) -> Result<Vec<LoadWarning>> {
        Ok(self.read_records().await?.1)
    }
}

#[async_trait]
impl ArchitectureStore for JsonlArchitectureStore {
    async fn load_modules(&self, project: &ProjectId) -> Result<Vec<ModuleRecord>> {
        Ok(self
            .project_records(project)
            .await?
            .into_iter()
            .filter_map(|r| match r {
                Record::Module { data, .. } => Some(data),
                _ => None,
            })
            .collect())
    }

    async fn load_dependencies(&self, project: &ProjectId) -> Result<Vec<DependencyRecord>> {
        Ok(self
            .project_records(project)
            .await?
            .into_iter()
            .filter_map(|r| match r {
                Record::Dependency { data, .. } => Some(data),
                _ => None,
            })
            .collect())
    }

    async fn load_rules(&self, project: &ProjectId) -> Result<Vec<RuleDefinition>> {
        Ok(self
            .project_records(project)
            .await?
            .into_iter()
            .filter_map(|r| match r {
                Record::Rule { data, .. } => Some(data),
                _ => None,
            })
            .collect())
    }

    async fn create_module(&self, project: &ProjectId, node: &Node) -> Result<()> {
        self.modify(|records| {
            let exists = records.iter().any(|r| {
                matches!(r, Record::Module { project: p, data } if p == project && data.id == node.id)
            });
            if exists {
                return Err(Error::Persistence(format!("module {} already exists", node.id)));
            }
            records.push(Record::Module {
                project: project.clone(),
                data: ModuleRecord::from(node),
            });
            Ok(())
        })
        .await
    }

    async fn update_module(&self, project: &ProjectId, node: &Node) -> Result<()> {
        self.modify(|records| {
            let record = records
                .iter_mut()
                .find_map(|r| match r {
                    Record::Module { project: p, data } if p == project && data.id == node.id => {
                        Some(data)
                    }
                    _ => None,
                })
                .ok_or_else(|| Error::Persistence(format!("module {} not found", node.id)))?;
            *record = ModuleRecord::from(node);
            Ok(())
        })
        .await
    }

    async fn delete_module(&self, project: &ProjectId, id: &NodeId) -> Result<()> {
        self.modify(|records| {
            records.retain(|r| match r {
                Record::Module { project: p, data } => !(p == project && &data.id == id),
                Record::Dependency { project: p, data } => {
                    !(p == project && (&data.from == id || &data.to == id))
                }
                Record::Rule { .. } => true,
            });
            Ok(())
        })
        .await
    }

    async fn create_dependency(&self, project: &ProjectId, edge: &DependencyEdge) -> Result<()> {
        self.modify(|records| {
            let exists = records.iter().any(|r| {
                matches!(r, Record::Dependency { project: p, data } if p == project && data.matches(edge))
            });
            if exists {
                return Err(Error::Persistence(format!(
                    "dependency {} -> {} already exists",
                    edge.from, edge.to
                )));
            }
            records.push(Record::Dependency {
                project: project.clone(),
                data: DependencyRecord::from(edge),
            });
            Ok(())
        })
        .await
    }

    async fn delete_dependency(&self, project: &ProjectId, edge: &DependencyEdge) -> Result<()> {
        self.modify(|records| {
            records.retain(|r| {
                !matches!(r, Record::Dependency { project: p, data } if p == project && data.matches(edge))
            });
            Ok(())
        })
        .await
    }
}
