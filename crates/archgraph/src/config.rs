//! Engine configuration.
//!
//! All thresholds the analyses, the version manager, the persistence
//! boundary and the health monitor use live here. Every field has a default
//! so a partial YAML document is enough.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::fs;

/// Top-level engine settings
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Impact and traversal thresholds
    pub analysis: AnalysisConfig,
    /// Snapshot retention
    pub versioning: VersioningConfig,
    /// Durable-store deadlines
    pub persistence: PersistenceConfig,
    /// Health check thresholds
    pub monitoring: MonitoringConfig,
}

/// Thresholds for impact analysis and simulation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Scores above this count as high impact
    pub high_impact_threshold: f64,
    /// Affected counts above this count as a large scope
    pub large_scope_threshold: usize,
    /// High-impact dependent counts above this make a change high risk
    pub high_risk_dependent_count: usize,
    /// Dependent counts above this make a node critical
    pub critical_dependent_count: usize,
    /// Default hop limit for propagation paths
    pub propagation_depth: usize,
    /// Default hop limit for dependency chains
    pub chain_depth: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            high_impact_threshold: 0.7,
            large_scope_threshold: 10,
            high_risk_dependent_count: 5,
            critical_dependent_count: 5,
            propagation_depth: 3,
            chain_depth: 5,
        }
    }
}

/// Snapshot retention
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VersioningConfig {
    /// Oldest snapshots are dropped beyond this count
    pub max_snapshots: usize,
}

impl Default for VersioningConfig {
    fn default() -> Self {
        Self { max_snapshots: 50 }
    }
}

/// Deadlines at the durable-store boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Deadline for loading a project
    pub hydrate_timeout_ms: u64,
    /// Deadline for each write-through call
    pub write_timeout_ms: u64,
}

impl PersistenceConfig {
    /// Hydration deadline
    #[must_use]
    pub fn hydrate_timeout(&self) -> Duration {
        Duration::from_millis(self.hydrate_timeout_ms)
    }

    /// Write-through deadline
    #[must_use]
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            hydrate_timeout_ms: 5000,
            write_timeout_ms: 2000,
        }
    }
}

/// Health check settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// Overall complexity (0..10) above which an alert is raised
    pub complexity_threshold: f64,
    /// Period of the background health check
    pub health_check_interval_secs: u64,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            complexity_threshold: 8.0,
            health_check_interval_secs: 60,
        }
    }
}

impl EngineConfig {
    /// Parse a YAML document
    ///
    /// # Errors
    ///
    /// [`Error::Config`] if the document is not valid YAML for this shape.
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load configuration from a YAML file
    ///
    /// # Errors
    ///
    /// IO errors and [`Error::Config`] for malformed content.
    pub async fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).await?;
        Self::from_yaml(&content)
    }
}
