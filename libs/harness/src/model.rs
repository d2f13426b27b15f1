//! Value types flowing between the packager, submitter and poller.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uat_id::{DeploymentId, TargetArn};

use crate::error::HarnessError;

/// A component definition on the local filesystem.
///
/// Layout: `<components_dir>/<name>/<version>/recipe/<single file>` and
/// `<components_dir>/<name>/<version>/artifacts/<files>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentDefinition {
    pub name: String,
    pub version: String,
    pub recipe_path: PathBuf,
    pub artifacts_dir: PathBuf,
}

impl ComponentDefinition {
    /// Locate a definition, requiring exactly one file in its recipe directory.
    pub fn locate(components_dir: &Path, name: &str, version: &str) -> Result<Self, HarnessError> {
        let version_dir = components_dir.join(name).join(version);
        let recipe_dir = version_dir.join("recipe");

        let mut recipes = Vec::new();
        let entries =
            std::fs::read_dir(&recipe_dir).map_err(|e| HarnessError::not_found(&recipe_dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| HarnessError::not_found(&recipe_dir, e))?;
            let path = entry.path();
            if path.is_file() {
                recipes.push(path);
            }
        }

        if recipes.len() != 1 {
            return Err(HarnessError::RecipeCount {
                dir: recipe_dir,
                count: recipes.len(),
            });
        }

        Ok(Self {
            name: name.to_string(),
            version: version.to_string(),
            recipe_path: recipes.remove(0),
            artifacts_dir: version_dir.join("artifacts"),
        })
    }

    /// The recipe directory this definition was located in.
    pub fn recipe_dir(&self) -> &Path {
        self.recipe_path.parent().unwrap_or(&self.recipe_path)
    }

    /// Artifact files, sorted by name. A missing artifacts directory means no artifacts.
    pub fn artifact_files(&self) -> Result<Vec<PathBuf>, HarnessError> {
        let entries = match std::fs::read_dir(&self.artifacts_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(HarnessError::not_found(&self.artifacts_dir, e)),
        };

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| HarnessError::not_found(&self.artifacts_dir, e))?;
            let path = entry.path();
            if path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

/// Configuration to merge into a component at deployment time.
#[derive(Debug, Clone, PartialEq)]
pub enum MergeConfig {
    /// A structured document, serialized to JSON on the wire.
    Document(serde_json::Value),
    /// An already-serialized document, passed through unchanged.
    Raw(String),
}

impl MergeConfig {
    /// The string sent as the `merge` field of a configuration update.
    pub fn to_wire(&self) -> String {
        match self {
            Self::Document(value) => value.to_string(),
            Self::Raw(raw) => raw.clone(),
        }
    }
}

impl From<serde_json::Value> for MergeConfig {
    fn from(value: serde_json::Value) -> Self {
        Self::Document(value)
    }
}

impl From<String> for MergeConfig {
    fn from(raw: String) -> Self {
        Self::Raw(raw)
    }
}

impl From<&str> for MergeConfig {
    fn from(raw: &str) -> Self {
        Self::Raw(raw.to_string())
    }
}

/// A packaged component ready to be placed in a deployment.
///
/// `versions` holds more than one entry only when several releases were
/// pre-staged in one packaging call; a deployment entry takes exactly one.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentDeploymentInfo {
    pub name: String,
    pub versions: Vec<String>,
    pub merge_config: Option<MergeConfig>,
}

impl ComponentDeploymentInfo {
    pub fn new(name: impl Into<String>, versions: Vec<String>) -> Self {
        Self {
            name: name.into(),
            versions,
            merge_config: None,
        }
    }

    /// A single-version entry.
    pub fn single(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self::new(name, vec![version.into()])
    }

    /// Copy with a merge configuration attached.
    #[must_use]
    pub fn with_merge_config(&self, merge: impl Into<MergeConfig>) -> Self {
        Self {
            merge_config: Some(merge.into()),
            ..self.clone()
        }
    }

    /// Copy with the version list replaced.
    #[must_use]
    pub fn with_versions(&self, versions: Vec<String>) -> Self {
        Self {
            versions,
            ..self.clone()
        }
    }

    /// Copy pinned to one of the staged versions.
    #[must_use]
    pub fn pinned(&self, version: impl Into<String>) -> Self {
        self.with_versions(vec![version.into()])
    }

    /// The version, if exactly one is set.
    pub fn version(&self) -> Option<&str> {
        match self.versions.as_slice() {
            [only] => Some(only.as_str()),
            _ => None,
        }
    }
}

/// A submitted deployment. The status is never cached here; it is owned remotely.
#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentRecord {
    pub id: DeploymentId,
    pub target: TargetArn,
    pub components: Vec<ComponentDeploymentInfo>,
    pub created_at: DateTime<Utc>,
}

/// The local verdict for a deployment wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeploymentOutcome {
    Succeeded,
    Failed,
    /// No terminal status was observed within the budget.
    Timeout,
}

impl DeploymentOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Timeout => "TIMEOUT",
        }
    }
}

impl fmt::Display for DeploymentOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Execution status a device reports for one of its effective deployments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DeviceExecutionStatus {
    Queued,
    InProgress,
    Succeeded,
    Failed,
    Completed,
    TimedOut,
    Canceled,
    Rejected,
    Unknown(String),
}

impl DeviceExecutionStatus {
    pub fn from_wire(s: &str) -> Self {
        match s {
            "QUEUED" => Self::Queued,
            "IN_PROGRESS" => Self::InProgress,
            "SUCCEEDED" => Self::Succeeded,
            "FAILED" => Self::Failed,
            "COMPLETED" => Self::Completed,
            "TIMED_OUT" => Self::TimedOut,
            "CANCELED" => Self::Canceled,
            "REJECTED" => Self::Rejected,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_wire(&self) -> &str {
        match self {
            Self::Queued => "QUEUED",
            Self::InProgress => "IN_PROGRESS",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Completed => "COMPLETED",
            Self::TimedOut => "TIMED_OUT",
            Self::Canceled => "CANCELED",
            Self::Rejected => "REJECTED",
            Self::Unknown(other) => other,
        }
    }

    /// The verdict this status settles on, if it is terminal for the poller.
    ///
    /// Only `SUCCEEDED` and `FAILED` are terminal; everything else keeps polling.
    pub fn outcome(&self) -> Option<DeploymentOutcome> {
        match self {
            Self::Succeeded => Some(DeploymentOutcome::Succeeded),
            Self::Failed => Some(DeploymentOutcome::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for DeviceExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// Top-level deployment status as reported by the deployment service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeploymentStatus {
    Active,
    Completed,
    Canceled,
    Failed,
    Inactive,
    Unknown(String),
}

impl DeploymentStatus {
    pub fn from_wire(s: &str) -> Self {
        match s {
            "ACTIVE" => Self::Active,
            "COMPLETED" => Self::Completed,
            "CANCELED" => Self::Canceled,
            "FAILED" => Self::Failed,
            "INACTIVE" => Self::Inactive,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_wire(&self) -> &str {
        match self {
            Self::Active => "ACTIVE",
            Self::Completed => "COMPLETED",
            Self::Canceled => "CANCELED",
            Self::Failed => "FAILED",
            Self::Inactive => "INACTIVE",
            Self::Unknown(other) => other,
        }
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// Registration state of a component version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentState {
    Requested,
    Initiated,
    Deployable,
    Failed,
    Deprecated,
    Unknown(String),
}

impl ComponentState {
    pub fn from_wire(s: &str) -> Self {
        match s {
            "REQUESTED" => Self::Requested,
            "INITIATED" => Self::Initiated,
            "DEPLOYABLE" => Self::Deployable,
            "FAILED" => Self::Failed,
            "DEPRECATED" => Self::Deprecated,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// Ready for deployment.
    pub fn is_deployable(&self) -> bool {
        matches!(self, Self::Deployable)
    }
}

impl fmt::Display for ComponentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Requested => "REQUESTED",
            Self::Initiated => "INITIATED",
            Self::Deployable => "DEPLOYABLE",
            Self::Failed => "FAILED",
            Self::Deprecated => "DEPRECATED",
            Self::Unknown(other) => other,
        };
        f.write_str(s)
    }
}

/// Health a core device reports to the deployment service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CoreDeviceHealth {
    Healthy,
    Unhealthy,
}

impl CoreDeviceHealth {
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "HEALTHY" => Some(Self::Healthy),
            "UNHEALTHY" => Some(Self::Unhealthy),
            _ => None,
        }
    }
}
