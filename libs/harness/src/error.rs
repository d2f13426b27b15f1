//! Error types for the harness core and its cloud capability boundary.

use std::path::PathBuf;

use thiserror::Error;
use uat_id::IdError;

/// Errors reported by a cloud capability implementation.
///
/// Implementations classify provider errors into these variants so the core
/// can decide what is retryable without knowing the provider.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CloudError {
    /// The resource already exists (e.g. a component version).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Artifacts referenced by a recipe are not yet readable by the service.
    #[error("artifacts not yet accessible: {0}")]
    ArtifactsNotAccessible(String),

    /// The resource does not exist.
    #[error("resource not found: {0}")]
    NotFound(String),

    /// The request was rejected as malformed.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Any other provider failure.
    #[error("{operation} failed: {message}")]
    Service { operation: String, message: String },
}

impl CloudError {
    /// Create a generic service error.
    pub fn service(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Service {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Returns true if the resource was missing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns true if a component registration may succeed on a later attempt.
    pub fn is_artifact_lag(&self) -> bool {
        matches!(self, Self::ArtifactsNotAccessible(_))
    }
}

/// Errors surfaced by the harness core.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// The component version was already registered; the name was reused.
    #[error("component {name} version {version} already exists: {message}")]
    VersionConflict {
        name: String,
        version: String,
        message: String,
    },

    /// A packaging call received no versions.
    #[error("component {component}: at least one version is required")]
    NoVersions { component: String },

    /// A deployment entry did not carry exactly one version.
    #[error("component {component} lists {count} versions; a deployment entry takes exactly one")]
    VersionCount { component: String, count: usize },

    /// A local component directory or file could not be read.
    #[error("not found: {}: {source}", path.display())]
    NotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The recipe directory did not contain exactly one recipe file.
    #[error("expected exactly one recipe in {}, found {count}", dir.display())]
    RecipeCount { dir: PathBuf, count: usize },

    /// The recipe could not be parsed or lacks required fields.
    #[error("invalid recipe {origin}: {message}")]
    InvalidRecipe { origin: String, message: String },

    /// A dependency rewrite named a placeholder the recipe does not declare.
    #[error("dependency placeholder '{placeholder}' is not declared in the ComponentDependencies of {component}")]
    MissingDependency {
        component: String,
        placeholder: String,
    },

    /// Registration kept failing because artifacts were not visible.
    #[error("artifacts for {component} still not accessible after {attempts} registration attempts")]
    ArtifactsNotAccessible {
        component: String,
        attempts: u32,
        #[source]
        source: CloudError,
    },

    /// A component removal named a component the deployment does not contain.
    #[error("component '{component}' not found in deployment {deployment}")]
    ComponentNotInDeployment {
        component: String,
        deployment: String,
    },

    /// The harness configuration is unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A local process could not be started.
    #[error("failed to run {program}: {source}")]
    Process {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// A remote call failed.
    #[error(transparent)]
    Cloud(#[from] CloudError),

    /// A name or ARN was malformed.
    #[error(transparent)]
    Id(#[from] IdError),
}

impl HarnessError {
    pub(crate) fn not_found(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::NotFound {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn invalid_recipe(origin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidRecipe {
            origin: origin.into(),
            message: message.into(),
        }
    }

    /// Returns true for errors caused by the test setup rather than the remote side.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::VersionConflict { .. }
                | Self::NoVersions { .. }
                | Self::VersionCount { .. }
                | Self::NotFound { .. }
                | Self::RecipeCount { .. }
                | Self::InvalidRecipe { .. }
                | Self::MissingDependency { .. }
                | Self::InvalidConfig(_)
        )
    }
}
