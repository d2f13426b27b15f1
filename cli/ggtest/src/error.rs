//! Error handling and display for the CLI.

use colored::Colorize;
use thiserror::Error;
use uat_harness::{CloudError, DeploymentOutcome, HarnessError};

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Invalid component '{0}': expected Name=Version")]
    InvalidComponent(String),

    #[error("No deployment target: pass --thing or --thing-group")]
    MissingTarget,

    #[error("Deployment {deployment} finished {outcome}")]
    Unsuccessful {
        deployment: String,
        outcome: DeploymentOutcome,
    },

    #[error("Teardown left {0} resource(s) behind")]
    DirtyTeardown(usize),
}

/// Print an error in a user-friendly format.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {:#}", "Error:".red().bold(), err);

    if let Some(hint) = hint(err) {
        eprintln!("\n{}", format!("Hint: {hint}").yellow());
    }
}

fn hint(err: &anyhow::Error) -> Option<&'static str> {
    if let Some(harness_err) = err.downcast_ref::<HarnessError>() {
        return match harness_err {
            HarnessError::InvalidConfig(_) => {
                Some("Check the config file and GGTEST_* variables with `ggtest check-config`.")
            }
            HarnessError::NotFound { .. } | HarnessError::RecipeCount { .. } => {
                Some("Components live under <components_dir>/<name>/<version>/recipe.")
            }
            HarnessError::VersionConflict { .. } => {
                Some("That version is already registered. Bump the version or remove the old one.")
            }
            HarnessError::ArtifactsNotAccessible { .. } => {
                Some("The service could not read the uploaded artifacts. Check bucket permissions.")
            }
            HarnessError::Cloud(cloud) => cloud_hint(cloud),
            _ => None,
        };
    }

    if let Some(cloud) = err.downcast_ref::<CloudError>() {
        return cloud_hint(cloud);
    }

    match err.downcast_ref::<CliError>() {
        Some(CliError::DirtyTeardown(_)) => Some("Run `ggtest sweep` to remove leftover artifacts."),
        _ => None,
    }
}

fn cloud_hint(err: &CloudError) -> Option<&'static str> {
    match err {
        CloudError::NotFound(_) => Some("Check the account and region the resource lives in."),
        CloudError::Service { .. } => Some("Check your credentials and network connection."),
        _ => None,
    }
}
