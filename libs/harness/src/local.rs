//! Local deployments through the device's own CLI, bypassing the cloud.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::command::CommandLine;
use crate::error::HarnessError;

#[derive(Debug, Clone)]
pub struct LocalDeployer {
    cli_bin_path: PathBuf,
    recipe_install_dir: PathBuf,
    use_sudo: bool,
}

impl LocalDeployer {
    pub fn new(cli_bin_path: impl Into<PathBuf>, recipe_install_dir: impl Into<PathBuf>, use_sudo: bool) -> Self {
        Self {
            cli_bin_path: cli_bin_path.into(),
            recipe_install_dir: recipe_install_dir.into(),
            use_sudo,
        }
    }

    /// Build the `deploy` invocation. Either directory may be omitted.
    pub fn command(
        &self,
        artifacts_dir: Option<&Path>,
        recipe_dir: Option<&Path>,
        name: &str,
        version: &str,
    ) -> CommandLine {
        let mut command = CommandLine::new(self.cli_bin_path.as_os_str(), self.use_sudo).arg("deploy");
        if let Some(dir) = artifacts_dir {
            command = command.arg("--artifacts-dir").arg(dir.as_os_str());
        }
        if let Some(dir) = recipe_dir {
            command = command.arg("--recipe-dir").arg(dir.as_os_str());
        }
        command.arg(format!("--add-component={name}={version}"))
    }

    /// Run a local deployment. Returns whether the CLI exited successfully.
    pub async fn deploy(
        &self,
        artifacts_dir: Option<&Path>,
        recipe_dir: Option<&Path>,
        name: &str,
        version: &str,
    ) -> Result<bool, HarnessError> {
        let command = self.command(artifacts_dir, recipe_dir, name, version);
        let output = command.output().await?;

        if output.status.success() {
            info!(component = name, version, "Local deployment accepted");
            Ok(true)
        } else {
            warn!(
                component = name,
                version,
                status = ?output.status.code(),
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "Local deployment rejected"
            );
            Ok(false)
        }
    }

    /// Where the device stores the recipe of an installed component version.
    pub fn installed_recipe_path(&self, name: &str, version: &str) -> PathBuf {
        self.recipe_install_dir.join(format!("{name}-{version}.yaml"))
    }

    pub fn recipe_installed(&self, name: &str, version: &str) -> bool {
        self.installed_recipe_path(name, version).is_file()
    }
}
