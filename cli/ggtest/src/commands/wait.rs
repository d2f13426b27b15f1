//! Wait command - poll an existing deployment until it reaches a verdict.

use std::time::Duration;

use anyhow::Result;
use clap::Args;
use uat_id::DeploymentId;

use crate::error::CliError;
use crate::output::print_outcome;

use super::CommandContext;

#[derive(Debug, Args)]
pub struct WaitCommand {
    /// Deployment id.
    deployment: DeploymentId,

    /// Seconds to wait, defaulting to the configured deployment timeout.
    #[arg(long)]
    timeout: Option<u64>,
}

impl WaitCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let harness = ctx.harness().await?;
        let timeout = self
            .timeout
            .map(Duration::from_secs)
            .unwrap_or_else(|| ctx.config.timeouts.deployment());

        let outcome = harness.poller().wait_for_deployment(&self.deployment, timeout).await;
        print_outcome(self.deployment.as_str(), outcome, ctx.format);

        if !outcome.is_success() {
            return Err(CliError::Unsuccessful {
                deployment: self.deployment.to_string(),
                outcome,
            }
            .into());
        }
        Ok(())
    }
}
