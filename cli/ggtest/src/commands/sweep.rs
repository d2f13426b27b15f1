//! Sweep command - remove artifacts leaked by runs that never tore down.

use anyhow::Result;
use clap::Args;

use crate::output::{print_info, print_single, OutputFormat};

use super::CommandContext;

#[derive(Debug, Args)]
pub struct SweepCommand {
    /// Key prefix to delete, defaulting to the configured artifact prefix.
    #[arg(long)]
    prefix: Option<String>,
}

impl SweepCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let prefix = self.prefix.unwrap_or_else(|| sweep_prefix(&ctx.config.artifact_prefix));
        let harness = ctx.harness().await?;
        let removed = harness.sweep_artifacts(&prefix).await?;

        match ctx.format {
            OutputFormat::Json => print_single(&serde_json::json!({
                "bucket": ctx.config.bucket,
                "prefix": prefix,
                "removed": removed,
            })),
            OutputFormat::Table => {
                print_info(&format!("Removed {removed} object(s) under s3://{}/{prefix}", ctx.config.bucket));
            }
        }
        Ok(())
    }
}

// "artifacts" must not also match "artifacts-old/".
fn sweep_prefix(artifact_prefix: &str) -> String {
    format!("{}/", artifact_prefix.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sweep_prefix_is_a_directory() {
        assert_eq!(sweep_prefix("artifacts"), "artifacts/");
        assert_eq!(sweep_prefix("uat/artifacts/"), "uat/artifacts/");
    }
}
