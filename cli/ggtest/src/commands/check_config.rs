//! Check-config command - validate the merged configuration.

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use tabled::Tabled;

use crate::output::{print_output, print_single, print_success, OutputFormat};

use super::CommandContext;

#[derive(Debug, Args)]
pub struct CheckConfigCommand {}

#[derive(Debug, Serialize, Tabled)]
struct SettingRow {
    #[tabled(rename = "Setting")]
    key: &'static str,
    #[tabled(rename = "Value")]
    value: String,
}

impl CheckConfigCommand {
    pub fn run(self, ctx: CommandContext) -> Result<()> {
        ctx.config.validate()?;

        match ctx.format {
            OutputFormat::Json => print_single(&ctx.config),
            OutputFormat::Table => {
                print_output(&settings(&ctx), ctx.format);
                print_success("Configuration is valid.");
            }
        }
        Ok(())
    }
}

fn settings(ctx: &CommandContext) -> Vec<SettingRow> {
    let c = &ctx.config;
    let t = &c.timeouts;
    let row = |key, value: String| SettingRow { key, value };
    vec![
        row("account", c.account.clone()),
        row("region", c.region.clone()),
        row("bucket", c.bucket.clone()),
        row("artifact_prefix", c.artifact_prefix.clone()),
        row("random_artifact_prefix", c.random_artifact_prefix.to_string()),
        row("components_dir", c.components_dir.display().to_string()),
        row("cli_bin_path", c.cli_bin_path.display().to_string()),
        row("use_sudo", c.use_sudo.to_string()),
        row("deployment timeout", format!("{:?}", t.deployment())),
        row("cleanup settle", format!("{:?}", t.cleanup_settle())),
        row("poll interval", format!("{:?}", t.poll_interval())),
    ]
}
