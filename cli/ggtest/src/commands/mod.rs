//! CLI commands.

mod check_config;
mod deploy;
mod sweep;
mod wait;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uat_harness::aws::AwsCloud;
use uat_harness::{CloudClients, HarnessConfig, TestHarness};
use uat_wait::{Clock, SystemClock};

use crate::output::OutputFormat;

/// ggtest - package, deploy and verify components on edge devices.
#[derive(Debug, Parser)]
#[command(name = "ggtest")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format (table or json).
    #[arg(long, global = true, default_value = "table")]
    format: String,

    /// Log format (pretty or json).
    #[arg(long, global = true, default_value = "pretty")]
    log_format: String,

    /// Configuration file (TOML, JSON or YAML).
    #[arg(long, short, global = true, env = "GGTEST_CONFIG")]
    config: Option<PathBuf>,

    /// Cloud account id, overriding the configuration.
    #[arg(long, global = true)]
    account: Option<String>,

    /// Region, overriding the configuration.
    #[arg(long, global = true)]
    region: Option<String>,

    /// Artifact bucket, overriding the configuration.
    #[arg(long, global = true)]
    bucket: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Load and validate the configuration, then print it.
    CheckConfig(check_config::CheckConfigCommand),

    /// Package components, deploy them, wait for the verdict and clean up.
    Deploy(deploy::DeployCommand),

    /// Wait for an existing deployment to reach a verdict.
    Wait(wait::WaitCommand),

    /// Delete every artifact under a prefix in the bucket.
    Sweep(sweep::SweepCommand),
}

impl Cli {
    /// Install the global tracing subscriber. `RUST_LOG` picks the level.
    pub fn init_tracing(&self) {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
        let registry = tracing_subscriber::registry().with(filter);
        if self.log_format == "json" {
            registry.with(tracing_subscriber::fmt::layer().json()).init();
        } else {
            registry.with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr)).init();
        }
    }

    /// Run the CLI command.
    pub async fn run(self) -> Result<()> {
        let overrides = Overrides {
            account: self.account,
            region: self.region,
            bucket: self.bucket,
        };
        let mut config = HarnessConfig::load(self.config.as_deref()).context("Failed to load configuration")?;
        overrides.apply(&mut config);

        let ctx = CommandContext {
            config,
            format: OutputFormat::parse(&self.format),
        };

        match self.command {
            Commands::CheckConfig(cmd) => cmd.run(ctx),
            Commands::Deploy(cmd) => cmd.run(ctx).await,
            Commands::Wait(cmd) => cmd.run(ctx).await,
            Commands::Sweep(cmd) => cmd.run(ctx).await,
        }
    }
}

/// Flag values that take precedence over file and environment.
#[derive(Debug, Default)]
struct Overrides {
    account: Option<String>,
    region: Option<String>,
    bucket: Option<String>,
}

impl Overrides {
    fn apply(self, config: &mut HarnessConfig) {
        if let Some(account) = self.account {
            config.account = account;
        }
        if let Some(region) = self.region {
            config.region = region;
        }
        if let Some(bucket) = self.bucket {
            config.bucket = bucket;
        }
    }
}

/// Shared command context.
pub struct CommandContext {
    pub config: HarnessConfig,
    pub format: OutputFormat,
}

impl CommandContext {
    /// Connect to the cloud and build a harness on the wall clock.
    pub async fn harness(&self) -> Result<TestHarness> {
        let cloud = AwsCloud::connect(&self.config)
            .await
            .with_context(|| format!("Failed to connect to {}", self.config.region))?;
        let cloud = Arc::new(cloud);
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Ok(TestHarness::new(
            self.config.clone(),
            CloudClients::from_single(cloud),
            clock,
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_overrides_win() {
        let mut config = HarnessConfig {
            account: "111111111111".into(),
            bucket: "from-file".into(),
            ..HarnessConfig::default()
        };
        Overrides {
            account: None,
            region: Some("eu-central-1".into()),
            bucket: Some("from-flag".into()),
        }
        .apply(&mut config);

        assert_eq!(config.account, "111111111111");
        assert_eq!(config.region, "eu-central-1");
        assert_eq!(config.bucket, "from-flag");
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["ggtest", "sweep", "--bucket", "b", "--format", "json"]).unwrap();
        assert_eq!(cli.bucket.as_deref(), Some("b"));
        assert_eq!(cli.format, "json");
    }
}
