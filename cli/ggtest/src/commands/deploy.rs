//! Deploy command - one full acceptance round trip against a device or group.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgGroup, Args};
use tracing::info;
use uat_harness::{DeploymentOutcome, TestHarness};
use uat_id::{TargetArn, ThingGroupName, ThingName};

use crate::error::CliError;
use crate::output::{print_info, print_outcome, print_teardown, OutputFormat};

use super::CommandContext;

#[derive(Debug, Args)]
#[command(group(ArgGroup::new("target").required(true).args(["thing", "thing_group"])))]
pub struct DeployCommand {
    /// Components to deploy as Name=Version, read from the components directory.
    #[arg(required = true, value_parser = parse_component)]
    components: Vec<(String, String)>,

    /// Deploy to a single device.
    #[arg(long)]
    thing: Option<ThingName>,

    /// Deploy to every device in a thing group.
    #[arg(long)]
    thing_group: Option<ThingGroupName>,

    /// Seconds to wait, defaulting to the configured deployment timeout.
    #[arg(long)]
    timeout: Option<u64>,

    /// Leave every created resource in place.
    #[arg(long)]
    keep: bool,
}

impl DeployCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let harness = ctx.harness().await?;
        let result = self.execute(&harness, ctx.format).await;

        if self.keep {
            print_info(&format!(
                "Keeping {} resource(s); run without --keep to clean up.",
                harness.ledger().len()
            ));
            return result.map(|_| ());
        }

        let report = harness.teardown().await;
        print_teardown(&report, ctx.format);

        result?;
        if !report.is_clean() {
            return Err(CliError::DirtyTeardown(report.failures.len()).into());
        }
        Ok(())
    }

    /// Package, deploy and wait. Teardown is the caller's job.
    async fn execute(&self, harness: &TestHarness, format: OutputFormat) -> Result<DeploymentOutcome> {
        let versions = self.versions_by_name()?;
        let target = self.target(harness)?;

        let mut packaged = Vec::with_capacity(versions.len());
        for (name, version) in &versions {
            let info = harness
                .packager()
                .package(name, &[version.as_str()])
                .await
                .with_context(|| format!("Failed to package {name}={version}"))?;
            info!(component = %name, version = %version, cloud_name = %info.name, "Packaged component");
            packaged.push(info);
        }

        let record = harness
            .deploy(&target, &packaged)
            .await
            .with_context(|| format!("Failed to deploy to {target}"))?;
        let timeout = self
            .timeout
            .map(Duration::from_secs)
            .unwrap_or_else(|| harness.config().timeouts.deployment());
        let outcome = harness.poller().wait_for_deployment(&record.id, timeout).await;
        print_outcome(record.id.as_str(), outcome, format);

        if !outcome.is_success() {
            return Err(CliError::Unsuccessful {
                deployment: record.id.to_string(),
                outcome,
            }
            .into());
        }
        Ok(outcome)
    }

    // A deployment carries one version per component.
    fn versions_by_name(&self) -> Result<BTreeMap<String, String>, CliError> {
        let mut versions = BTreeMap::new();
        for (name, version) in &self.components {
            if versions.insert(name.clone(), version.clone()).is_some() {
                return Err(CliError::InvalidComponent(format!("{name} given more than once")));
            }
        }
        Ok(versions)
    }

    fn target(&self, harness: &TestHarness) -> Result<TargetArn, CliError> {
        match (&self.thing, &self.thing_group) {
            (_, Some(group)) => Ok(harness.config().thing_group_target(group)),
            (Some(thing), None) => Ok(harness.config().thing_target(thing)),
            (None, None) => Err(CliError::MissingTarget),
        }
    }
}

/// Parse `Name=Version`.
fn parse_component(value: &str) -> Result<(String, String), CliError> {
    match value.split_once('=') {
        Some((name, version)) if !name.trim().is_empty() && !version.trim().is_empty() => {
            Ok((name.trim().to_string(), version.trim().to_string()))
        }
        _ => Err(CliError::InvalidComponent(value.to_string())),
    }
}
