//! Output formatting for CLI commands.

use colored::Colorize;
use serde::Serialize;
use tabled::{Table, Tabled};
use uat_harness::{DeploymentOutcome, TeardownReport};

/// Output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable table format.
    #[default]
    Table,
    /// JSON format.
    Json,
}

impl OutputFormat {
    pub fn parse(value: &str) -> Self {
        match value {
            "json" => Self::Json,
            _ => Self::Table,
        }
    }
}

/// Print rows in the specified format.
pub fn print_output<T: Serialize + Tabled>(data: &[T], format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            if data.is_empty() {
                println!("{}", "No items found.".dimmed());
            } else {
                println!("{}", Table::new(data));
            }
        }
        OutputFormat::Json => println!("{}", to_json(data)),
    }
}

/// Print a single item as JSON.
pub fn print_single<T: Serialize>(data: &T) {
    println!("{}", to_json(data));
}

fn to_json<T: Serialize + ?Sized>(data: &T) -> String {
    serde_json::to_string_pretty(data).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
}

/// Print a success message.
pub fn print_success(message: &str) {
    println!("{} {}", "Success:".green().bold(), message);
}

/// Print an info message.
pub fn print_info(message: &str) {
    println!("{} {}", "Info:".blue().bold(), message);
}

/// Print a warning message.
pub fn print_warning(message: &str) {
    println!("{} {}", "Warning:".yellow().bold(), message);
}

/// Print a deployment verdict.
pub fn print_outcome(deployment: &str, outcome: DeploymentOutcome, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_single(&serde_json::json!({
            "deployment_id": deployment,
            "outcome": outcome,
        })),
        OutputFormat::Table => {
            let verdict = match outcome {
                DeploymentOutcome::Succeeded => outcome.as_str().green().bold(),
                DeploymentOutcome::Failed => outcome.as_str().red().bold(),
                DeploymentOutcome::Timeout => outcome.as_str().yellow().bold(),
            };
            println!("Deployment {deployment}: {verdict}");
        }
    }
}

#[derive(Debug, Serialize, Tabled)]
pub struct TeardownRow {
    #[tabled(rename = "Resource")]
    pub resource: &'static str,
    #[tabled(rename = "Removed")]
    pub removed: usize,
}

#[derive(Debug, Serialize, Tabled)]
pub struct FailureRow {
    #[tabled(rename = "Step")]
    pub step: String,
    #[tabled(rename = "Resource")]
    pub resource: String,
    #[tabled(rename = "Error")]
    pub error: String,
}

pub fn teardown_rows(report: &TeardownReport) -> Vec<TeardownRow> {
    vec![
        TeardownRow {
            resource: "targets reset",
            removed: report.targets_reset,
        },
        TeardownRow {
            resource: "deployments",
            removed: report.deployments_deleted,
        },
        TeardownRow {
            resource: "components",
            removed: report.components_deleted,
        },
        TeardownRow {
            resource: "objects",
            removed: report.objects_deleted,
        },
        TeardownRow {
            resource: "thing groups",
            removed: report.thing_groups_deleted,
        },
    ]
}

pub fn failure_rows(report: &TeardownReport) -> Vec<FailureRow> {
    report
        .failures
        .iter()
        .map(|f| FailureRow {
            step: f.step.to_string(),
            resource: f.resource.clone(),
            error: f.error.clone(),
        })
        .collect()
}

/// Print what a teardown removed and anything it could not.
pub fn print_teardown(report: &TeardownReport, format: OutputFormat) {
    if format == OutputFormat::Json {
        print_single(&serde_json::json!({
            "removed": teardown_rows(report),
            "failures": failure_rows(report),
        }));
        return;
    }

    if report.is_noop() {
        print_info("Nothing to tear down.");
        return;
    }
    print_output(&teardown_rows(report), format);
    if !report.is_clean() {
        print_warning(&format!("{} resource(s) could not be removed:", report.failures.len()));
        print_output(&failure_rows(report), format);
    }
}
