//! Device status probe: what the device's service manager says about a component.

use std::fmt;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};
use uat_wait::{poll_until, Clock};

use crate::command::CommandLine;
use crate::error::HarnessError;

/// Coarse state of a component's service unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceState {
    Running,
    /// The unit failed.
    Broken,
    /// The unit ran and exited cleanly.
    Finished,
    NotRunning,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Running => "RUNNING",
            Self::Broken => "BROKEN",
            Self::Finished => "FINISHED",
            Self::NotRunning => "NOT_RUNNING",
        };
        f.write_str(s)
    }
}

/// Inspects components running on the device under test.
#[async_trait]
pub trait DeviceProbe: Send + Sync {
    async fn service_state(&self, component: &str) -> Result<ServiceState, HarnessError>;

    /// Follow a unit's log until a line contains `message`. Returns false on timeout.
    async fn wait_for_log(&self, unit: &str, message: &str, timeout: Duration) -> Result<bool, HarnessError>;
}

/// The service unit a component runs as.
pub fn unit_name(component: &str) -> String {
    format!("ggl.{component}.service")
}

/// Read the `Active:` line of `systemctl status` output.
pub fn parse_systemctl_status(output: &str) -> ServiceState {
    let Some(active) = output
        .lines()
        .map(str::trim_start)
        .find_map(|line| line.strip_prefix("Active:"))
    else {
        return ServiceState::NotRunning;
    };

    let active = active.trim_start();
    if active.starts_with("active (running)") {
        ServiceState::Running
    } else if active.starts_with("failed") {
        ServiceState::Broken
    } else if active.starts_with("inactive (dead)") {
        ServiceState::Finished
    } else {
        ServiceState::NotRunning
    }
}

/// Probe backed by `systemctl` and `journalctl` on the local host.
#[derive(Debug, Clone)]
pub struct SystemdProbe {
    use_sudo: bool,
}

impl SystemdProbe {
    pub fn new(use_sudo: bool) -> Self {
        Self { use_sudo }
    }

    pub fn status_command(&self, component: &str) -> CommandLine {
        CommandLine::new("systemctl", self.use_sudo)
            .arg("status")
            .arg(unit_name(component))
    }

    pub fn follow_command(&self, unit: &str) -> CommandLine {
        CommandLine::new("journalctl", self.use_sudo).arg("-xeau").arg(unit).arg("-f")
    }
}

#[async_trait]
impl DeviceProbe for SystemdProbe {
    async fn service_state(&self, component: &str) -> Result<ServiceState, HarnessError> {
        // `systemctl status` exits non-zero for stopped units; the text still tells the state.
        let output = self.status_command(component).output().await?;
        let state = parse_systemctl_status(&String::from_utf8_lossy(&output.stdout));
        debug!(component, state = %state, "Service state");
        Ok(state)
    }

    async fn wait_for_log(&self, unit: &str, message: &str, timeout: Duration) -> Result<bool, HarnessError> {
        let command = self.follow_command(unit);
        let mut child = command
            .to_command()
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| HarnessError::Process {
                program: command.to_string(),
                source,
            })?;

        let Some(stdout) = child.stdout.take() else {
            return Ok(false);
        };
        let mut lines = BufReader::new(stdout).lines();

        let found = tokio::time::timeout(timeout, async {
            while let Ok(Some(line)) = lines.next_line().await {
                if line.contains(message) {
                    return true;
                }
            }
            false
        })
        .await
        .unwrap_or(false);

        if let Err(e) = child.kill().await {
            debug!(unit, error = %e, "journalctl already exited");
        }

        if found {
            info!(unit, message, "Log line observed");
        } else {
            warn!(unit, message, timeout_secs = timeout.as_secs(), "Log line not observed");
        }
        Ok(found)
    }
}

/// Poll `probe` until `component` is in `desired` state. Returns false on timeout.
pub async fn wait_for_service_state(
    probe: &dyn DeviceProbe,
    clock: &dyn Clock,
    component: &str,
    desired: ServiceState,
    timeout: Duration,
    interval: Duration,
) -> bool {
    let resource = unit_name(component);
    let result = poll_until(clock, timeout, interval, &resource, move || async move {
        match probe.service_state(component).await {
            Ok(state) if state == desired => Some(()),
            Ok(_) => None,
            Err(e) => {
                warn!(component, error = %e, "Service state probe failed");
                None
            }
        }
    })
    .await;
    result.is_ok()
}
