//! Status Poller: drives a deployment wait to a local verdict.
//!
//! The deployment service reports per-device outcomes only through each
//! device's effective-deployment history, so every poll resolves the
//! target to its current members and pages through their histories until
//! the entry for the deployment turns up.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use uat_id::{DeploymentId, TargetArn, TargetKind, ThingGroupName, ThingName};
use uat_wait::{poll_until, Budget, Clock};

use crate::cloud::{collect_pages, CloudClients, DeploymentService, DeviceDirectory, MAX_PAGES};
use crate::error::{CloudError, HarnessError};
use crate::model::{CoreDeviceHealth, DeploymentOutcome, DeviceExecutionStatus};

pub struct StatusPoller {
    deployments: Arc<dyn DeploymentService>,
    devices: Arc<dyn DeviceDirectory>,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl StatusPoller {
    pub fn new(clients: &CloudClients, clock: Arc<dyn Clock>, interval: Duration) -> Self {
        Self {
            deployments: clients.deployments.clone(),
            devices: clients.devices.clone(),
            clock,
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait until a device reports `SUCCEEDED` or `FAILED` for `id`, or `timeout` passes.
    ///
    /// Remote errors during a poll are logged and the next poll proceeds.
    /// A target without members never yields a terminal status and times out.
    pub async fn wait_for_deployment(&self, id: &DeploymentId, timeout: Duration) -> DeploymentOutcome {
        let budget = Budget::start(self.clock.as_ref(), timeout);
        let mut iteration = 0u32;

        while !budget.is_exhausted() {
            iteration += 1;
            match self.poll_once(id).await {
                Ok(Some(outcome)) => {
                    info!(
                        deployment_id = %id,
                        outcome = %outcome,
                        iteration,
                        elapsed_ms = budget.elapsed().as_millis() as u64,
                        "Deployment reached terminal state"
                    );
                    return outcome;
                }
                Ok(None) => debug!(deployment_id = %id, iteration, "Deployment not terminal yet"),
                Err(e) => warn!(deployment_id = %id, iteration, error = %e, "Deployment status poll failed"),
            }
            budget.sleep(self.interval).await;
        }

        warn!(
            deployment_id = %id,
            timeout_secs = timeout.as_secs(),
            iterations = iteration,
            "Deployment did not reach a terminal state in time"
        );
        DeploymentOutcome::Timeout
    }

    async fn poll_once(&self, id: &DeploymentId) -> Result<Option<DeploymentOutcome>, CloudError> {
        let deployment = self.deployments.get_deployment(id).await?;
        let members = self.resolve_members(&deployment.target).await?;

        for thing in &members {
            let Some(status) = self.device_status(thing, id).await? else {
                continue;
            };
            debug!(deployment_id = %id, thing = %thing, status = %status, "Device execution status");
            if let Some(outcome) = status.outcome() {
                return Ok(Some(outcome));
            }
        }
        Ok(None)
    }

    /// Devices a target currently resolves to: the thing itself, or every member of the group.
    pub async fn resolve_members(&self, target: &TargetArn) -> Result<Vec<ThingName>, CloudError> {
        match target.kind() {
            TargetKind::Thing => {
                let thing = ThingName::new(target.name()).map_err(|e| CloudError::Validation(e.to_string()))?;
                Ok(vec![thing])
            }
            TargetKind::ThingGroup => {
                let group =
                    ThingGroupName::new(target.name()).map_err(|e| CloudError::Validation(e.to_string()))?;
                self.group_members(&group).await
            }
        }
    }

    async fn group_members(&self, group: &ThingGroupName) -> Result<Vec<ThingName>, CloudError> {
        let devices = self.devices.clone();
        collect_pages("list_members", |token| {
            let devices = devices.clone();
            let group = group.clone();
            async move { devices.list_members(&group, token).await }
        })
        .await
    }

    /// Page through a device's history until the entry for `id` is found.
    async fn device_status(
        &self,
        thing: &ThingName,
        id: &DeploymentId,
    ) -> Result<Option<DeviceExecutionStatus>, CloudError> {
        let mut token = None;
        for _ in 0..MAX_PAGES {
            let page = self.deployments.list_effective_deployments(thing, token).await?;
            if let Some(entry) = page.items.into_iter().find(|e| &e.deployment_id == id) {
                return Ok(Some(entry.status));
            }
            match page.next_token {
                Some(next) => token = Some(next),
                None => return Ok(None),
            }
        }
        Ok(None)
    }

    /// Wait for the single device of `group` to report `desired` health.
    ///
    /// Returns false if the budget runs out first.
    pub async fn wait_for_device_health(
        &self,
        group: &ThingGroupName,
        desired: CoreDeviceHealth,
        timeout: Duration,
    ) -> Result<bool, HarnessError> {
        let members = self.group_members(group).await?;
        let [thing] = members.as_slice() else {
            return Err(HarnessError::InvalidConfig(format!(
                "thing group {group} has {} members, expected exactly one",
                members.len()
            )));
        };

        let resource = format!("health of {thing}");
        let deployments = self.deployments.as_ref();
        let result = poll_until(self.clock.as_ref(), timeout, self.interval, &resource, move || async move {
            match deployments.get_core_device_health(thing).await {
                Ok(Some(health)) if health == desired => Some(()),
                Ok(_) => None,
                Err(e) => {
                    warn!(thing = %thing, error = %e, "Device health poll failed");
                    None
                }
            }
        })
        .await;

        match result {
            Ok(()) => {
                info!(thing = %thing, health = ?desired, "Device reached desired health");
                Ok(true)
            }
            Err(e) => {
                warn!(thing = %thing, error = %e, "Device did not reach desired health");
                Ok(false)
            }
        }
    }
}
