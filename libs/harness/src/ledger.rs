//! Resource Ledger: every cloud resource a test creates, and its teardown.
//!
//! Creation paths append to the ledger before they return success. Teardown
//! drains the ledger first and then deletes in dependency order:
//!
//! 1. Reset each deployment target with an empty deployment and let it settle
//! 2. Cancel and delete every deployment
//! 3. Delete every component version
//! 4. Delete every artifact object, batched per bucket
//! 5. Delete every thing group
//!
//! Each step runs even if an earlier one failed. Failures are logged and
//! collected in the [`TeardownReport`]; teardown itself never fails.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use tracing::{info, warn};
use uat_id::{BucketName, ComponentArn, DeploymentId, ObjectKey, TargetArn, ThingGroupName};

use crate::cloud::CloudClients;
use crate::poller::StatusPoller;
use crate::submitter::build_request;

/// Name of the empty deployments teardown submits to reset targets.
pub const RESET_DEPLOYMENT_NAME: &str = "uat-teardown-reset";

/// One resource recorded for deletion.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LedgerEntry {
    Component(ComponentArn),
    BlobObject { bucket: BucketName, key: ObjectKey },
    Deployment { id: DeploymentId, target: TargetArn },
    ThingGroup(ThingGroupName),
}

/// Accumulates created resources for a single test.
#[derive(Debug, Default)]
pub struct ResourceLedger {
    entries: Mutex<Vec<LedgerEntry>>,
}

impl ResourceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry. Returns false if it was already recorded.
    pub fn record(&self, entry: LedgerEntry) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if entries.contains(&entry) {
            return false;
        }
        entries.push(entry);
        true
    }

    pub fn record_component(&self, arn: ComponentArn) -> bool {
        self.record(LedgerEntry::Component(arn))
    }

    pub fn record_blob(&self, bucket: BucketName, key: ObjectKey) -> bool {
        self.record(LedgerEntry::BlobObject { bucket, key })
    }

    pub fn record_deployment(&self, id: DeploymentId, target: TargetArn) -> bool {
        self.record(LedgerEntry::Deployment { id, target })
    }

    pub fn record_thing_group(&self, group: ThingGroupName) -> bool {
        self.record(LedgerEntry::ThingGroup(group))
    }

    /// Snapshot of the recorded entries, in recording order.
    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn drain(&self) -> Vec<LedgerEntry> {
        std::mem::take(&mut *self.entries.lock().unwrap_or_else(|e| e.into_inner()))
    }

    /// Delete everything recorded so far, best-effort.
    ///
    /// `settle` bounds the wait for each target's reset deployment.
    pub async fn teardown(&self, clients: &CloudClients, poller: &StatusPoller, settle: Duration) -> TeardownReport {
        let entries = self.drain();
        let mut report = TeardownReport::default();
        if entries.is_empty() {
            return report;
        }

        let mut deployments = Vec::new();
        let mut targets = Vec::new();
        let mut components = Vec::new();
        let mut objects: BTreeMap<BucketName, Vec<ObjectKey>> = BTreeMap::new();
        let mut groups = Vec::new();

        for entry in entries {
            match entry {
                LedgerEntry::Deployment { id, target } => {
                    if !targets.contains(&target) {
                        targets.push(target);
                    }
                    deployments.push(id);
                }
                LedgerEntry::Component(arn) => components.push(arn),
                LedgerEntry::BlobObject { bucket, key } => objects.entry(bucket).or_default().push(key),
                LedgerEntry::ThingGroup(group) => groups.push(group),
            }
        }

        info!(
            deployments = deployments.len(),
            targets = targets.len(),
            components = components.len(),
            objects = objects.values().map(Vec::len).sum::<usize>(),
            thing_groups = groups.len(),
            "Tearing down test resources"
        );

        // Devices must drop test components before those components can go.
        for target in &targets {
            match reset_target(clients, poller, target, settle).await {
                Ok(id) => {
                    report.targets_reset += 1;
                    deployments.push(id);
                }
                Err(error) => report.fail(TeardownStep::ResetTargets, target.to_string(), error),
            }
        }

        // Cancel first: a live deployment cannot be deleted.
        for id in &deployments {
            if let Err(e) = clients.deployments.cancel_deployment(id).await {
                warn!(deployment_id = %id, error = %e, "Failed to cancel deployment");
            }
            match clients.deployments.delete_deployment(id).await {
                Ok(()) => report.deployments_deleted += 1,
                Err(e) => report.fail(TeardownStep::DeleteDeployments, id.to_string(), e.to_string()),
            }
        }

        for arn in &components {
            match clients.deployments.delete_component(arn).await {
                Ok(()) => report.components_deleted += 1,
                Err(e) => report.fail(TeardownStep::DeleteComponents, arn.to_string(), e.to_string()),
            }
        }

        let batch = clients.blobs.max_delete_batch().max(1);
        for (bucket, keys) in &objects {
            for chunk in keys.chunks(batch) {
                match clients.blobs.delete_objects(bucket, chunk).await {
                    Ok(()) => report.objects_deleted += chunk.len(),
                    Err(e) => report.fail(
                        TeardownStep::DeleteObjects,
                        format!("{bucket} ({} keys)", chunk.len()),
                        e.to_string(),
                    ),
                }
            }
        }

        for group in &groups {
            match clients.devices.delete_thing_group(group).await {
                Ok(()) => report.thing_groups_deleted += 1,
                Err(e) => report.fail(TeardownStep::DeleteThingGroups, group.to_string(), e.to_string()),
            }
        }

        info!(
            deployments_deleted = report.deployments_deleted,
            components_deleted = report.components_deleted,
            objects_deleted = report.objects_deleted,
            thing_groups_deleted = report.thing_groups_deleted,
            failures = report.failures.len(),
            "Teardown complete"
        );
        report
    }
}

/// Submit an empty deployment to `target` and wait for it to settle.
///
/// The reset deployment is deleted by the caller, never recorded.
async fn reset_target(
    clients: &CloudClients,
    poller: &StatusPoller,
    target: &TargetArn,
    settle: Duration,
) -> Result<DeploymentId, String> {
    let request = build_request(target, &[], RESET_DEPLOYMENT_NAME).map_err(|e| e.to_string())?;
    let id = clients
        .deployments
        .create_deployment(&request)
        .await
        .map_err(|e| e.to_string())?;

    let outcome = poller.wait_for_deployment(&id, settle).await;
    info!(target = %target, deployment_id = %id, outcome = %outcome, "Target reset");
    Ok(id)
}

/// Teardown step a failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TeardownStep {
    ResetTargets,
    DeleteDeployments,
    DeleteComponents,
    DeleteObjects,
    DeleteThingGroups,
}

impl fmt::Display for TeardownStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ResetTargets => "reset targets",
            Self::DeleteDeployments => "delete deployments",
            Self::DeleteComponents => "delete components",
            Self::DeleteObjects => "delete objects",
            Self::DeleteThingGroups => "delete thing groups",
        };
        f.write_str(s)
    }
}

/// A resource teardown could not remove.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeardownFailure {
    pub step: TeardownStep,
    pub resource: String,
    pub error: String,
}

/// What a teardown did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    pub targets_reset: usize,
    pub deployments_deleted: usize,
    pub components_deleted: usize,
    pub objects_deleted: usize,
    pub thing_groups_deleted: usize,
    pub failures: Vec<TeardownFailure>,
}

impl TeardownReport {
    /// Returns true if every recorded resource was removed.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Returns true if the teardown had nothing to do.
    pub fn is_noop(&self) -> bool {
        *self == Self::default()
    }

    fn fail(&mut self, step: TeardownStep, resource: String, error: String) {
        warn!(step = %step, resource = %resource, error = %error, "Teardown step failed");
        self.failures.push(TeardownFailure { step, resource, error });
    }
}
