//! The per-test facade tying packager, submitter, poller and ledger together.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use uat_id::{DeploymentId, TargetArn};
use uat_wait::Clock;

use crate::cloud::{collect_pages, CloudClients};
use crate::config::HarnessConfig;
use crate::error::HarnessError;
use crate::groups::ThingGroups;
use crate::ledger::{ResourceLedger, TeardownReport};
use crate::model::{ComponentDeploymentInfo, DeploymentOutcome, DeploymentRecord, MergeConfig};
use crate::packager::{Packager, PackagerSettings};
use crate::poller::StatusPoller;
use crate::submitter::DeploymentSubmitter;

/// One test's view of the cloud. Call [`TestHarness::teardown`] when the test ends.
pub struct TestHarness {
    config: HarnessConfig,
    clients: CloudClients,
    clock: Arc<dyn Clock>,
    ledger: Arc<ResourceLedger>,
    packager: Packager,
    submitter: DeploymentSubmitter,
    poller: StatusPoller,
    groups: ThingGroups,
}

impl TestHarness {
    pub fn new(config: HarnessConfig, clients: CloudClients, clock: Arc<dyn Clock>) -> Result<Self, HarnessError> {
        let ledger = Arc::new(ResourceLedger::new());
        let packager = Packager::new(
            PackagerSettings::from_config(&config)?,
            clients.deployments.clone(),
            clients.blobs.clone(),
            ledger.clone(),
            clock.clone(),
        );
        let submitter = DeploymentSubmitter::new(clients.deployments.clone(), ledger.clone());
        let poller = StatusPoller::new(&clients, clock.clone(), config.timeouts.poll_interval());
        let groups = ThingGroups::new(
            clients.devices.clone(),
            ledger.clone(),
            clock.clone(),
            config.timeouts.membership(),
        );

        Ok(Self {
            config,
            clients,
            clock,
            ledger,
            packager,
            submitter,
            poller,
            groups,
        })
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn clients(&self) -> &CloudClients {
        &self.clients
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn ledger(&self) -> &ResourceLedger {
        &self.ledger
    }

    pub fn packager(&self) -> &Packager {
        &self.packager
    }

    pub fn submitter(&self) -> &DeploymentSubmitter {
        &self.submitter
    }

    pub fn poller(&self) -> &StatusPoller {
        &self.poller
    }

    pub fn groups(&self) -> &ThingGroups {
        &self.groups
    }

    pub async fn deploy(
        &self,
        target: &TargetArn,
        components: &[ComponentDeploymentInfo],
    ) -> Result<DeploymentRecord, HarnessError> {
        self.submitter.submit(target, components).await
    }

    /// Wait with the configured deployment budget.
    pub async fn wait_for_deployment(&self, id: &DeploymentId) -> DeploymentOutcome {
        self.poller
            .wait_for_deployment(id, self.config.timeouts.deployment())
            .await
    }

    pub async fn deploy_and_wait(
        &self,
        target: &TargetArn,
        components: &[ComponentDeploymentInfo],
    ) -> Result<(DeploymentRecord, DeploymentOutcome), HarnessError> {
        let record = self.deploy(target, components).await?;
        let outcome = self.wait_for_deployment(&record.id).await;
        Ok((record, outcome))
    }

    /// Redeploy `deployment` to `target` without `component` and wait for the result.
    pub async fn remove_component(
        &self,
        deployment: &DeploymentId,
        component: &str,
        target: &TargetArn,
        timeout: Duration,
    ) -> Result<DeploymentOutcome, HarnessError> {
        let mut components = self.clients.deployments.get_deployment(deployment).await?.components;
        if components.remove(component).is_none() {
            return Err(HarnessError::ComponentNotInDeployment {
                component: component.to_string(),
                deployment: deployment.to_string(),
            });
        }

        let remaining: Vec<ComponentDeploymentInfo> = components
            .into_iter()
            .map(|(name, spec)| ComponentDeploymentInfo {
                name,
                versions: vec![spec.version],
                merge_config: spec.merge.map(MergeConfig::Raw),
            })
            .collect();

        info!(deployment_id = %deployment, component, remaining = remaining.len(), "Removing component");
        let record = self.submitter.submit(target, &remaining).await?;
        Ok(self.poller.wait_for_deployment(&record.id, timeout).await)
    }

    /// Deploy nothing to `target`, removing every component from its devices.
    pub async fn remove_all_components(
        &self,
        target: &TargetArn,
        timeout: Duration,
    ) -> Result<DeploymentOutcome, HarnessError> {
        let record = self.submitter.submit(target, &[]).await?;
        Ok(self.poller.wait_for_deployment(&record.id, timeout).await)
    }

    /// Delete every object under `prefix` in the artifact bucket, recorded or not.
    ///
    /// Clears artifacts left behind by runs that never reached teardown.
    pub async fn sweep_artifacts(&self, prefix: &str) -> Result<usize, HarnessError> {
        let bucket = self.config.bucket_name()?;
        let blobs = self.clients.blobs.clone();
        let keys = collect_pages("list_objects", |token| {
            let blobs = blobs.clone();
            let bucket = bucket.clone();
            async move { blobs.list_objects(&bucket, prefix, token).await }
        })
        .await?;

        let batch = blobs.max_delete_batch().max(1);
        for chunk in keys.chunks(batch) {
            blobs.delete_objects(&bucket, chunk).await?;
        }

        info!(bucket = %bucket, prefix, objects = keys.len(), "Swept artifacts");
        Ok(keys.len())
    }

    /// Delete everything this harness created. Safe to call more than once.
    pub async fn teardown(&self) -> TeardownReport {
        self.ledger
            .teardown(&self.clients, &self.poller, self.config.timeouts.cleanup_settle())
            .await
    }
}
