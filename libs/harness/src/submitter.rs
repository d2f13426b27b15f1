//! Deployment Submitter: component tuples in, deployment id out.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uat_id::TargetArn;

use crate::cloud::{ComponentSpec, DeploymentRequest, DeploymentService};
use crate::error::HarnessError;
use crate::ledger::ResourceLedger;
use crate::model::{ComponentDeploymentInfo, DeploymentRecord};

/// Deployment name used when the caller does not pick one.
pub const DEFAULT_DEPLOYMENT_NAME: &str = "uat-deployment";

/// Build the wire request for a deployment.
///
/// Every entry must carry exactly one version. An empty component list is
/// valid: it removes everything previously deployed to the target.
pub fn build_request(
    target: &TargetArn,
    components: &[ComponentDeploymentInfo],
    name: &str,
) -> Result<DeploymentRequest, HarnessError> {
    let mut specs = BTreeMap::new();
    for component in components {
        let Some(version) = component.version() else {
            return Err(HarnessError::VersionCount {
                component: component.name.clone(),
                count: component.versions.len(),
            });
        };
        specs.insert(
            component.name.clone(),
            ComponentSpec {
                version: version.to_string(),
                merge: component.merge_config.as_ref().map(|m| m.to_wire()),
            },
        );
    }

    Ok(DeploymentRequest {
        target: target.clone(),
        name: name.to_string(),
        components: specs,
    })
}

/// Submits deployments and records them in the ledger.
pub struct DeploymentSubmitter {
    deployments: Arc<dyn DeploymentService>,
    ledger: Arc<ResourceLedger>,
    name: String,
}

impl DeploymentSubmitter {
    pub fn new(deployments: Arc<dyn DeploymentService>, ledger: Arc<ResourceLedger>) -> Self {
        Self {
            deployments,
            ledger,
            name: DEFAULT_DEPLOYMENT_NAME.to_string(),
        }
    }

    /// Use a different deployment name for every submission.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Submit a deployment of `components` to `target`.
    ///
    /// Nothing is sent if any entry is malformed.
    pub async fn submit(
        &self,
        target: &TargetArn,
        components: &[ComponentDeploymentInfo],
    ) -> Result<DeploymentRecord, HarnessError> {
        let request = build_request(target, components, &self.name)?;
        let id = self.deployments.create_deployment(&request).await?;
        self.ledger.record_deployment(id.clone(), target.clone());

        info!(
            deployment_id = %id,
            target = %target,
            components = request.components.len(),
            "Deployment submitted"
        );

        Ok(DeploymentRecord {
            id,
            target: target.clone(),
            components: components.to_vec(),
            created_at: Utc::now(),
        })
    }
}
