//! Capability traits for the remote side of a test run.
//!
//! The core never talks to a provider SDK directly. It is handed a
//! [`CloudClients`] bundle of narrow traits, implemented by
//! [`crate::aws::AwsCloud`] in real runs and by [`crate::fake::InMemoryCloud`]
//! in tests.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use uat_id::{BucketName, ComponentArn, DeploymentId, ObjectKey, TargetArn, ThingGroupName, ThingName};

use crate::error::CloudError;
use crate::model::{ComponentState, CoreDeviceHealth, DeploymentStatus, DeviceExecutionStatus};

/// One page of a paginated listing.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Token for the next page, `None` on the last page.
    pub next_token: Option<String>,
}

impl<T> Page<T> {
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_token: None,
        }
    }
}

/// A component version accepted by the deployment service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredComponent {
    pub arn: ComponentArn,
    pub name: String,
    pub version: String,
}

/// Version and configuration update for one component in a deployment request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentSpec {
    pub version: String,
    /// JSON document merged into the component configuration.
    pub merge: Option<String>,
}

/// A deployment request as sent on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentRequest {
    pub target: TargetArn,
    pub name: String,
    pub components: BTreeMap<String, ComponentSpec>,
}

/// A deployment as reported by the deployment service.
#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentDescription {
    pub id: DeploymentId,
    pub status: DeploymentStatus,
    pub target: TargetArn,
    pub created_at: Option<DateTime<Utc>>,
    pub components: BTreeMap<String, ComponentSpec>,
}

/// One entry of a device's effective-deployment history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveDeployment {
    pub deployment_id: DeploymentId,
    pub status: DeviceExecutionStatus,
}

/// Component registry and deployment scheduler.
#[async_trait]
pub trait DeploymentService: Send + Sync {
    /// Register a component version from a rendered recipe document.
    async fn create_component_version(&self, recipe: &[u8]) -> Result<RegisteredComponent, CloudError>;

    /// Current registration state of a component version.
    async fn describe_component(&self, arn: &ComponentArn) -> Result<ComponentState, CloudError>;

    async fn create_deployment(&self, request: &DeploymentRequest) -> Result<DeploymentId, CloudError>;

    async fn get_deployment(&self, id: &DeploymentId) -> Result<DeploymentDescription, CloudError>;

    /// One page of the deployments a device has received, newest first.
    async fn list_effective_deployments(
        &self,
        thing: &ThingName,
        next_token: Option<String>,
    ) -> Result<Page<EffectiveDeployment>, CloudError>;

    async fn cancel_deployment(&self, id: &DeploymentId) -> Result<(), CloudError>;

    async fn delete_deployment(&self, id: &DeploymentId) -> Result<(), CloudError>;

    async fn delete_component(&self, arn: &ComponentArn) -> Result<(), CloudError>;

    /// Health last reported by a core device, `None` if it never reported.
    async fn get_core_device_health(
        &self,
        thing: &ThingName,
    ) -> Result<Option<CoreDeviceHealth>, CloudError>;
}

/// Object storage holding component artifacts.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put_object(&self, bucket: &BucketName, key: &ObjectKey, body: Bytes) -> Result<(), CloudError>;

    async fn list_objects(
        &self,
        bucket: &BucketName,
        prefix: &str,
        next_token: Option<String>,
    ) -> Result<Page<ObjectKey>, CloudError>;

    /// Delete a batch of objects. Callers keep batches within [`BlobStore::max_delete_batch`].
    async fn delete_objects(&self, bucket: &BucketName, keys: &[ObjectKey]) -> Result<(), CloudError>;

    /// Largest batch `delete_objects` accepts.
    fn max_delete_batch(&self) -> usize {
        1000
    }
}

/// Device identity service: things and thing groups.
#[async_trait]
pub trait DeviceDirectory: Send + Sync {
    async fn list_members(
        &self,
        group: &ThingGroupName,
        next_token: Option<String>,
    ) -> Result<Page<ThingName>, CloudError>;

    /// Create a thing group and return its ARN.
    async fn create_thing_group(&self, group: &ThingGroupName) -> Result<TargetArn, CloudError>;

    async fn add_thing_to_thing_group(&self, thing: &ThingName, group: &ThingGroupName) -> Result<(), CloudError>;

    async fn delete_thing_group(&self, group: &ThingGroupName) -> Result<(), CloudError>;
}

/// The capability bundle handed to the harness.
#[derive(Clone)]
pub struct CloudClients {
    pub deployments: Arc<dyn DeploymentService>,
    pub blobs: Arc<dyn BlobStore>,
    pub devices: Arc<dyn DeviceDirectory>,
}

impl CloudClients {
    pub fn new(
        deployments: Arc<dyn DeploymentService>,
        blobs: Arc<dyn BlobStore>,
        devices: Arc<dyn DeviceDirectory>,
    ) -> Self {
        Self {
            deployments,
            blobs,
            devices,
        }
    }

    /// Bundle one backend implementing all three capabilities.
    pub fn from_single<C>(cloud: Arc<C>) -> Self
    where
        C: DeploymentService + BlobStore + DeviceDirectory + 'static,
    {
        Self {
            deployments: cloud.clone(),
            blobs: cloud.clone(),
            devices: cloud,
        }
    }
}

impl std::fmt::Debug for CloudClients {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudClients").finish_non_exhaustive()
    }
}

/// Upper bound on pages read by [`collect_pages`].
pub const MAX_PAGES: usize = 10_000;

/// Follow `next_token` until the last page, concatenating items.
pub async fn collect_pages<T, F, Fut>(operation: &str, mut fetch: F) -> Result<Vec<T>, CloudError>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<T>, CloudError>>,
{
    let mut items = Vec::new();
    let mut token = None;

    for _ in 0..MAX_PAGES {
        let page = fetch(token.take()).await?;
        items.extend(page.items);
        match page.next_token {
            Some(next) => token = Some(next),
            None => return Ok(items),
        }
    }

    Err(CloudError::service(
        operation,
        format!("pagination did not end after {MAX_PAGES} pages"),
    ))
}
