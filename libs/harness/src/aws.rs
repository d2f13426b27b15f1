//! Capability implementations over the AWS SDK.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_greengrassv2::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_greengrassv2::primitives::{Blob, DateTime as SdkDateTime};
use aws_sdk_greengrassv2::types::{ComponentConfigurationUpdate, ComponentDeploymentSpecification};
use aws_sdk_s3::config::Region;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{Delete, ObjectIdentifier};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::debug;
use uat_id::{BucketName, ComponentArn, DeploymentId, ObjectKey, TargetArn, ThingGroupName, ThingName};

use crate::cloud::{
    BlobStore, ComponentSpec, DeploymentDescription, DeploymentRequest, DeploymentService, DeviceDirectory,
    EffectiveDeployment, Page, RegisteredComponent,
};
use crate::config::HarnessConfig;
use crate::error::{CloudError, HarnessError};
use crate::model::{ComponentState, CoreDeviceHealth, DeploymentStatus, DeviceExecutionStatus};

/// Greengrass, IoT and S3 clients sharing one SDK configuration.
#[derive(Clone)]
pub struct AwsCloud {
    greengrass: aws_sdk_greengrassv2::Client,
    iot: aws_sdk_iot::Client,
    s3: aws_sdk_s3::Client,
    region: String,
    account: String,
}

impl AwsCloud {
    /// Build clients for the configured region using the default credential chain.
    pub async fn connect(config: &HarnessConfig) -> Result<Self, HarnessError> {
        config.validate()?;

        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .load()
            .await;

        Ok(Self {
            greengrass: aws_sdk_greengrassv2::Client::new(&shared),
            iot: aws_sdk_iot::Client::new(&shared),
            s3: aws_sdk_s3::Client::new(&shared),
            region: config.region.clone(),
            account: config.account.clone(),
        })
    }
}

impl std::fmt::Debug for AwsCloud {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsCloud")
            .field("region", &self.region)
            .field("account", &self.account)
            .finish_non_exhaustive()
    }
}

/// Map an SDK error onto the harness error classes.
fn classify<E>(operation: &str, err: E) -> CloudError
where
    E: ProvideErrorMetadata + std::error::Error,
{
    let message = err
        .message()
        .map(str::to_string)
        .unwrap_or_else(|| DisplayErrorContext(&err).to_string());

    match err.code() {
        Some("ConflictException") => CloudError::Conflict(message),
        Some("ResourceNotFoundException" | "NoSuchKey" | "NoSuchBucket") => CloudError::NotFound(message),
        Some("ValidationException") if mentions_artifacts(&message) => CloudError::ArtifactsNotAccessible(message),
        Some("ValidationException") => CloudError::Validation(message),
        _ => CloudError::service(operation, message),
    }
}

// The service reports unreadable artifacts as a plain validation error.
fn mentions_artifacts(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("artifact") && (message.contains("access") || message.contains("not found"))
}

fn to_chrono(timestamp: &SdkDateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(timestamp.secs(), timestamp.subsec_nanos())
}

fn recipe_identity(recipe: &[u8]) -> (String, String) {
    let document: serde_json::Value = serde_json::from_slice(recipe).unwrap_or_default();
    let field = |name: &str| {
        document
            .get(name)
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    (field("ComponentName"), field("ComponentVersion"))
}

#[async_trait]
impl DeploymentService for AwsCloud {
    async fn create_component_version(&self, recipe: &[u8]) -> Result<RegisteredComponent, CloudError> {
        let output = self
            .greengrass
            .create_component_version()
            .inline_recipe(Blob::new(recipe.to_vec()))
            .send()
            .await
            .map_err(|e| classify("create_component_version", e))?;

        let arn = output
            .arn()
            .ok_or_else(|| CloudError::service("create_component_version", "response carried no ARN"))?;
        let arn = ComponentArn::new(arn).map_err(|e| CloudError::Validation(e.to_string()))?;
        let (name, version) = recipe_identity(recipe);

        Ok(RegisteredComponent { arn, name, version })
    }

    async fn describe_component(&self, arn: &ComponentArn) -> Result<ComponentState, CloudError> {
        let output = self
            .greengrass
            .describe_component()
            .arn(arn.as_str())
            .send()
            .await
            .map_err(|e| classify("describe_component", e))?;

        let state = output
            .status()
            .and_then(|s| s.component_state())
            .map(|s| ComponentState::from_wire(s.as_str()))
            .unwrap_or_else(|| ComponentState::Unknown(String::new()));
        Ok(state)
    }

    async fn create_deployment(&self, request: &DeploymentRequest) -> Result<DeploymentId, CloudError> {
        let mut components = HashMap::new();
        for (name, spec) in &request.components {
            let update = spec
                .merge
                .as_ref()
                .map(|merge| ComponentConfigurationUpdate::builder().merge(merge).build());
            let specification = ComponentDeploymentSpecification::builder()
                .component_version(&spec.version)
                .set_configuration_update(update)
                .build()
                .map_err(|e| CloudError::Validation(e.to_string()))?;
            components.insert(name.clone(), specification);
        }

        let output = self
            .greengrass
            .create_deployment()
            .target_arn(request.target.to_string())
            .deployment_name(&request.name)
            .set_components(Some(components))
            .send()
            .await
            .map_err(|e| classify("create_deployment", e))?;

        let id = output
            .deployment_id()
            .ok_or_else(|| CloudError::service("create_deployment", "response carried no deployment id"))?;
        DeploymentId::new(id).map_err(|e| CloudError::Validation(e.to_string()))
    }

    async fn get_deployment(&self, id: &DeploymentId) -> Result<DeploymentDescription, CloudError> {
        let output = self
            .greengrass
            .get_deployment()
            .deployment_id(id.as_str())
            .send()
            .await
            .map_err(|e| classify("get_deployment", e))?;

        let target = output
            .target_arn()
            .ok_or_else(|| CloudError::service("get_deployment", "response carried no target ARN"))?;
        let target = TargetArn::parse(target).map_err(|e| CloudError::Validation(e.to_string()))?;

        let components = output
            .components()
            .map(|components| {
                components
                    .iter()
                    .map(|(name, spec)| (name.clone(), component_spec(spec)))
                    .collect()
            })
            .unwrap_or_default();

        Ok(DeploymentDescription {
            id: id.clone(),
            status: output
                .deployment_status()
                .map(|s| DeploymentStatus::from_wire(s.as_str()))
                .unwrap_or_else(|| DeploymentStatus::Unknown(String::new())),
            target,
            created_at: output.creation_timestamp().and_then(to_chrono),
            components,
        })
    }

    async fn list_effective_deployments(
        &self,
        thing: &ThingName,
        next_token: Option<String>,
    ) -> Result<Page<EffectiveDeployment>, CloudError> {
        let output = self
            .greengrass
            .list_effective_deployments()
            .core_device_thing_name(thing.as_str())
            .set_next_token(next_token)
            .send()
            .await
            .map_err(|e| classify("list_effective_deployments", e))?;

        let items = output
            .effective_deployments()
            .iter()
            .filter_map(|entry| {
                let deployment_id = DeploymentId::new(entry.deployment_id()).ok()?;
                Some(EffectiveDeployment {
                    deployment_id,
                    status: DeviceExecutionStatus::from_wire(entry.core_device_execution_status().as_str()),
                })
            })
            .collect();

        Ok(Page {
            items,
            next_token: output.next_token().map(str::to_string),
        })
    }

    async fn cancel_deployment(&self, id: &DeploymentId) -> Result<(), CloudError> {
        self.greengrass
            .cancel_deployment()
            .deployment_id(id.as_str())
            .send()
            .await
            .map_err(|e| classify("cancel_deployment", e))?;
        Ok(())
    }

    async fn delete_deployment(&self, id: &DeploymentId) -> Result<(), CloudError> {
        self.greengrass
            .delete_deployment()
            .deployment_id(id.as_str())
            .send()
            .await
            .map_err(|e| classify("delete_deployment", e))?;
        Ok(())
    }

    async fn delete_component(&self, arn: &ComponentArn) -> Result<(), CloudError> {
        self.greengrass
            .delete_component()
            .arn(arn.as_str())
            .send()
            .await
            .map_err(|e| classify("delete_component", e))?;
        Ok(())
    }

    async fn get_core_device_health(&self, thing: &ThingName) -> Result<Option<CoreDeviceHealth>, CloudError> {
        let output = self
            .greengrass
            .get_core_device()
            .core_device_thing_name(thing.as_str())
            .send()
            .await
            .map_err(|e| classify("get_core_device", e))?;

        Ok(output.status().and_then(|s| CoreDeviceHealth::from_wire(s.as_str())))
    }
}

#[async_trait]
impl BlobStore for AwsCloud {
    async fn put_object(&self, bucket: &BucketName, key: &ObjectKey, body: Bytes) -> Result<(), CloudError> {
        self.s3
            .put_object()
            .bucket(bucket.as_str())
            .key(key.as_str())
            .body(ByteStream::from(body.to_vec()))
            .send()
            .await
            .map_err(|e| classify("put_object", e))?;
        Ok(())
    }

    async fn list_objects(
        &self,
        bucket: &BucketName,
        prefix: &str,
        next_token: Option<String>,
    ) -> Result<Page<ObjectKey>, CloudError> {
        let output = self
            .s3
            .list_objects_v2()
            .bucket(bucket.as_str())
            .prefix(prefix)
            .set_continuation_token(next_token)
            .send()
            .await
            .map_err(|e| classify("list_objects", e))?;

        let items = output
            .contents()
            .iter()
            .filter_map(|object| object.key())
            .filter_map(|key| ObjectKey::new(key).ok())
            .collect();

        Ok(Page {
            items,
            next_token: output.next_continuation_token().map(str::to_string),
        })
    }

    async fn delete_objects(&self, bucket: &BucketName, keys: &[ObjectKey]) -> Result<(), CloudError> {
        if keys.is_empty() {
            return Ok(());
        }

        let objects = keys
            .iter()
            .map(|key| ObjectIdentifier::builder().key(key.as_str()).build())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| CloudError::Validation(e.to_string()))?;
        let delete = Delete::builder()
            .set_objects(Some(objects))
            .quiet(true)
            .build()
            .map_err(|e| CloudError::Validation(e.to_string()))?;

        let output = self
            .s3
            .delete_objects()
            .bucket(bucket.as_str())
            .delete(delete)
            .send()
            .await
            .map_err(|e| classify("delete_objects", e))?;

        let errors = output.errors();
        if let Some(first) = errors.first() {
            return Err(CloudError::service(
                "delete_objects",
                format!(
                    "{} of {} objects not deleted, first: {} ({})",
                    errors.len(),
                    keys.len(),
                    first.key().unwrap_or_default(),
                    first.message().unwrap_or_default()
                ),
            ));
        }
        debug!(bucket = %bucket, keys = keys.len(), "Objects deleted");
        Ok(())
    }
}

#[async_trait]
impl DeviceDirectory for AwsCloud {
    async fn list_members(
        &self,
        group: &ThingGroupName,
        next_token: Option<String>,
    ) -> Result<Page<ThingName>, CloudError> {
        let output = self
            .iot
            .list_things_in_thing_group()
            .thing_group_name(group.as_str())
            .set_next_token(next_token)
            .send()
            .await
            .map_err(|e| classify("list_things_in_thing_group", e))?;

        let items = output
            .things()
            .iter()
            .filter_map(|thing| ThingName::new(thing.as_str()).ok())
            .collect();

        Ok(Page {
            items,
            next_token: output.next_token().map(str::to_string),
        })
    }

    async fn create_thing_group(&self, group: &ThingGroupName) -> Result<TargetArn, CloudError> {
        self.iot
            .create_thing_group()
            .thing_group_name(group.as_str())
            .send()
            .await
            .map_err(|e| classify("create_thing_group", e))?;
        Ok(TargetArn::thing_group(&self.region, &self.account, group))
    }

    async fn add_thing_to_thing_group(&self, thing: &ThingName, group: &ThingGroupName) -> Result<(), CloudError> {
        self.iot
            .add_thing_to_thing_group()
            .thing_name(thing.as_str())
            .thing_group_name(group.as_str())
            .send()
            .await
            .map_err(|e| classify("add_thing_to_thing_group", e))?;
        Ok(())
    }

    async fn delete_thing_group(&self, group: &ThingGroupName) -> Result<(), CloudError> {
        self.iot
            .delete_thing_group()
            .thing_group_name(group.as_str())
            .send()
            .await
            .map_err(|e| classify("delete_thing_group", e))?;
        Ok(())
    }
}

fn component_spec(spec: &ComponentDeploymentSpecification) -> ComponentSpec {
    ComponentSpec {
        version: spec.component_version().to_string(),
        merge: spec
            .configuration_update()
            .and_then(|u| u.merge())
            .map(str::to_string),
    }
}
