//! In-memory cloud for tests.
//!
//! [`InMemoryCloud`] implements all three capability traits over one shared
//! state. Device behaviour is scripted with a [`Rollout`] per thing: the
//! status a device reports for a deployment is a function of how many times
//! that deployment has been fetched with `get_deployment`, so a poller
//! driven by a `ManualClock` sees a deterministic sequence.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use serde_json::Value;
use uat_id::{BucketName, ComponentArn, DeploymentId, ObjectKey, TargetArn, TargetKind, ThingGroupName, ThingName};

use crate::cloud::{
    BlobStore, DeploymentDescription, DeploymentRequest, DeploymentService, DeviceDirectory, EffectiveDeployment,
    Page, RegisteredComponent,
};
use crate::error::CloudError;
use crate::model::{ComponentState, CoreDeviceHealth, DeploymentStatus, DeviceExecutionStatus};

pub const DEFAULT_REGION: &str = "us-west-2";
pub const DEFAULT_ACCOUNT: &str = "123456789012";

/// Scripted device-reported statuses for a deployment, indexed by poll tick.
///
/// Tick `n` is the `n`-th `get_deployment` call for the deployment. Before
/// the first step the device has no entry for the deployment at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rollout {
    steps: Vec<(u32, DeviceExecutionStatus)>,
}

impl Rollout {
    /// Steps must be ordered by tick.
    pub fn new(steps: Vec<(u32, DeviceExecutionStatus)>) -> Self {
        Self { steps }
    }

    /// In progress from the first tick, `SUCCEEDED` from `tick` on.
    pub fn succeed_at(tick: u32) -> Self {
        Self::ending_at(tick, DeviceExecutionStatus::Succeeded)
    }

    /// In progress from the first tick, `FAILED` from `tick` on.
    pub fn fail_at(tick: u32) -> Self {
        Self::ending_at(tick, DeviceExecutionStatus::Failed)
    }

    /// In progress forever.
    pub fn never() -> Self {
        Self::new(vec![(1, DeviceExecutionStatus::InProgress)])
    }

    fn ending_at(tick: u32, status: DeviceExecutionStatus) -> Self {
        if tick <= 1 {
            Self::new(vec![(1, status)])
        } else {
            Self::new(vec![(1, DeviceExecutionStatus::InProgress), (tick, status)])
        }
    }

    /// Status at `tick`, if the device has an entry yet.
    pub fn status_at(&self, tick: u32) -> Option<DeviceExecutionStatus> {
        self.steps
            .iter()
            .take_while(|(at, _)| *at <= tick)
            .last()
            .map(|(_, status)| status.clone())
    }
}

#[derive(Debug, Clone)]
struct StoredComponent {
    arn: ComponentArn,
    name: String,
    version: String,
    recipe: Value,
    describes: u32,
}

#[derive(Debug, Clone)]
struct StoredDeployment {
    description: DeploymentDescription,
    polls: u32,
}

#[derive(Debug, Clone)]
struct Member {
    thing: ThingName,
    hidden_for: u32,
}

#[derive(Debug)]
struct State {
    region: String,
    account: String,
    components: Vec<StoredComponent>,
    objects: BTreeMap<(String, String), Bytes>,
    deployments: Vec<StoredDeployment>,
    deployment_seq: u64,
    groups: BTreeMap<String, Vec<Member>>,
    rollouts: HashMap<String, Rollout>,
    default_rollout: Rollout,
    history: HashMap<String, usize>,
    health: HashMap<String, CoreDeviceHealth>,
    page_size: usize,
    max_delete_batch: usize,
    inaccessible_registrations: u32,
    ready_after: u32,
    membership_lag: u32,
    failures: HashMap<String, (usize, CloudError)>,
    calls: HashMap<String, usize>,
    delete_batches: Vec<usize>,
}

impl State {
    fn new() -> Self {
        Self {
            region: DEFAULT_REGION.to_string(),
            account: DEFAULT_ACCOUNT.to_string(),
            components: Vec::new(),
            objects: BTreeMap::new(),
            deployments: Vec::new(),
            deployment_seq: 0,
            groups: BTreeMap::new(),
            rollouts: HashMap::new(),
            default_rollout: Rollout::succeed_at(1),
            history: HashMap::new(),
            health: HashMap::new(),
            page_size: 50,
            max_delete_batch: 1000,
            inaccessible_registrations: 0,
            ready_after: 1,
            membership_lag: 0,
            failures: HashMap::new(),
            calls: HashMap::new(),
            delete_batches: Vec::new(),
        }
    }

    fn deployment(&self, id: &DeploymentId) -> Result<&StoredDeployment, CloudError> {
        self.deployments
            .iter()
            .find(|d| &d.description.id == id)
            .ok_or_else(|| CloudError::NotFound(format!("deployment {id}")))
    }

    fn deployment_mut(&mut self, id: &DeploymentId) -> Result<&mut StoredDeployment, CloudError> {
        self.deployments
            .iter_mut()
            .find(|d| &d.description.id == id)
            .ok_or_else(|| CloudError::NotFound(format!("deployment {id}")))
    }

    fn is_member(&self, thing: &ThingName, group: &str) -> bool {
        self.groups
            .get(group)
            .is_some_and(|members| members.iter().any(|m| &m.thing == thing))
    }

    fn targets_thing(&self, target: &TargetArn, thing: &ThingName) -> bool {
        match target.kind() {
            TargetKind::Thing => target.name() == thing.as_str(),
            TargetKind::ThingGroup => self.is_member(thing, target.name()),
        }
    }

    fn effective_deployments(&self, thing: &ThingName) -> Vec<EffectiveDeployment> {
        let rollout = self.rollouts.get(thing.as_str()).unwrap_or(&self.default_rollout);

        let padding = self.history.get(thing.as_str()).copied().unwrap_or(0);
        let mut entries: Vec<EffectiveDeployment> = (0..padding)
            .filter_map(|n| DeploymentId::new(format!("history-{n:04}")).ok())
            .map(|deployment_id| EffectiveDeployment {
                deployment_id,
                status: DeviceExecutionStatus::Succeeded,
            })
            .collect();

        for stored in self.deployments.iter().rev() {
            if !self.targets_thing(&stored.description.target, thing) {
                continue;
            }
            let status = if stored.description.status == DeploymentStatus::Canceled {
                Some(DeviceExecutionStatus::Canceled)
            } else {
                rollout.status_at(stored.polls)
            };
            if let Some(status) = status {
                entries.push(EffectiveDeployment {
                    deployment_id: stored.description.id.clone(),
                    status,
                });
            }
        }
        entries
    }

    fn artifact_uri_missing(&self, recipe: &Value) -> Option<String> {
        let manifests = recipe.get("Manifests")?.as_array()?;
        manifests
            .iter()
            .filter_map(|m| m.get("Artifacts").and_then(Value::as_array))
            .flatten()
            .filter_map(|a| a.get("URI").and_then(Value::as_str))
            .filter_map(|uri| uri.strip_prefix("s3://"))
            .find(|location| {
                let Some((bucket, key)) = location.split_once('/') else {
                    return true;
                };
                !self.objects.contains_key(&(bucket.to_string(), key.to_string()))
            })
            .map(|location| format!("s3://{location}"))
    }
}

fn paginate<T: Clone>(items: &[T], page_size: usize, token: Option<String>) -> Result<Page<T>, CloudError> {
    let start = match token {
        Some(token) => token
            .parse::<usize>()
            .map_err(|_| CloudError::Validation(format!("bad next token '{token}'")))?,
        None => 0,
    };
    let page_size = page_size.max(1);
    let end = (start + page_size).min(items.len());
    let page = items.get(start..end).unwrap_or_default().to_vec();
    let next_token = (end < items.len()).then(|| end.to_string());
    Ok(Page { items: page, next_token })
}

/// A complete fake of the deployment service, blob store and device directory.
#[derive(Debug)]
pub struct InMemoryCloud {
    state: Mutex<State>,
}

impl Default for InMemoryCloud {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCloud {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::new()),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Lock the state for an operation, counting the call and applying injected failures.
    fn begin(&self, operation: &str) -> Result<MutexGuard<'_, State>, CloudError> {
        let mut state = self.state();
        *state.calls.entry(operation.to_string()).or_default() += 1;
        if let Some((remaining, error)) = state.failures.get_mut(operation) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(error.clone());
            }
        }
        Ok(state)
    }

    // ---- setup ----------------------------------------------------------

    pub fn region(&self) -> String {
        self.state().region.clone()
    }

    pub fn account(&self) -> String {
        self.state().account.clone()
    }

    /// Script how `thing` reports every deployment it receives.
    pub fn set_rollout(&self, thing: &ThingName, rollout: Rollout) {
        self.state().rollouts.insert(thing.to_string(), rollout);
    }

    /// Rollout for things without their own script. Defaults to success on the first tick.
    pub fn set_default_rollout(&self, rollout: Rollout) {
        self.state().default_rollout = rollout;
    }

    /// Add `thing` to `group`, creating the group if needed. Visible immediately.
    pub fn add_group_member(&self, group: &ThingGroupName, thing: &ThingName) {
        let mut state = self.state();
        let members = state.groups.entry(group.to_string()).or_default();
        if !members.iter().any(|m| &m.thing == thing) {
            members.push(Member {
                thing: thing.clone(),
                hidden_for: 0,
            });
        }
    }

    pub fn set_device_health(&self, thing: &ThingName, health: CoreDeviceHealth) {
        self.state().health.insert(thing.to_string(), health);
    }

    /// Items per page for every paginated listing.
    pub fn set_page_size(&self, page_size: usize) {
        self.state().page_size = page_size;
    }

    /// List `count` unrelated past deployments ahead of real ones in `thing`'s history.
    pub fn seed_history(&self, thing: &ThingName, count: usize) {
        self.state().history.insert(thing.to_string(), count);
    }

    /// Reject the next `count` registrations as having inaccessible artifacts.
    pub fn reject_registrations(&self, count: u32) {
        self.state().inaccessible_registrations = count;
    }

    /// Components report deployable from the `describes`-th describe call on.
    pub fn set_ready_after(&self, describes: u32) {
        self.state().ready_after = describes;
    }

    pub fn set_max_delete_batch(&self, max: usize) {
        self.state().max_delete_batch = max;
    }

    /// Members added through `add_thing_to_thing_group` stay unlisted for `lists` listings.
    pub fn set_membership_lag(&self, lists: u32) {
        self.state().membership_lag = lists;
    }

    /// Fail the next `times` calls of `operation` with `error`.
    pub fn fail_operation(&self, operation: &str, times: usize, error: CloudError) {
        self.state().failures.insert(operation.to_string(), (times, error));
    }

    // ---- inspection -----------------------------------------------------

    /// Number of calls made to `operation`, failed ones included.
    pub fn calls(&self, operation: &str) -> usize {
        self.state().calls.get(operation).copied().unwrap_or(0)
    }

    /// Number of `get_deployment` calls for `id`.
    pub fn polls(&self, id: &DeploymentId) -> u32 {
        self.state().deployment(id).map(|d| d.polls).unwrap_or(0)
    }

    /// Registered recipes, in registration order.
    pub fn recipes(&self) -> Vec<Value> {
        self.state().components.iter().map(|c| c.recipe.clone()).collect()
    }

    pub fn recipe(&self, name: &str, version: &str) -> Option<Value> {
        self.state()
            .components
            .iter()
            .find(|c| c.name == name && c.version == version)
            .map(|c| c.recipe.clone())
    }

    pub fn component_count(&self) -> usize {
        self.state().components.len()
    }

    pub fn object(&self, bucket: &BucketName, key: &ObjectKey) -> Option<Bytes> {
        self.state()
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    pub fn object_count(&self) -> usize {
        self.state().objects.len()
    }

    pub fn deployment(&self, id: &DeploymentId) -> Option<DeploymentDescription> {
        self.state().deployment(id).ok().map(|d| d.description.clone())
    }

    /// Deployments not yet deleted, in creation order.
    pub fn deployments(&self) -> Vec<DeploymentDescription> {
        self.state().deployments.iter().map(|d| d.description.clone()).collect()
    }

    pub fn thing_group_count(&self) -> usize {
        self.state().groups.len()
    }

    /// Sizes of every `delete_objects` batch received.
    pub fn delete_batches(&self) -> Vec<usize> {
        self.state().delete_batches.clone()
    }

    /// Returns true if nothing created through the traits remains.
    pub fn is_empty(&self) -> bool {
        let state = self.state();
        state.components.is_empty() && state.objects.is_empty() && state.deployments.is_empty()
    }
}

#[async_trait]
impl DeploymentService for InMemoryCloud {
    async fn create_component_version(&self, recipe: &[u8]) -> Result<RegisteredComponent, CloudError> {
        let mut state = self.begin("create_component_version")?;

        let document: Value =
            serde_json::from_slice(recipe).map_err(|e| CloudError::Validation(format!("recipe is not JSON: {e}")))?;
        let name = document
            .get("ComponentName")
            .and_then(Value::as_str)
            .ok_or_else(|| CloudError::Validation("missing ComponentName".to_string()))?
            .to_string();
        let version = document
            .get("ComponentVersion")
            .and_then(Value::as_str)
            .ok_or_else(|| CloudError::Validation("missing ComponentVersion".to_string()))?
            .to_string();

        if state.inaccessible_registrations > 0 {
            state.inaccessible_registrations -= 1;
            return Err(CloudError::ArtifactsNotAccessible(format!("{name} {version}")));
        }
        if let Some(uri) = state.artifact_uri_missing(&document) {
            return Err(CloudError::ArtifactsNotAccessible(uri));
        }
        if state.components.iter().any(|c| c.name == name && c.version == version) {
            return Err(CloudError::Conflict(format!(
                "component {name} version {version} already exists"
            )));
        }

        let arn = ComponentArn::new(format!(
            "arn:aws:greengrass:{}:{}:components:{name}:versions:{version}",
            state.region, state.account
        ))
        .map_err(|e| CloudError::Validation(e.to_string()))?;

        state.components.push(StoredComponent {
            arn: arn.clone(),
            name: name.clone(),
            version: version.clone(),
            recipe: document,
            describes: 0,
        });

        Ok(RegisteredComponent { arn, name, version })
    }

    async fn describe_component(&self, arn: &ComponentArn) -> Result<ComponentState, CloudError> {
        let mut state = self.begin("describe_component")?;
        let ready_after = state.ready_after;
        let component = state
            .components
            .iter_mut()
            .find(|c| &c.arn == arn)
            .ok_or_else(|| CloudError::NotFound(format!("component {arn}")))?;

        component.describes += 1;
        Ok(if component.describes >= ready_after {
            ComponentState::Deployable
        } else {
            ComponentState::Requested
        })
    }

    async fn create_deployment(&self, request: &DeploymentRequest) -> Result<DeploymentId, CloudError> {
        let mut state = self.begin("create_deployment")?;

        for (name, spec) in &request.components {
            let known = state
                .components
                .iter()
                .any(|c| &c.name == name && c.version == spec.version);
            if !known {
                return Err(CloudError::Validation(format!(
                    "component {name} version {} is not registered",
                    spec.version
                )));
            }
        }

        state.deployment_seq += 1;
        let id = DeploymentId::new(format!("deployment-{:04}", state.deployment_seq))
            .map_err(|e| CloudError::Validation(e.to_string()))?;

        state.deployments.push(StoredDeployment {
            description: DeploymentDescription {
                id: id.clone(),
                status: DeploymentStatus::Active,
                target: request.target.clone(),
                created_at: Some(Utc::now()),
                components: request.components.clone(),
            },
            polls: 0,
        });
        Ok(id)
    }

    async fn get_deployment(&self, id: &DeploymentId) -> Result<DeploymentDescription, CloudError> {
        let mut state = self.begin("get_deployment")?;
        let stored = state.deployment_mut(id)?;
        stored.polls += 1;
        Ok(stored.description.clone())
    }

    async fn list_effective_deployments(
        &self,
        thing: &ThingName,
        next_token: Option<String>,
    ) -> Result<Page<EffectiveDeployment>, CloudError> {
        let state = self.begin("list_effective_deployments")?;
        let entries = state.effective_deployments(thing);
        paginate(&entries, state.page_size, next_token)
    }

    async fn cancel_deployment(&self, id: &DeploymentId) -> Result<(), CloudError> {
        let mut state = self.begin("cancel_deployment")?;
        state.deployment_mut(id)?.description.status = DeploymentStatus::Canceled;
        Ok(())
    }

    async fn delete_deployment(&self, id: &DeploymentId) -> Result<(), CloudError> {
        let mut state = self.begin("delete_deployment")?;
        state.deployment(id)?;
        state.deployments.retain(|d| &d.description.id != id);
        Ok(())
    }

    async fn delete_component(&self, arn: &ComponentArn) -> Result<(), CloudError> {
        let mut state = self.begin("delete_component")?;
        let before = state.components.len();
        state.components.retain(|c| &c.arn != arn);
        if state.components.len() == before {
            return Err(CloudError::NotFound(format!("component {arn}")));
        }
        Ok(())
    }

    async fn get_core_device_health(&self, thing: &ThingName) -> Result<Option<CoreDeviceHealth>, CloudError> {
        let state = self.begin("get_core_device_health")?;
        Ok(state.health.get(thing.as_str()).copied())
    }
}

#[async_trait]
impl BlobStore for InMemoryCloud {
    async fn put_object(&self, bucket: &BucketName, key: &ObjectKey, body: Bytes) -> Result<(), CloudError> {
        let mut state = self.begin("put_object")?;
        state.objects.insert((bucket.to_string(), key.to_string()), body);
        Ok(())
    }

    async fn list_objects(
        &self,
        bucket: &BucketName,
        prefix: &str,
        next_token: Option<String>,
    ) -> Result<Page<ObjectKey>, CloudError> {
        let state = self.begin("list_objects")?;
        let keys: Vec<ObjectKey> = state
            .objects
            .keys()
            .filter(|(b, k)| b == bucket.as_str() && k.starts_with(prefix))
            .filter_map(|(_, k)| ObjectKey::new(k.as_str()).ok())
            .collect();
        paginate(&keys, state.page_size, next_token)
    }

    async fn delete_objects(&self, bucket: &BucketName, keys: &[ObjectKey]) -> Result<(), CloudError> {
        let mut state = self.begin("delete_objects")?;
        if keys.len() > state.max_delete_batch {
            return Err(CloudError::Validation(format!(
                "batch of {} exceeds the limit of {}",
                keys.len(),
                state.max_delete_batch
            )));
        }
        state.delete_batches.push(keys.len());
        for key in keys {
            state.objects.remove(&(bucket.to_string(), key.to_string()));
        }
        Ok(())
    }

    fn max_delete_batch(&self) -> usize {
        self.state().max_delete_batch
    }
}

#[async_trait]
impl DeviceDirectory for InMemoryCloud {
    async fn list_members(
        &self,
        group: &ThingGroupName,
        next_token: Option<String>,
    ) -> Result<Page<ThingName>, CloudError> {
        let mut state = self.begin("list_members")?;
        let page_size = state.page_size;
        let members = state
            .groups
            .get_mut(group.as_str())
            .ok_or_else(|| CloudError::NotFound(format!("thing group {group}")))?;

        let mut visible = Vec::new();
        for member in members.iter_mut() {
            if member.hidden_for > 0 {
                member.hidden_for -= 1;
            } else {
                visible.push(member.thing.clone());
            }
        }
        paginate(&visible, page_size, next_token)
    }

    async fn create_thing_group(&self, group: &ThingGroupName) -> Result<TargetArn, CloudError> {
        let mut state = self.begin("create_thing_group")?;
        if state.groups.contains_key(group.as_str()) {
            return Err(CloudError::Conflict(format!("thing group {group} already exists")));
        }
        state.groups.insert(group.to_string(), Vec::new());
        Ok(TargetArn::thing_group(&state.region, &state.account, group))
    }

    async fn add_thing_to_thing_group(&self, thing: &ThingName, group: &ThingGroupName) -> Result<(), CloudError> {
        let mut state = self.begin("add_thing_to_thing_group")?;
        let lag = state.membership_lag;
        let members = state
            .groups
            .get_mut(group.as_str())
            .ok_or_else(|| CloudError::NotFound(format!("thing group {group}")))?;
        if !members.iter().any(|m| &m.thing == thing) {
            members.push(Member {
                thing: thing.clone(),
                hidden_for: lag,
            });
        }
        Ok(())
    }

    async fn delete_thing_group(&self, group: &ThingGroupName) -> Result<(), CloudError> {
        let mut state = self.begin("delete_thing_group")?;
        state
            .groups
            .remove(group.as_str())
            .map(|_| ())
            .ok_or_else(|| CloudError::NotFound(format!("thing group {group}")))
    }
}
