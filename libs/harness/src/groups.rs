//! Thing-group helper for group-targeted scenarios.

use std::sync::Arc;

use tracing::{info, warn};
use uat_id::{RandomSuffix, TargetArn, ThingGroupName, ThingName};
use uat_wait::{Clock, RetryError, RetryPolicy};

use crate::cloud::{collect_pages, DeviceDirectory};
use crate::error::{CloudError, HarnessError};
use crate::ledger::ResourceLedger;

pub struct ThingGroups {
    devices: Arc<dyn DeviceDirectory>,
    ledger: Arc<ResourceLedger>,
    clock: Arc<dyn Clock>,
    membership: RetryPolicy,
}

impl ThingGroups {
    pub fn new(
        devices: Arc<dyn DeviceDirectory>,
        ledger: Arc<ResourceLedger>,
        clock: Arc<dyn Clock>,
        membership: RetryPolicy,
    ) -> Self {
        Self {
            devices,
            ledger,
            clock,
            membership,
        }
    }

    /// Create a uniquely named thing group derived from `base`.
    pub async fn create(&self, base: &str) -> Result<(ThingGroupName, TargetArn), HarnessError> {
        let name = ThingGroupName::new(RandomSuffix::generate().apply(base))?;
        let arn = self.devices.create_thing_group(&name).await?;
        self.ledger.record_thing_group(name.clone());

        info!(thing_group = %name, arn = %arn, "Thing group created");
        Ok((name, arn))
    }

    /// Add `thing` to `group` and confirm it shows up as a member.
    ///
    /// Membership is eventually consistent, so the check is retried.
    /// Returns false if it never appears.
    pub async fn add_thing(&self, thing: &ThingName, group: &ThingGroupName) -> Result<bool, HarnessError> {
        self.devices.add_thing_to_thing_group(thing, group).await?;

        let result = self
            .membership
            .run(
                self.clock.as_ref(),
                "verify_membership",
                move |_| async move {
                    match self.is_member(thing, group).await {
                        Ok(true) => Ok(()),
                        Ok(false) => Err(CloudError::NotFound(format!("{thing} in {group}"))),
                        Err(e) => Err(e),
                    }
                },
                CloudError::is_not_found,
            )
            .await;

        match result {
            Ok(()) => {
                info!(thing = %thing, thing_group = %group, "Thing added to group");
                Ok(true)
            }
            Err(RetryError::Exhausted { attempts, .. }) => {
                warn!(thing = %thing, thing_group = %group, attempts, "Thing never appeared in group");
                Ok(false)
            }
            Err(RetryError::Permanent(e)) => Err(e.into()),
        }
    }

    pub async fn is_member(&self, thing: &ThingName, group: &ThingGroupName) -> Result<bool, CloudError> {
        let members = collect_pages("list_members", |token| {
            let devices = self.devices.clone();
            let group = group.clone();
            async move { devices.list_members(&group, token).await }
        })
        .await?;
        Ok(members.contains(thing))
    }
}
