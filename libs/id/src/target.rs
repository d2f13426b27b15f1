//! Deployment targets expressed as IoT ARNs.
//!
//! A deployment targets either a single core device (a *thing*) or a
//! device-group (a *thing group*):
//!
//! - `arn:aws:iot:us-west-2:123456789012:thing/MyCoreDevice`
//! - `arn:aws:iot:us-west-2:123456789012:thinggroup/MyGroup`

use std::fmt;
use std::str::FromStr;

use crate::{IdError, ThingGroupName, ThingName};

/// The kind of resource a deployment targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TargetKind {
    /// A single core device.
    Thing,
    /// A device-group; membership is resolved at poll time.
    ThingGroup,
}

impl TargetKind {
    fn resource_type(self) -> &'static str {
        match self {
            Self::Thing => "thing",
            Self::ThingGroup => "thinggroup",
        }
    }
}

/// A parsed deployment target ARN.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TargetArn {
    partition: String,
    region: String,
    account: String,
    kind: TargetKind,
    name: String,
}

impl TargetArn {
    /// Target a single device.
    pub fn thing(region: &str, account: &str, thing: &ThingName) -> Self {
        Self::build(region, account, TargetKind::Thing, thing.as_str())
    }

    /// Target a device-group.
    pub fn thing_group(region: &str, account: &str, group: &ThingGroupName) -> Self {
        Self::build(region, account, TargetKind::ThingGroup, group.as_str())
    }

    fn build(region: &str, account: &str, kind: TargetKind, name: &str) -> Self {
        Self {
            partition: "aws".to_string(),
            region: region.to_string(),
            account: account.to_string(),
            kind,
            name: name.to_string(),
        }
    }

    /// Parses `arn:<partition>:iot:<region>:<account>:<thing|thinggroup>/<name>`.
    pub fn parse(s: &str) -> Result<Self, IdError> {
        if s.trim().is_empty() {
            return Err(IdError::Empty { kind: "target ARN" });
        }

        let parts: Vec<&str> = s.splitn(6, ':').collect();
        let [arn, partition, service, region, account, resource] = parts[..] else {
            return Err(IdError::invalid_arn(s, "expected six ':'-separated fields"));
        };

        if arn != "arn" {
            return Err(IdError::invalid_arn(s, "missing 'arn' prefix"));
        }
        if service != "iot" {
            return Err(IdError::invalid_arn(
                s,
                format!("expected service 'iot', got '{service}'"),
            ));
        }

        let Some((resource_type, name)) = resource.split_once('/') else {
            return Err(IdError::invalid_arn(s, "resource is missing a '/' separator"));
        };
        if name.is_empty() {
            return Err(IdError::invalid_arn(s, "resource name is empty"));
        }

        let kind = match resource_type {
            "thing" => TargetKind::Thing,
            "thinggroup" => TargetKind::ThingGroup,
            other => return Err(IdError::UnsupportedTarget(other.to_string())),
        };

        Ok(Self {
            partition: partition.to_string(),
            region: region.to_string(),
            account: account.to_string(),
            kind,
            name: name.to_string(),
        })
    }

    /// Returns the target kind.
    #[must_use]
    pub fn kind(&self) -> TargetKind {
        self.kind
    }

    /// Returns the thing or thing-group name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the region the target lives in.
    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Returns true if this target is a device-group.
    #[must_use]
    pub fn is_group(&self) -> bool {
        self.kind == TargetKind::ThingGroup
    }

    /// Returns the thing name if this target is a single device.
    pub fn as_thing(&self) -> Option<ThingName> {
        match self.kind {
            TargetKind::Thing => ThingName::new(self.name.as_str()).ok(),
            TargetKind::ThingGroup => None,
        }
    }

    /// Returns the group name if this target is a device-group.
    pub fn as_thing_group(&self) -> Option<ThingGroupName> {
        match self.kind {
            TargetKind::ThingGroup => ThingGroupName::new(self.name.as_str()).ok(),
            TargetKind::Thing => None,
        }
    }
}

impl fmt::Display for TargetArn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "arn:{}:iot:{}:{}:{}/{}",
            self.partition,
            self.region,
            self.account,
            self.kind.resource_type(),
            self.name
        )
    }
}

impl FromStr for TargetArn {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl serde::Serialize for TargetArn {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for TargetArn {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thing_group_arn_format() {
        let group = ThingGroupName::new("uat-group").unwrap();
        let arn = TargetArn::thing_group("us-west-2", "123456789012", &group);
        assert_eq!(
            arn.to_string(),
            "arn:aws:iot:us-west-2:123456789012:thinggroup/uat-group"
        );
        assert!(arn.is_group());
        assert_eq!(arn.as_thing_group(), Some(group));
        assert_eq!(arn.as_thing(), None);
    }

    #[test]
    fn test_thing_arn_roundtrip() {
        let thing = ThingName::new("core-device-1").unwrap();
        let arn = TargetArn::thing("eu-central-1", "123456789012", &thing);
        let parsed: TargetArn = arn.to_string().parse().unwrap();
        assert_eq!(arn, parsed);
        assert_eq!(parsed.kind(), TargetKind::Thing);
        assert_eq!(parsed.name(), "core-device-1");
    }

    #[test]
    fn test_parse_other_partition() {
        let arn = TargetArn::parse("arn:aws-cn:iot:cn-north-1:123456789012:thing/dev").unwrap();
        assert_eq!(arn.region(), "cn-north-1");
        assert_eq!(
            arn.to_string(),
            "arn:aws-cn:iot:cn-north-1:123456789012:thing/dev"
        );
    }

    #[test]
    fn test_parse_rejects_non_target() {
        let result = TargetArn::parse("arn:aws:iot:us-west-2:123456789012:policy/p");
        assert!(matches!(result, Err(IdError::UnsupportedTarget(t)) if t == "policy"));
    }

    #[test]
    fn test_parse_rejects_wrong_service() {
        let result = TargetArn::parse("arn:aws:s3:us-west-2:123456789012:thing/x");
        assert!(matches!(result, Err(IdError::InvalidArn { .. })));
    }

    #[test]
    fn test_parse_rejects_short() {
        assert!(matches!(
            TargetArn::parse("arn:aws:iot"),
            Err(IdError::InvalidArn { .. })
        ));
        assert!(matches!(TargetArn::parse(""), Err(IdError::Empty { .. })));
    }

    #[test]
    fn test_json_roundtrip() {
        let arn = TargetArn::parse("arn:aws:iot:us-west-2:123456789012:thinggroup/g").unwrap();
        let json = serde_json::to_string(&arn).unwrap();
        assert_eq!(json, "\"arn:aws:iot:us-west-2:123456789012:thinggroup/g\"");
        let parsed: TargetArn = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, arn);
    }
}
