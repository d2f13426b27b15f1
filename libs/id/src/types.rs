//! Typed name definitions for the cloud resources the harness touches.

use crate::define_name;

// =============================================================================
// Deployment service
// =============================================================================

define_name!(ComponentArn, "component ARN");
define_name!(DeploymentId, "deployment id");

// =============================================================================
// Device directory
// =============================================================================

define_name!(ThingName, "thing name");
define_name!(ThingGroupName, "thing group name");

// =============================================================================
// Blob store
// =============================================================================

define_name!(BucketName, "bucket name");
define_name!(ObjectKey, "object key");

impl ObjectKey {
    /// Joins a prefix and a file name with `/`, tolerating a trailing slash on the prefix.
    pub fn join(prefix: &str, file_name: &str) -> Result<Self, crate::IdError> {
        let prefix = prefix.trim_end_matches('/');
        if prefix.is_empty() {
            Self::new(file_name)
        } else {
            Self::new(format!("{prefix}/{file_name}"))
        }
    }

    /// Returns true if the key lives under `prefix`.
    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.0.starts_with(prefix)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_roundtrip() {
        let id = DeploymentId::new("a1b2c3").unwrap();
        let parsed: DeploymentId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_name_empty() {
        let result: Result<ThingName, _> = "   ".parse();
        assert!(matches!(
            result.unwrap_err(),
            crate::IdError::Empty { kind: "thing name" }
        ));
    }

    #[test]
    fn test_name_whitespace() {
        let result = ThingGroupName::new("my group");
        assert!(matches!(
            result.unwrap_err(),
            crate::IdError::Whitespace { .. }
        ));
    }

    #[test]
    fn test_name_json_roundtrip() {
        let arn = ComponentArn::new(
            "arn:aws:greengrass:us-west-2:123456789012:components:HelloWorld:versions:1.0.0",
        )
        .unwrap();
        let json = serde_json::to_string(&arn).unwrap();
        let parsed: ComponentArn = serde_json::from_str(&json).unwrap();
        assert_eq!(arn, parsed);
    }

    #[test]
    fn test_name_json_rejects_empty() {
        let result: Result<ObjectKey, _> = serde_json::from_str("\"\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_object_key_join() {
        let key = ObjectKey::join("artifacts/", "hello.py").unwrap();
        assert_eq!(key.as_str(), "artifacts/hello.py");
        assert!(key.has_prefix("artifacts/"));

        let bare = ObjectKey::join("", "hello.py").unwrap();
        assert_eq!(bare.as_str(), "hello.py");
    }
}
