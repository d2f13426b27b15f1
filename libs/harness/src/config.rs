//! Harness configuration.
//!
//! Sources, lowest precedence first:
//!
//! 1. Built-in defaults
//! 2. An optional file (TOML, JSON or YAML, chosen by extension)
//! 3. `GGTEST_*` environment variables, nested with `__`
//!    (e.g. `GGTEST_TIMEOUTS__DEPLOYMENT_SECS=300`)
//!
//! The CLI applies its flag overrides on top before calling [`HarnessConfig::validate`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uat_id::{BucketName, TargetArn, ThingGroupName, ThingName};
use uat_wait::RetryPolicy;

use crate::error::HarnessError;

/// Prefix of configuration environment variables.
pub const ENV_PREFIX: &str = "GGTEST";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Twelve-digit cloud account id.
    pub account: String,

    pub region: String,

    /// Bucket artifacts are uploaded to.
    pub bucket: String,

    /// Root of the per-version blob prefix substituted for `$testArtifactsDirectory$`.
    pub artifact_prefix: String,

    /// Put the packaging call's random id in artifact keys. Without it,
    /// concurrent runs share keys and can delete each other's artifacts.
    pub random_artifact_prefix: bool,

    /// Root of the `<name>/<version>/{recipe,artifacts}` tree.
    pub components_dir: PathBuf,

    /// Device-side CLI used for local deployments.
    pub cli_bin_path: PathBuf,

    /// Where the device keeps installed recipes.
    pub recipe_install_dir: PathBuf,

    /// Run device-side commands through `sudo`.
    pub use_sudo: bool,

    pub timeouts: Timeouts,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            account: String::new(),
            region: "us-west-2".to_string(),
            bucket: String::new(),
            artifact_prefix: "artifacts".to_string(),
            random_artifact_prefix: true,
            components_dir: PathBuf::from("components"),
            cli_bin_path: PathBuf::from("/usr/local/bin/ggl-cli"),
            recipe_install_dir: PathBuf::from("/var/lib/greengrass/packages/recipes"),
            use_sudo: true,
            timeouts: Timeouts::default(),
        }
    }
}

/// Wait budgets and retry bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub deployment_secs: u64,
    pub cleanup_settle_secs: u64,
    pub poll_interval_ms: u64,
    pub registration_attempts: u32,
    pub registration_interval_ms: u64,
    pub readiness_attempts: u32,
    pub readiness_interval_ms: u64,
    pub membership_attempts: u32,
    pub membership_interval_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            deployment_secs: 120,
            cleanup_settle_secs: 120,
            poll_interval_ms: 1000,
            registration_attempts: 10,
            registration_interval_ms: 2000,
            readiness_attempts: 10,
            readiness_interval_ms: 1000,
            membership_attempts: 3,
            membership_interval_ms: 2000,
        }
    }
}

impl Timeouts {
    pub fn deployment(&self) -> Duration {
        Duration::from_secs(self.deployment_secs)
    }

    /// Budget for each target's reset deployment during teardown.
    pub fn cleanup_settle(&self) -> Duration {
        Duration::from_secs(self.cleanup_settle_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Retries while registration reports artifacts as not yet accessible.
    pub fn registration(&self) -> RetryPolicy {
        RetryPolicy::fixed(
            self.registration_attempts,
            Duration::from_millis(self.registration_interval_ms),
        )
    }

    /// Polls for a registered component to become deployable.
    pub fn readiness(&self) -> RetryPolicy {
        RetryPolicy::fixed(self.readiness_attempts, Duration::from_millis(self.readiness_interval_ms))
    }

    /// Checks that a thing joined a thing group.
    pub fn membership(&self) -> RetryPolicy {
        RetryPolicy::fixed(
            self.membership_attempts,
            Duration::from_millis(self.membership_interval_ms),
        )
    }
}

impl HarnessConfig {
    /// Load from an optional file and the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, HarnessError> {
        Self::load_with_env(path, None)
    }

    /// Load with an explicit environment map in place of the process environment.
    pub fn load_with_env(path: Option<&Path>, env: Option<HashMap<String, String>>) -> Result<Self, HarnessError> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path));
        }
        builder = builder.add_source(
            ::config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .source(env),
        );

        builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| HarnessError::InvalidConfig(e.to_string()))
    }

    /// Check the values a real run needs.
    pub fn validate(&self) -> Result<(), HarnessError> {
        if self.account.len() != 12 || !self.account.bytes().all(|b| b.is_ascii_digit()) {
            return Err(HarnessError::InvalidConfig(format!(
                "account must be 12 digits, got '{}'",
                self.account
            )));
        }
        if !is_region(&self.region) {
            return Err(HarnessError::InvalidConfig(format!(
                "region '{}' does not look like a region (e.g. us-west-2)",
                self.region
            )));
        }
        if self.bucket.trim().is_empty() {
            return Err(HarnessError::InvalidConfig("bucket is required".to_string()));
        }
        if self.timeouts.poll_interval_ms == 0 {
            return Err(HarnessError::InvalidConfig("poll interval must be positive".to_string()));
        }
        Ok(())
    }

    pub fn bucket_name(&self) -> Result<BucketName, HarnessError> {
        Ok(BucketName::new(self.bucket.as_str())?)
    }

    /// Deployment target for a single device in this account and region.
    pub fn thing_target(&self, thing: &ThingName) -> TargetArn {
        TargetArn::thing(&self.region, &self.account, thing)
    }

    pub fn thing_group_target(&self, group: &ThingGroupName) -> TargetArn {
        TargetArn::thing_group(&self.region, &self.account, group)
    }
}

// `<area>-<name>-<digit>`, e.g. `us-west-2` or `ap-southeast-1`.
fn is_region(region: &str) -> bool {
    let parts: Vec<&str> = region.split('-').collect();
    let [area, name, number] = parts[..] else {
        return false;
    };
    area.len() == 2
        && area.bytes().all(|b| b.is_ascii_lowercase())
        && !name.is_empty()
        && name.bytes().all(|b| b.is_ascii_lowercase())
        && number.len() == 1
        && number.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn valid() -> HarnessConfig {
        HarnessConfig {
            account: "012345678901".to_string(),
            bucket: "uat-artifacts".to_string(),
            ..HarnessConfig::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = HarnessConfig::default();
        assert_eq!(config.timeouts.deployment(), Duration::from_secs(120));
        assert_eq!(config.timeouts.registration().max_attempts, 10);
        assert_eq!(config.timeouts.membership().interval, Duration::from_secs(2));
        assert!(config.use_sudo);
    }

    #[test]
    fn test_valid_config() {
        assert!(valid().validate().is_ok());
    }

    #[rstest]
    #[case("12345", "us-west-2", "b")]
    #[case("12345678901a", "us-west-2", "b")]
    #[case("012345678901", "uswest2", "b")]
    #[case("012345678901", "us-west-22", "b")]
    #[case("012345678901", "usa-west-2", "b")]
    #[case("012345678901", "us-west-2", " ")]
    fn test_invalid_config(#[case] account: &str, #[case] region: &str, #[case] bucket: &str) {
        let config = HarnessConfig {
            account: account.to_string(),
            region: region.to_string(),
            bucket: bucket.to_string(),
            ..HarnessConfig::default()
        };
        assert!(matches!(config.validate(), Err(HarnessError::InvalidConfig(_))));
    }

    #[test]
    fn test_load_from_environment_keeps_leading_zeros() {
        let env = HashMap::from([
            ("GGTEST_ACCOUNT".to_string(), "012345678901".to_string()),
            ("GGTEST_BUCKET".to_string(), "from-env".to_string()),
            ("GGTEST_USE_SUDO".to_string(), "false".to_string()),
            ("GGTEST_TIMEOUTS__DEPLOYMENT_SECS".to_string(), "300".to_string()),
        ]);

        let config = HarnessConfig::load_with_env(None, Some(env)).unwrap();
        assert_eq!(config.account, "012345678901");
        assert_eq!(config.bucket, "from-env");
        assert!(!config.use_sudo);
        assert_eq!(config.timeouts.deployment_secs, 300);
        assert_eq!(config.timeouts.poll_interval_ms, 1000);
        assert_eq!(config.region, "us-west-2");
    }

    #[test]
    fn test_environment_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ggtest.yaml");
        std::fs::write(
            &path,
            "account: \"111122223333\"\nbucket: from-file\nregion: eu-central-1\ntimeouts:\n  poll_interval_ms: 250\n",
        )
        .unwrap();

        let env = HashMap::from([("GGTEST_BUCKET".to_string(), "from-env".to_string())]);
        let config = HarnessConfig::load_with_env(Some(&path), Some(env)).unwrap();

        assert_eq!(config.account, "111122223333");
        assert_eq!(config.bucket, "from-env");
        assert_eq!(config.region, "eu-central-1");
        assert_eq!(config.timeouts.poll_interval(), Duration::from_millis(250));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_is_error() {
        let err = HarnessConfig::load_with_env(Some(Path::new("/nonexistent/ggtest.toml")), Some(HashMap::new()))
            .unwrap_err();
        assert!(matches!(err, HarnessError::InvalidConfig(_)));
    }
}
