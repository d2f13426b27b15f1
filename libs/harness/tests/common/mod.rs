//! Shared fixtures: a component tree on disk and a harness over the in-memory cloud.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;
use uat_harness::fake::InMemoryCloud;
use uat_harness::{CloudClients, HarnessConfig, TestHarness};
use uat_id::{TargetArn, ThingGroupName, ThingName};
use uat_wait::{Clock, ManualClock};

pub const BUCKET: &str = "uat-bucket";

pub const HELLO_WORLD: &str = r#"---
RecipeFormatVersion: "2020-01-25"
ComponentName: HelloWorld
ComponentVersion: "{version}"
ComponentDescription: Says hello
ComponentPublisher: uat
Manifests:
  - Platform:
      os: linux
    Artifacts:
      - URI: "s3://$bucketName$/$testArtifactsDirectory$/hello_world.py"
    Lifecycle:
      Run: "python3 -u {artifacts:path}/hello_world.py"
"#;

pub const COMPONENT_B: &str = r#"---
ComponentName: B
ComponentVersion: "1.0.0"
Manifests:
  - Lifecycle:
      Run: "echo B"
"#;

pub const COMPONENT_A: &str = r#"---
ComponentName: A
ComponentVersion: "1.0.0"
ComponentDependencies:
  _B_:
    VersionRequirement: ">=1.0.0"
    DependencyType: HARD
Manifests:
  - Lifecycle:
      Run: "echo A"
"#;

pub fn write_component(root: &Path, name: &str, version: &str, recipe: &str, artifacts: &[(&str, &[u8])]) {
    let version_dir = root.join(name).join(version);
    let recipe_dir = version_dir.join("recipe");
    std::fs::create_dir_all(&recipe_dir).unwrap();
    std::fs::write(
        recipe_dir.join(format!("{name}-{version}.yaml")),
        recipe.replace("{version}", version),
    )
    .unwrap();

    if !artifacts.is_empty() {
        let artifacts_dir = version_dir.join("artifacts");
        std::fs::create_dir_all(&artifacts_dir).unwrap();
        for (file, body) in artifacts {
            std::fs::write(artifacts_dir.join(file), body).unwrap();
        }
    }
}

pub fn component_tree() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    for version in ["1.0.0", "1.0.1"] {
        write_component(
            dir.path(),
            "HelloWorld",
            version,
            HELLO_WORLD,
            &[("hello_world.py", b"print('Hello, World!')\n")],
        );
    }
    write_component(dir.path(), "A", "1.0.0", COMPONENT_A, &[]);
    write_component(dir.path(), "B", "1.0.0", COMPONENT_B, &[]);
    dir
}

pub fn test_config(components_dir: &Path) -> HarnessConfig {
    HarnessConfig {
        account: "123456789012".to_string(),
        bucket: BUCKET.to_string(),
        components_dir: components_dir.to_path_buf(),
        ..HarnessConfig::default()
    }
}

pub struct Fixture {
    pub dir: TempDir,
    pub cloud: Arc<InMemoryCloud>,
    pub clock: Arc<ManualClock>,
    pub harness: TestHarness,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(adjust: impl FnOnce(&mut HarnessConfig)) -> Self {
        init_tracing();
        let dir = component_tree();
        let mut config = test_config(dir.path());
        adjust(&mut config);

        let cloud = Arc::new(InMemoryCloud::new());
        let clock = Arc::new(ManualClock::new());
        let harness = TestHarness::new(
            config,
            CloudClients::from_single(cloud.clone()),
            clock.clone() as Arc<dyn Clock>,
        )
        .unwrap();

        Self {
            dir,
            cloud,
            clock,
            harness,
        }
    }

    pub fn thing_target(&self, thing: &ThingName) -> TargetArn {
        self.harness.config().thing_target(thing)
    }

    pub fn group_target(&self, group: &ThingGroupName) -> TargetArn {
        self.harness.config().thing_group_target(group)
    }
}

pub fn thing(name: &str) -> ThingName {
    ThingName::new(name).unwrap()
}

pub fn group(name: &str) -> ThingGroupName {
    ThingGroupName::new(name).unwrap()
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("uat_harness=debug")
        .with_test_writer()
        .try_init();
}
