//! End-to-end runs over the checked-in component tree.
//!
//! Each test packages components from `components/`, deploys them through
//! the in-memory cloud with a manual clock, checks the verdict and then
//! verifies that teardown leaves the account empty:
//!
//! 1. Package (upload artifacts, register recipes)
//! 2. Deploy to a device or a thing group
//! 3. Poll for the verdict
//! 4. Tear down
//!
//! ## Running
//!
//! ```bash
//! cargo test -p uat-e2e --test happy_path
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use uat_harness::fake::{InMemoryCloud, Rollout};
use uat_harness::{CloudClients, DeploymentOutcome, HarnessConfig, TestHarness};
use uat_id::{BucketName, ObjectKey, ThingGroupName, ThingName};
use uat_wait::{Clock, ManualClock};

const BUCKET: &str = "uat-e2e-artifacts";

fn components_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../components")
}

struct Run {
    cloud: Arc<InMemoryCloud>,
    clock: Arc<ManualClock>,
    harness: TestHarness,
}

fn start() -> Run {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("uat_harness=debug")
        .with_test_writer()
        .try_init();

    let config = HarnessConfig {
        account: "123456789012".to_string(),
        region: "us-west-2".to_string(),
        bucket: BUCKET.to_string(),
        components_dir: components_dir(),
        ..HarnessConfig::default()
    };
    config.validate().unwrap();

    let cloud = Arc::new(InMemoryCloud::new());
    let clock = Arc::new(ManualClock::new());
    let harness = TestHarness::new(
        config,
        CloudClients::from_single(cloud.clone()),
        clock.clone() as Arc<dyn Clock>,
    )
    .unwrap();

    Run { cloud, clock, harness }
}

#[tokio::test]
async fn test_hello_world_happy_path() {
    let run = start();
    let device = ThingName::new("e2e-device").unwrap();
    run.cloud.set_rollout(&device, Rollout::succeed_at(5));

    // 1. Package
    let hello = run
        .harness
        .packager()
        .package("HelloWorld", &["1.0.0"])
        .await
        .unwrap();
    let recipe = run.cloud.recipe(&hello.name, "1.0.0").unwrap();
    let suffix = hello.name.strip_prefix("HelloWorld-").unwrap();
    assert_eq!(recipe["ComponentName"], hello.name.as_str());
    assert_eq!(
        recipe["Manifests"][0]["Artifacts"][0]["URI"],
        format!("s3://{BUCKET}/artifacts/{suffix}/1.0.0/hello_world.py")
    );
    assert!(recipe["Manifests"][0]["Lifecycle"]["Run"]
        .as_str()
        .unwrap()
        .ends_with(&format!("' {}", hello.name)));

    // 2-3. Deploy and poll with the default 120s budget
    let target = run.harness.config().thing_target(&device);
    let (record, outcome) = run.harness.deploy_and_wait(&target, &[hello]).await.unwrap();
    assert_eq!(outcome, DeploymentOutcome::Succeeded);
    let polls = run.cloud.polls(&record.id);
    assert!(polls <= 6, "took {polls} polls");
    assert_eq!(run.clock.elapsed(), Duration::from_secs(4));

    // 4. Teardown
    let report = run.harness.teardown().await;
    assert!(report.is_clean(), "{:?}", report.failures);
    assert!(run.cloud.is_empty());
    assert!(run.harness.teardown().await.is_noop());
}

#[tokio::test]
async fn test_dependency_is_rewritten_to_cloud_name() {
    let run = start();
    let device = ThingName::new("e2e-device").unwrap();
    let packager = run.harness.packager();

    let b = packager.package("B", &["1.0.0"]).await.unwrap();
    let a = packager
        .package_with_dependencies("A", &["1.0.0"], &[("_B_".to_string(), b.name.clone())])
        .await
        .unwrap();

    let recipe = run.cloud.recipe(&a.name, "1.0.0").unwrap();
    let text = recipe.to_string();
    assert!(text.contains(&b.name));
    assert!(!text.contains("_B_"));
    assert_eq!(
        recipe["ComponentDependencies"][&b.name]["VersionRequirement"],
        ">=1.0.0 <2.0.0"
    );

    let target = run.harness.config().thing_target(&device);
    let (_, outcome) = run.harness.deploy_and_wait(&target, &[a, b]).await.unwrap();
    assert_eq!(outcome, DeploymentOutcome::Succeeded);

    assert!(run.harness.teardown().await.is_clean());
    assert!(run.cloud.is_empty());
}

#[tokio::test]
async fn test_failed_device_in_group_fails_deployment() {
    let run = start();
    let fleet = ThingGroupName::new("e2e-fleet").unwrap();
    let (healthy, broken) = (
        ThingName::new("e2e-healthy").unwrap(),
        ThingName::new("e2e-broken").unwrap(),
    );
    run.cloud.add_group_member(&fleet, &healthy);
    run.cloud.add_group_member(&fleet, &broken);
    run.cloud.set_rollout(&healthy, Rollout::never());
    run.cloud.set_rollout(&broken, Rollout::fail_at(3));

    let hello = run
        .harness
        .packager()
        .package("HelloWorld", &["1.0.1"])
        .await
        .unwrap();
    let target = run.harness.config().thing_group_target(&fleet);
    let (record, outcome) = run.harness.deploy_and_wait(&target, &[hello]).await.unwrap();

    assert_eq!(outcome, DeploymentOutcome::Failed);
    assert_eq!(run.cloud.polls(&record.id), 3);

    let report = run.harness.teardown().await;
    assert!(report.is_clean(), "{:?}", report.failures);
    assert_eq!(report.targets_reset, 1);
    assert!(run.cloud.is_empty());
}

#[tokio::test]
async fn test_upgrade_between_prestaged_versions() {
    let run = start();
    let device = ThingName::new("e2e-device").unwrap();
    let hello = run
        .harness
        .packager()
        .package("HelloWorld", &["1.0.0", "1.0.1"])
        .await
        .unwrap();
    let target = run.harness.config().thing_target(&device);
    let bucket = BucketName::new(BUCKET).unwrap();

    for version in ["1.0.0", "1.0.1"] {
        let recipe = run.cloud.recipe(&hello.name, version).unwrap();
        let uri = recipe["Manifests"][0]["Artifacts"][0]["URI"].as_str().unwrap();
        let key = ObjectKey::new(uri.trim_start_matches(&format!("s3://{BUCKET}/"))).unwrap();
        let shipped = run.cloud.object(&bucket, &key).unwrap();
        let local = std::fs::read(
            components_dir()
                .join("HelloWorld")
                .join(version)
                .join("artifacts/hello_world.py"),
        )
        .unwrap();
        assert_eq!(shipped, local);

        let pinned = hello.pinned(version);
        let (record, outcome) = run.harness.deploy_and_wait(&target, &[pinned]).await.unwrap();
        assert_eq!(outcome, DeploymentOutcome::Succeeded);
        let deployed = run.cloud.deployment(&record.id).unwrap();
        assert_eq!(deployed.components[&hello.name].version, version);
    }

    assert!(run.harness.teardown().await.is_clean());
    assert!(run.cloud.is_empty());
}
