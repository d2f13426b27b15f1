//! Recipe packager against the in-memory cloud.

mod common;

use std::time::Duration;

use common::{write_component, Fixture, BUCKET, HELLO_WORLD};
use uat_harness::error::{CloudError, HarnessError};
use uat_harness::packager::CORRUPTION_TRAILER;
use uat_harness::LedgerEntry;
use uat_id::{BucketName, ObjectKey};

#[tokio::test]
async fn test_two_packagings_differ_only_in_name() {
    let fx = Fixture::new();
    let packager = fx.harness.packager();

    let first = packager.package("HelloWorld", &["1.0.0"]).await.unwrap();
    let second = packager.package("HelloWorld", &["1.0.0"]).await.unwrap();

    assert_ne!(first.name, second.name);
    assert!(first.name.starts_with("HelloWorld-"));
    assert!(second.name.starts_with("HelloWorld-"));

    let normalize = |name: &str| {
        let suffix = name.strip_prefix("HelloWorld-").unwrap();
        fx.cloud
            .recipe(name, "1.0.0")
            .unwrap()
            .to_string()
            .replace(suffix, "<id>")
    };
    assert_eq!(normalize(&first.name), normalize(&second.name));

    let suffix = first.name.strip_prefix("HelloWorld-").unwrap();
    let recipe = fx.cloud.recipe(&first.name, "1.0.0").unwrap();
    assert_eq!(recipe["ComponentName"], first.name.as_str());
    assert_eq!(
        recipe["Manifests"][0]["Artifacts"][0]["URI"],
        format!("s3://{BUCKET}/artifacts/{suffix}/1.0.0/hello_world.py")
    );
}

#[tokio::test]
async fn test_package_records_objects_and_components() {
    let fx = Fixture::new();
    let info = fx.harness.packager().package("HelloWorld", &["1.0.0"]).await.unwrap();

    assert_eq!(info.version(), Some("1.0.0"));
    assert!(info.merge_config.is_none());

    let suffix = info.name.strip_prefix("HelloWorld-").unwrap();
    let expected_key = format!("artifacts/{suffix}/1.0.0/hello_world.py");
    let entries = fx.harness.ledger().entries();
    assert_eq!(entries.len(), 2);
    assert!(matches!(&entries[0], LedgerEntry::BlobObject { key, .. } if key.as_str() == expected_key));
    assert!(matches!(&entries[1], LedgerEntry::Component(arn) if arn.as_str().contains(&info.name)));
}

#[tokio::test]
async fn test_prestaged_versions_share_one_name() {
    let fx = Fixture::new();
    let info = fx
        .harness
        .packager()
        .package("HelloWorld", &["1.0.0", "1.0.1"])
        .await
        .unwrap();

    assert_eq!(info.versions, vec!["1.0.0", "1.0.1"]);
    assert!(fx.cloud.recipe(&info.name, "1.0.0").is_some());
    assert!(fx.cloud.recipe(&info.name, "1.0.1").is_some());
    assert_eq!(fx.cloud.component_count(), 2);
}

#[tokio::test]
async fn test_prestaged_versions_keep_their_own_artifacts() {
    let fx = Fixture::new();
    for version in ["2.0.0", "2.0.1"] {
        write_component(
            fx.dir.path(),
            "Multi",
            version,
            HELLO_WORLD.replace("HelloWorld", "Multi").as_str(),
            &[("hello_world.py", format!("v{version}").as_bytes())],
        );
    }

    let info = fx
        .harness
        .packager()
        .package("Multi", &["2.0.0", "2.0.1"])
        .await
        .unwrap();

    let bucket = BucketName::new(BUCKET).unwrap();
    let uri = |version: &str| {
        fx.cloud.recipe(&info.name, version).unwrap()["Manifests"][0]["Artifacts"][0]["URI"]
            .as_str()
            .unwrap()
            .to_string()
    };
    let (first, second) = (uri("2.0.0"), uri("2.0.1"));
    assert_ne!(first, second);

    for (uri, version) in [(first, "2.0.0"), (second, "2.0.1")] {
        let key = uri.strip_prefix(&format!("s3://{BUCKET}/")).unwrap();
        let body = fx.cloud.object(&bucket, &ObjectKey::new(key).unwrap()).unwrap();
        assert_eq!(body, format!("v{version}").as_bytes());
    }
    assert_eq!(fx.cloud.object_count(), 2);
}

#[tokio::test]
async fn test_dependency_placeholder_rewritten() {
    let fx = Fixture::new();
    let packager = fx.harness.packager();

    let b = packager.package("B", &["1.0.0"]).await.unwrap();
    let a = packager
        .package_with_dependencies("A", &["1.0.0"], &[("_B_".to_string(), b.name.clone())])
        .await
        .unwrap();

    let recipe = fx.cloud.recipe(&a.name, "1.0.0").unwrap();
    let deps = recipe["ComponentDependencies"].as_object().unwrap();
    assert_eq!(deps.len(), 1);
    assert!(deps.contains_key(&b.name));
    assert_eq!(deps[&b.name]["DependencyType"], "HARD");
    assert!(!recipe.to_string().contains("_B_"));
}

#[tokio::test]
async fn test_undeclared_placeholder_leaves_nothing_behind() {
    let fx = Fixture::new();
    let err = fx
        .harness
        .packager()
        .package_with_dependencies("A", &["1.0.0"], &[("_C_".to_string(), "C-1".to_string())])
        .await
        .unwrap_err();

    assert!(matches!(err, HarnessError::MissingDependency { .. }));
    assert!(err.is_configuration());
    assert!(fx.harness.ledger().is_empty());
    assert_eq!(fx.cloud.calls("create_component_version"), 0);
}

#[tokio::test]
async fn test_missing_directory_is_not_found_without_side_effects() {
    let fx = Fixture::new();
    let packager = fx.harness.packager();

    let err = packager.package("Missing", &["1.0.0"]).await.unwrap_err();
    assert!(matches!(err, HarnessError::NotFound { .. }));

    let err = packager.package("HelloWorld", &["1.0.0", "9.9.9"]).await.unwrap_err();
    assert!(matches!(err, HarnessError::NotFound { .. }));

    assert!(fx.harness.ledger().is_empty());
    assert_eq!(fx.cloud.calls("put_object"), 0);
}

#[tokio::test]
async fn test_no_versions_rejected() {
    let fx = Fixture::new();
    let err = fx.harness.packager().package("HelloWorld", &[]).await.unwrap_err();
    assert!(matches!(err, HarnessError::NoVersions { .. }));
}

#[tokio::test]
async fn test_registration_retries_until_artifacts_visible() {
    let fx = Fixture::new();
    fx.cloud.reject_registrations(3);

    let info = fx.harness.packager().package("HelloWorld", &["1.0.0"]).await.unwrap();

    assert!(fx.cloud.recipe(&info.name, "1.0.0").is_some());
    assert_eq!(fx.cloud.calls("create_component_version"), 4);
    assert_eq!(fx.clock.elapsed(), Duration::from_secs(6));
}

#[tokio::test]
async fn test_registration_gives_up_after_bounded_attempts() {
    let fx = Fixture::new();
    fx.cloud.reject_registrations(100);

    let err = fx.harness.packager().package("HelloWorld", &["1.0.0"]).await.unwrap_err();

    assert!(matches!(err, HarnessError::ArtifactsNotAccessible { attempts: 10, .. }));
    assert_eq!(fx.cloud.calls("create_component_version"), 10);
    // Uploaded artifacts stay recorded so teardown removes them.
    assert_eq!(fx.harness.ledger().len(), 1);
}

#[tokio::test]
async fn test_existing_version_is_a_configuration_error() {
    let fx = Fixture::new();
    fx.cloud
        .fail_operation("create_component_version", 1, CloudError::Conflict("exists".into()));

    let err = fx.harness.packager().package("HelloWorld", &["1.0.0"]).await.unwrap_err();

    assert!(matches!(err, HarnessError::VersionConflict { ref version, .. } if version == "1.0.0"));
    assert!(err.is_configuration());
    assert_eq!(fx.cloud.calls("create_component_version"), 1);
}

#[tokio::test]
async fn test_waits_for_deployable_state() {
    let fx = Fixture::new();
    fx.cloud.set_ready_after(3);

    fx.harness.packager().package("B", &["1.0.0"]).await.unwrap();

    assert_eq!(fx.cloud.calls("describe_component"), 3);
    assert_eq!(fx.clock.elapsed(), Duration::from_secs(2));
}

#[tokio::test]
async fn test_never_deployable_is_not_an_error() {
    let fx = Fixture::new();
    fx.cloud.set_ready_after(u32::MAX);

    let info = fx.harness.packager().package("B", &["1.0.0"]).await;

    assert!(info.is_ok());
    assert_eq!(fx.cloud.calls("describe_component"), 10);
}

#[tokio::test]
async fn test_artifact_prefix_without_random_id() {
    let fx = Fixture::with_config(|config| config.random_artifact_prefix = false);
    let info = fx.harness.packager().package("HelloWorld", &["1.0.0"]).await.unwrap();

    let key = ObjectKey::new("artifacts/1.0.0/hello_world.py").unwrap();
    assert!(fx.cloud.object(&BucketName::new(BUCKET).unwrap(), &key).is_some());

    let recipe = fx.cloud.recipe(&info.name, "1.0.0").unwrap();
    assert_eq!(
        recipe["Manifests"][0]["Artifacts"][0]["URI"],
        format!("s3://{BUCKET}/artifacts/1.0.0/hello_world.py")
    );
}

#[tokio::test]
async fn test_corrupt_artifacts_overwrite_uploaded_keys() {
    let fx = Fixture::new();
    let packager = fx.harness.packager();
    let info = packager.package("HelloWorld", &["1.0.0"]).await.unwrap();
    let recorded = fx.harness.ledger().len();

    let files = packager.upload_corrupt_artifacts("HelloWorld", "1.0.0", &info).await.unwrap();

    assert_eq!(files, 1);
    let suffix = info.name.strip_prefix("HelloWorld-").unwrap();
    let body = fx
        .cloud
        .object(
            &BucketName::new(BUCKET).unwrap(),
            &ObjectKey::new(format!("artifacts/{suffix}/1.0.0/hello_world.py")).unwrap(),
        )
        .unwrap();
    assert!(body.starts_with(b"print('Hello, World!')"));
    assert!(body.ends_with(CORRUPTION_TRAILER));
    assert_eq!(fx.harness.ledger().len(), recorded);
}

#[tokio::test]
async fn test_package_inline() {
    let fx = Fixture::new();
    let recipe = serde_json::json!({
        "RecipeFormatVersion": "2020-01-25",
        "ComponentName": "Inline",
        "ComponentVersion": "1.0.0",
        "Manifests": [{"Lifecycle": {"Run": "echo Inline $randomId$"}}],
    });

    let info = fx.harness.packager().package_inline(&recipe).await.unwrap();

    assert!(info.name.starts_with("Inline-"));
    assert_eq!(info.version(), Some("1.0.0"));
    let registered = fx.cloud.recipe(&info.name, "1.0.0").unwrap();
    let suffix = info.name.strip_prefix("Inline-").unwrap();
    assert_eq!(
        registered["Manifests"][0]["Lifecycle"]["Run"],
        format!("echo {} {suffix}", info.name)
    );
}
