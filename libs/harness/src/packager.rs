//! Recipe Packager: local component definitions in, registered cloud components out.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tracing::{debug, info, warn};
use uat_id::{BucketName, ComponentArn, ObjectKey, RandomSuffix};
use uat_wait::{Clock, RetryError, RetryPolicy};

use crate::cloud::{BlobStore, DeploymentService};
use crate::config::HarnessConfig;
use crate::error::{CloudError, HarnessError};
use crate::ledger::ResourceLedger;
use crate::model::{ComponentDefinition, ComponentDeploymentInfo};
use crate::recipe::{recipe_from_template, RecipeTemplate, RenderedRecipe, Substitutions};

/// Trailer appended to artifacts by [`Packager::upload_corrupt_artifacts`].
pub const CORRUPTION_TRAILER: &[u8] = b"#corruption comment";

/// Packaging settings taken from the harness configuration.
#[derive(Debug, Clone)]
pub struct PackagerSettings {
    pub bucket: BucketName,
    pub artifact_prefix: String,
    pub random_artifact_prefix: bool,
    pub components_dir: PathBuf,
    pub registration: RetryPolicy,
    pub readiness: RetryPolicy,
}

impl PackagerSettings {
    pub fn from_config(config: &HarnessConfig) -> Result<Self, HarnessError> {
        Ok(Self {
            bucket: config.bucket_name()?,
            artifact_prefix: config.artifact_prefix.clone(),
            random_artifact_prefix: config.random_artifact_prefix,
            components_dir: config.components_dir.clone(),
            registration: config.timeouts.registration(),
            readiness: config.timeouts.readiness(),
        })
    }
}

#[derive(Debug, Clone)]
struct ArtifactFile {
    file_name: String,
    body: Bytes,
}

struct LoadedVersion {
    template: RecipeTemplate,
    artifacts: Vec<ArtifactFile>,
}

pub struct Packager {
    settings: PackagerSettings,
    deployments: Arc<dyn DeploymentService>,
    blobs: Arc<dyn BlobStore>,
    ledger: Arc<ResourceLedger>,
    clock: Arc<dyn Clock>,
    /// Artifact prefix of each packaged `(cloud name, version)`.
    artifact_dirs: Mutex<HashMap<(String, String), String>>,
}

impl Packager {
    pub fn new(
        settings: PackagerSettings,
        deployments: Arc<dyn DeploymentService>,
        blobs: Arc<dyn BlobStore>,
        ledger: Arc<ResourceLedger>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            settings,
            deployments,
            blobs,
            ledger,
            clock,
            artifact_dirs: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &PackagerSettings {
        &self.settings
    }

    /// Package every listed version of a local component under one fresh cloud name.
    pub async fn package(&self, name: &str, versions: &[&str]) -> Result<ComponentDeploymentInfo, HarnessError> {
        self.package_with_dependencies(name, versions, &[]).await
    }

    /// Like [`Packager::package`], renaming dependency placeholders to concrete cloud names.
    ///
    /// Each `(placeholder, cloud_name)` pair renames one key of the recipe's
    /// `ComponentDependencies`.
    pub async fn package_with_dependencies(
        &self,
        name: &str,
        versions: &[&str],
        dependencies: &[(String, String)],
    ) -> Result<ComponentDeploymentInfo, HarnessError> {
        if versions.is_empty() {
            return Err(HarnessError::NoVersions {
                component: name.to_string(),
            });
        }

        // Everything local is read and rendered before the first remote call,
        // so a bad definition leaves nothing behind.
        let loaded = versions
            .iter()
            .map(|version| self.load_version(name, version))
            .collect::<Result<Vec<_>, _>>()?;

        let suffix = RandomSuffix::generate();
        let cloud_name = suffix.apply(name);

        // Versions may ship same-named files, so each gets its own prefix.
        let mut rendered = Vec::with_capacity(loaded.len());
        for (version, v) in versions.iter().zip(&loaded) {
            let artifacts_dir = self.artifacts_dir(&suffix, version);
            let substitutions = Substitutions {
                bucket: self.settings.bucket.as_str(),
                artifacts_dir: &artifacts_dir,
                random_id: suffix.as_str(),
            };
            let recipe = v.template.render(&substitutions, dependencies, &cloud_name)?;
            rendered.push((artifacts_dir, recipe));
        }

        for ((artifacts_dir, _), v) in rendered.iter().zip(&loaded) {
            self.upload_artifacts(artifacts_dir, &v.artifacts).await?;
        }
        for (version, (artifacts_dir, _)) in versions.iter().zip(&rendered) {
            self.remember_artifacts_dir(&cloud_name, version, artifacts_dir);
        }

        for (_, recipe) in &rendered {
            self.register(recipe).await?;
        }

        info!(
            component = name,
            cloud_name = %cloud_name,
            versions = ?versions,
            dependencies = dependencies.len(),
            "Component packaged"
        );

        Ok(ComponentDeploymentInfo::new(
            cloud_name,
            versions.iter().map(|v| (*v).to_string()).collect(),
        ))
    }

    /// Register an in-memory recipe document under a fresh cloud name.
    ///
    /// The document's `ComponentName` is the base name; it has no local artifacts.
    pub async fn package_inline(&self, recipe: &serde_json::Value) -> Result<ComponentDeploymentInfo, HarnessError> {
        let template = RecipeTemplate::from_document("inline recipe", recipe)?;

        let suffix = RandomSuffix::generate();
        let cloud_name = suffix.apply(template.declared_name());
        let artifacts_dir = self.artifacts_dir(&suffix, template.declared_version());
        let substitutions = Substitutions {
            bucket: self.settings.bucket.as_str(),
            artifacts_dir: &artifacts_dir,
            random_id: suffix.as_str(),
        };

        let rendered = template.render(&substitutions, &[], &cloud_name)?;
        self.register(&rendered).await?;

        info!(
            component = template.declared_name(),
            cloud_name = %cloud_name,
            version = %rendered.version,
            "Inline component packaged"
        );
        Ok(ComponentDeploymentInfo::single(cloud_name, rendered.version))
    }

    /// Overwrite the uploaded artifacts of a packaged component with corrupted copies.
    ///
    /// A later deployment of `packaged` fails its artifact integrity check.
    pub async fn upload_corrupt_artifacts(
        &self,
        name: &str,
        version: &str,
        packaged: &ComponentDeploymentInfo,
    ) -> Result<usize, HarnessError> {
        let artifacts_dir = self
            .artifact_dirs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&(packaged.name.clone(), version.to_string()))
            .cloned()
            .ok_or_else(|| {
                HarnessError::InvalidConfig(format!(
                    "{} {version} was not packaged by this harness",
                    packaged.name
                ))
            })?;

        let definition = ComponentDefinition::locate(&self.settings.components_dir, name, version)?;
        let corrupted: Vec<ArtifactFile> = read_artifacts(&definition)?
            .into_iter()
            .map(|artifact| {
                let mut body = artifact.body.to_vec();
                body.extend_from_slice(CORRUPTION_TRAILER);
                ArtifactFile {
                    file_name: artifact.file_name,
                    body: Bytes::from(body),
                }
            })
            .collect();

        self.upload_artifacts(&artifacts_dir, &corrupted).await?;
        warn!(
            component = %packaged.name,
            files = corrupted.len(),
            "Uploaded corrupted artifacts"
        );
        Ok(corrupted.len())
    }

    fn load_version(&self, name: &str, version: &str) -> Result<LoadedVersion, HarnessError> {
        let definition = ComponentDefinition::locate(&self.settings.components_dir, name, version)?;
        let template = recipe_from_template(&definition.recipe_path, name, version)?;
        let artifacts = read_artifacts(&definition)?;
        debug!(
            component = name,
            version,
            recipe = %definition.recipe_path.display(),
            artifacts = artifacts.len(),
            "Loaded component definition"
        );
        Ok(LoadedVersion {
            template,
            artifacts,
        })
    }

    /// `<prefix>/<suffix>/<version>`, or `<prefix>/<version>` with the random prefix off.
    fn artifacts_dir(&self, suffix: &RandomSuffix, version: &str) -> String {
        let prefix = self.settings.artifact_prefix.trim_end_matches('/');
        if self.settings.random_artifact_prefix {
            format!("{prefix}/{suffix}/{version}")
        } else {
            format!("{prefix}/{version}")
        }
    }

    fn remember_artifacts_dir(&self, cloud_name: &str, version: &str, artifacts_dir: &str) {
        self.artifact_dirs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert((cloud_name.to_string(), version.to_string()), artifacts_dir.to_string());
    }

    async fn upload_artifacts(&self, artifacts_dir: &str, artifacts: &[ArtifactFile]) -> Result<(), HarnessError> {
        for artifact in artifacts {
            let key = ObjectKey::join(artifacts_dir, &artifact.file_name)?;
            self.blobs
                .put_object(&self.settings.bucket, &key, artifact.body.clone())
                .await?;
            self.ledger.record_blob(self.settings.bucket.clone(), key.clone());
            debug!(bucket = %self.settings.bucket, key = %key, bytes = artifact.body.len(), "Artifact uploaded");
        }
        Ok(())
    }

    /// Register one rendered recipe, retrying while its artifacts are not yet visible.
    async fn register(&self, recipe: &RenderedRecipe) -> Result<ComponentArn, HarnessError> {
        let body = recipe.to_json_bytes()?;
        let deployments = self.deployments.as_ref();
        let body = body.as_slice();

        let result = self
            .settings
            .registration
            .run(
                self.clock.as_ref(),
                "create_component_version",
                move |_| async move { deployments.create_component_version(body).await },
                CloudError::is_artifact_lag,
            )
            .await;

        let registered = match result {
            Ok(registered) => registered,
            Err(RetryError::Permanent(CloudError::Conflict(message))) => {
                return Err(HarnessError::VersionConflict {
                    name: recipe.name.clone(),
                    version: recipe.version.clone(),
                    message,
                });
            }
            Err(RetryError::Permanent(e)) => return Err(e.into()),
            Err(RetryError::Exhausted { attempts, last }) => {
                return Err(HarnessError::ArtifactsNotAccessible {
                    component: recipe.name.clone(),
                    attempts,
                    source: last,
                });
            }
        };

        self.ledger.record_component(registered.arn.clone());
        info!(
            component = %registered.name,
            version = %registered.version,
            arn = %registered.arn,
            "Component version registered"
        );

        self.await_deployable(&registered.arn).await;
        Ok(registered.arn)
    }

    /// Poll registration state until deployable. Giving up is logged, not raised.
    async fn await_deployable(&self, arn: &ComponentArn) {
        let policy = self.settings.readiness;
        let attempts = policy.max_attempts.max(1);

        for attempt in 1..=attempts {
            match self.deployments.describe_component(arn).await {
                Ok(state) if state.is_deployable() => {
                    debug!(arn = %arn, attempt, "Component deployable");
                    return;
                }
                Ok(state) => debug!(arn = %arn, attempt, state = %state, "Component not yet deployable"),
                Err(e) => debug!(arn = %arn, attempt, error = %e, "Describe component failed"),
            }
            if attempt < attempts {
                self.clock.sleep(policy.interval).await;
            }
        }

        warn!(arn = %arn, attempts, "Component did not become deployable; continuing");
    }
}

fn read_artifacts(definition: &ComponentDefinition) -> Result<Vec<ArtifactFile>, HarnessError> {
    definition
        .artifact_files()?
        .into_iter()
        .map(|path| {
            let body = std::fs::read(&path).map_err(|e| HarnessError::not_found(&path, e))?;
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            Ok(ArtifactFile {
                file_name,
                body: Bytes::from(body),
            })
        })
        .collect()
}
