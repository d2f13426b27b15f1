//! Deployment orchestration and resource-lifecycle engine for edge runtime
//! acceptance tests.
//!
//! A test builds a [`TestHarness`] from a [`HarnessConfig`], a set of
//! [`CloudClients`] and a [`Clock`](uat_wait::Clock), then:
//!
//! 1. packages local components with the [`Packager`]
//! 2. submits deployments with the [`DeploymentSubmitter`]
//! 3. waits for a verdict with the [`StatusPoller`]
//! 4. tears everything down through the [`ResourceLedger`]
//!
//! ```ignore
//! let harness = TestHarness::new(config, CloudClients::from_single(cloud), clock)?;
//! let hello = harness.packager().package("HelloWorld", &["1.0.0"]).await?;
//! let (_, outcome) = harness.deploy_and_wait(&target, &[hello]).await?;
//! assert_eq!(outcome, DeploymentOutcome::Succeeded);
//! harness.teardown().await;
//! ```
//!
//! Everything runs sequentially on the caller's task. Every wait is bounded
//! by a budget or an attempt count.

pub mod cloud;
pub mod command;
pub mod config;
pub mod error;
pub mod fake;
pub mod groups;
pub mod harness;
pub mod ledger;
pub mod local;
pub mod model;
pub mod packager;
pub mod poller;
pub mod probe;
pub mod recipe;
pub mod submitter;

#[cfg(feature = "aws")]
pub mod aws;

pub use cloud::{BlobStore, CloudClients, DeploymentService, DeviceDirectory};
pub use config::HarnessConfig;
pub use error::{CloudError, HarnessError};
pub use harness::TestHarness;
pub use ledger::{LedgerEntry, ResourceLedger, TeardownReport};
pub use model::{ComponentDeploymentInfo, DeploymentOutcome, DeploymentRecord, MergeConfig};
pub use packager::Packager;
pub use poller::StatusPoller;
pub use submitter::DeploymentSubmitter;
