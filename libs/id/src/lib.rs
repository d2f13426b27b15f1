//! # uat-id
//!
//! Typed names for every cloud resource the acceptance harness creates or
//! reads, plus the random-suffix scheme that keeps those names unique.
//!
//! ## Design Principles
//!
//! - Names are opaque strings issued by the cloud (ARNs, deployment ids) or
//!   chosen by the harness (component and thing-group names)
//! - Each resource kind has its own type so a deployment id can never be
//!   passed where a component ARN is expected
//! - Deployment targets are parsed from and rendered to IoT ARNs
//!
//! ## Uniqueness
//!
//! Concurrent test runs share one cloud account and there is no lock between
//! them. Every harness-chosen name therefore carries a [`RandomSuffix`]:
//!
//! - `HelloWorld` becomes `HelloWorld-01hv4z2wqxkjnm8gpqy6vbkc3d`
//! - `uat-group` becomes `uat-group-01hv4z3mxnkpqr9hstz7wcld4e`
//!
//! The suffix is a lowercase ULID (80 bits of randomness).

mod error;
mod macros;
mod suffix;
mod target;
mod types;

pub use error::IdError;
pub use suffix::RandomSuffix;
pub use target::{TargetArn, TargetKind};
pub use types::*;
