//! # IAMSys IAM
//!
//! Identity and access management configuration for an object storage
//! server: one JSON document describing where identities and policies come
//! from, kept in a shared [`ConfigStore`](iamsys_storage::ConfigStore) and
//! applied to every node.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          IamSys                             │
//! │     (init, is_allowed, users, policies, token exchange)     │
//! ├───────────────┬──────────────────┬──────────────────────────┤
//! │ PolicyEngine  │ CredentialStore  │ TokenValidator (openid)  │
//! ├───────────────┴──────────────────┴──────────────────────────┤
//! │                    IamConfigManager                         │
//! │          (load, validate, bootstrap, save)                  │
//! ├─────────────────────────────────────────────────────────────┤
//! │                       ConfigStore                           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The document is re-applied when the store reports a change and on a
//! fixed interval. Re-application only adds and updates; it never removes
//! accounts that disappeared from the document.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use iamsys_iam::{BootstrapOptions, IamSys, IamSysConfig, policy::Args};
//! use iamsys_storage::{ConfigStore, MemoryCoordinationStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = ConfigStore::Coordination(Arc::new(MemoryCoordinationStore::new()));
//! let iam = IamSys::new(store, IamSysConfig::default(), BootstrapOptions::from_env()?);
//! iam.init().await?;
//!
//! let args = Args::builder().account("alice").action("s3:PutObject").bucket("logs").build();
//! if !iam.is_allowed(&args).await {
//!     println!("access denied");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - **`testutil`**: Enables the `testutil` module with fixtures, a fake
//!   decision service and the `assert_iam_error!` macro.
//! - **`failpoints`**: Activates the `decision-before-request` fail-point
//!   along with those of `iamsys-storage`.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Subsystem configuration and bootstrap inputs.
pub mod config;
/// Access key credentials.
pub mod credential;
pub mod credential_store;
pub mod document;
mod duplicate_keys;
/// IAM error types.
pub mod error;
pub mod manager;
pub mod policy;
pub mod sys;
/// Shared test utilities.
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used, clippy::panic)]
pub mod testutil;

pub use config::{BootstrapOptions, DEFAULT_CONFIG_PATH, IamSysConfig};
pub use credential::Credential;
pub use credential_store::{CredentialMap, CredentialStore};
pub use document::{IamDocument, IdentityType, PolicyType};
pub use duplicate_keys::check_duplicate_keys;
pub use error::{IamError, Result};
pub use manager::{IamConfigManager, MAX_CONFIG_SIZE};
pub use policy::{Args, Policy, PolicyEngine};
pub use sys::{IamState, IamSys};
