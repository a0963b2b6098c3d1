//! Configuration storage for the IAM subsystem.
//!
//! This crate provides [`ConfigStore`], which reads, writes and watches named
//! configuration documents over either of two backends:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │               IAM configuration manager                     │
//! ├─────────────────────────────────────────────────────────────┤
//! │                      ConfigStore                            │
//! │            (get, put, exists, watch)                        │
//! ├──────────────────────────────┬──────────────────────────────┤
//! │         ObjectLayer          │      CoordinationStore       │
//! │  (quorum-replicated objects) │ (leases, prefix get, watch)  │
//! └──────────────────────────────┴──────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//!
//! use iamsys_storage::{ConfigStore, MemoryObjectLayer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = ConfigStore::Object(Arc::new(MemoryObjectLayer::new()));
//!
//!     assert!(store.get("config/iam/iam.json").await.unwrap_err().is_not_found());
//!
//!     store.put("config/iam/iam.json", br#"{"version":"1"}"#.to_vec()).await?;
//!     assert!(store.exists("config/iam/iam.json").await?);
//!     Ok(())
//! }
//! ```
//!
//! # Available Backends
//!
//! | Backend | Use Case | Change stream |
//! |---------|----------|---------------|
//! | [`ConfigStore::Object`] over an [`ObjectLayer`] | Clustered object storage | No |
//! | [`ConfigStore::Coordination`] over a [`CoordinationStore`] | Deployments with a coordination service | Yes |
//!
//! [`MemoryObjectLayer`] and [`MemoryCoordinationStore`] are in-process
//! implementations of each boundary.
//!
//! # Feature Flags
//!
//! - **`testutil`**: Enables the `testutil` module with store factories and assertion macros.
//! - **`failpoints`**: Activates `fail` fail-points (`config-store-before-get`,
//!   `watch-before-resubscribe`).

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod backoff;
pub mod config_store;
pub mod coordination;
pub mod error;
pub mod memory;
pub mod object;
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used, clippy::panic)]
pub mod testutil;
pub mod types;
pub mod watch;

// Re-export primary types at crate root for convenience
pub use backoff::BackoffConfig;
pub use config_store::{ChangeListener, ConfigStore};
pub use coordination::{CoordinationStore, Watcher};
pub use error::{BoxError, StorageError, StorageResult};
pub use memory::MemoryCoordinationStore;
pub use object::{
    META_BUCKET, MemoryObjectLayer, ObjectError, ObjectInfo, ObjectLayer, PutPayload, ReadFault,
    WriteFault, sha256_hex,
};
pub use types::{KeyValue, WatchEvent, WatchEventKind, WatchScope};
pub use watch::{WatchHandle, WatchHandler, spawn_watch, spawn_watch_from};
