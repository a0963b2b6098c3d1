//! Shared test utilities for configuration storage testing.
//!
//! Feature-gated behind `testutil` so it never leaks into production builds.
//!
//! ```toml
//! [dev-dependencies]
//! iamsys-storage = { path = "../storage", features = ["testutil"] }
//! ```
//!
//! ```no_run
//! // Requires the `testutil` feature to be enabled.
//! use iamsys_storage::testutil::{coordination_config_store, object_config_store};
//! ```

use std::{sync::Arc, time::Duration};

use crate::{
    backoff::BackoffConfig, config_store::ConfigStore, error::StorageResult,
    memory::MemoryCoordinationStore, object::MemoryObjectLayer,
};

/// A [`ConfigStore`] over a fresh [`MemoryObjectLayer`], plus the layer for fault injection.
#[must_use]
pub fn object_config_store() -> (ConfigStore, MemoryObjectLayer) {
    let layer = MemoryObjectLayer::new();
    (ConfigStore::Object(Arc::new(layer.clone())), layer)
}

/// A [`ConfigStore`] over a fresh [`MemoryCoordinationStore`], plus the store itself.
///
/// Must be called from within a Tokio runtime.
#[must_use]
pub fn coordination_config_store() -> (ConfigStore, MemoryCoordinationStore) {
    let store = MemoryCoordinationStore::new();
    (ConfigStore::Coordination(Arc::new(store.clone())), store)
}

/// A backoff schedule short enough for tests to observe several reconnects.
#[must_use]
pub fn fast_backoff() -> BackoffConfig {
    BackoffConfig::builder()
        .initial_backoff(Duration::from_millis(5))
        .max_backoff(Duration::from_millis(25))
        .build()
}

/// Polls `condition` every 10ms until it holds.
///
/// # Panics
///
/// Panics if the condition does not hold within two seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 2s");
}

/// Assert that a [`StorageResult`] is an `Err` matching the given
/// [`StorageError`](crate::StorageError) variant.
///
/// # Examples
///
/// ```no_run
/// // Requires the `testutil` feature to be enabled.
/// use iamsys_storage::{StorageError, StorageResult, assert_storage_error};
///
/// let result: StorageResult<()> = Err(StorageError::not_found("missing"));
/// assert_storage_error!(result, NotFound);
/// ```
#[macro_export]
macro_rules! assert_storage_error {
    ($result:expr, $variant:ident) => {
        assert!(
            matches!($result, Err($crate::error::StorageError::$variant { .. })),
            "expected StorageError::{}, got: {:?}",
            stringify!($variant),
            $result,
        );
    };
    ($result:expr, $variant:ident, $msg:expr) => {
        assert!(
            matches!($result, Err($crate::error::StorageError::$variant { .. })),
            "{}: expected StorageError::{}, got: {:?}",
            $msg,
            stringify!($variant),
            $result,
        );
    };
}

/// Helper to verify that a result is a `NotFound` error.
pub fn is_not_found<T>(result: &StorageResult<T>) -> bool {
    matches!(result, Err(err) if err.is_not_found())
}
