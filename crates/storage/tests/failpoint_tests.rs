#![cfg(feature = "failpoints")]
#![allow(clippy::expect_used, clippy::panic)]
//! Integration tests for fail-point injection.
//!
//! These tests require the `failpoints` feature:
//! ```bash
//! cargo test -p iamsys-storage --features failpoints --test failpoint_tests
//! ```

use std::sync::Arc;

use iamsys_storage::{
    StorageError, WatchEvent, WatchHandler, WatchScope, spawn_watch,
    testutil::{coordination_config_store, fast_backoff, wait_until},
};

struct Ignore;

#[async_trait::async_trait]
impl WatchHandler for Ignore {
    async fn on_event(&self, _event: WatchEvent) {}
}

#[tokio::test]
async fn config_store_get_failpoint_returns_connection_error() {
    let scenario = fail::FailScenario::setup();
    let (store, _) = coordination_config_store();
    store.put("config/iam/iam.json", b"{}".to_vec()).await.expect("put");

    fail::cfg("config-store-before-get", "return").expect("failed to configure fail point");
    let result = store.get("config/iam/iam.json").await;
    assert!(matches!(result, Err(StorageError::Connection { .. })), "got {result:?}");

    scenario.teardown();
}

#[tokio::test]
async fn config_store_get_without_failpoint_succeeds() {
    let scenario = fail::FailScenario::setup();
    let (store, _) = coordination_config_store();
    store.put("config/iam/iam.json", b"{}".to_vec()).await.expect("put");

    assert!(store.get("config/iam/iam.json").await.is_ok());

    scenario.teardown();
}

#[tokio::test]
async fn watch_resubscribe_failpoint_stops_task() {
    let scenario = fail::FailScenario::setup();
    let (_, memory) = coordination_config_store();
    let handle = spawn_watch(
        Arc::new(memory.clone()),
        "users/",
        WatchScope::Prefix,
        fast_backoff(),
        Arc::new(Ignore),
    );
    wait_until(|| memory.watcher_count() == 1).await;

    fail::cfg("watch-before-resubscribe", "return").expect("failed to configure fail point");
    memory.close_watchers();
    wait_until(|| !handle.is_active()).await;
    assert_eq!(memory.watcher_count(), 0);

    scenario.teardown();
}
