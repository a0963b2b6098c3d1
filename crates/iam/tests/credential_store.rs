//! Credential distribution between nodes sharing one coordination store.
#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use iamsys_iam::{Credential, CredentialStore};
use iamsys_storage::{
    CoordinationStore, MemoryCoordinationStore,
    testutil::{fast_backoff, wait_until},
};

async fn node(store: &MemoryCoordinationStore) -> CredentialStore {
    CredentialStore::distributed(Arc::new(store.clone()), fast_backoff())
        .await
        .expect("distributed store")
}

#[tokio::test]
async fn concurrent_sets_all_land_everywhere() {
    let shared = MemoryCoordinationStore::new();
    let writer = Arc::new(node(&shared).await);
    let reader = node(&shared).await;

    let tasks: Vec<_> = (0..32)
        .map(|i| {
            let writer = Arc::clone(&writer);
            tokio::spawn(async move {
                writer.set(Credential::new(format!("AK{i:03}"), format!("secret-{i}"))).await
            })
        })
        .collect();
    for task in tasks {
        task.await.expect("join").expect("set");
    }

    assert_eq!(writer.entries().len(), 32);
    assert_eq!(shared.get_prefix("users/").await.unwrap().len(), 32);
    wait_until(|| reader.entries().len() == 32).await;
    assert_eq!(reader.get("AK017").unwrap().secret_key, "secret-17");

    writer.shutdown().await;
    reader.shutdown().await;
}

#[tokio::test]
async fn late_joiner_preloads_existing_records() {
    let shared = MemoryCoordinationStore::new();
    let first = node(&shared).await;
    first.set(Credential::new("AKPERM", "permanent")).await.unwrap();
    let expiry = Utc::now() + ChronoDuration::hours(1);
    first.set(Credential::new("AKTEMP", "temporary").with_expiration(expiry)).await.unwrap();

    let second = node(&shared).await;
    assert!(second.get("AKPERM").is_some());
    assert_eq!(second.get("AKTEMP").unwrap().expiration.unwrap().timestamp(), expiry.timestamp());

    first.shutdown().await;
    second.shutdown().await;
}

#[tokio::test]
async fn record_written_right_after_join_reaches_mirror() {
    let shared = MemoryCoordinationStore::new();
    let joiner = node(&shared).await;

    shared
        .put("users/AKREMOTE", serde_json::to_vec(&Credential::new("AKREMOTE", "s")).unwrap())
        .await
        .unwrap();

    wait_until(|| joiner.get("AKREMOTE").is_some()).await;
    assert_eq!(shared.watcher_count(), 1);
    joiner.shutdown().await;
}

#[tokio::test]
async fn delete_and_lease_expiry_propagate() {
    let shared = MemoryCoordinationStore::new();
    let a = node(&shared).await;
    let b = node(&shared).await;

    a.set(Credential::new("AKGONE", "s")).await.unwrap();
    let lease_end = Utc::now() + ChronoDuration::milliseconds(500);
    a.set(Credential::new("AKLEASE", "s").with_expiration(lease_end)).await.unwrap();
    wait_until(|| b.entries().contains("AKGONE") && b.entries().contains("AKLEASE")).await;

    a.delete("AKGONE").await.unwrap();
    wait_until(|| !b.entries().contains("AKGONE")).await;

    wait_until(|| {
        shared.expire_now();
        !b.entries().contains("AKLEASE")
    })
    .await;
    assert!(a.get("AKLEASE").is_none());

    a.shutdown().await;
    b.shutdown().await;
}

#[tokio::test]
async fn resubscribe_catches_up_on_missed_writes() {
    let shared = MemoryCoordinationStore::new();
    let reader = node(&shared).await;
    wait_until(|| shared.watcher_count() == 1).await;

    shared.close_watchers();
    shared.put("users/AKMISSED", serde_json::to_vec(&Credential::new("AKMISSED", "s")).unwrap())
        .await
        .unwrap();

    wait_until(|| reader.get("AKMISSED").is_some()).await;
    reader.shutdown().await;
}
