//! Distributed coordination store abstraction.
//!
//! A coordination store offers atomic single-key get/put, prefix listing,
//! lease-bound keys that the store deletes server-side when the lease runs
//! out, and change-watch streams. It backs the configuration document when
//! present and is the authoritative home of distributed credential records.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::{
    error::StorageResult,
    types::{KeyValue, WatchEvent, WatchScope},
};

/// Receiving half of a watch subscription.
///
/// [`next`](Self::next) yields events in the order the store applied them
/// and returns `None` once the stream has closed (for example after a
/// connection drop). A closed watcher never yields again; callers
/// resubscribe to resume.
#[derive(Debug)]
pub struct Watcher {
    rx: mpsc::UnboundedReceiver<WatchEvent>,
}

impl Watcher {
    /// Wraps the receiving side of an event channel.
    #[must_use]
    pub fn new(rx: mpsc::UnboundedReceiver<WatchEvent>) -> Self {
        Self { rx }
    }

    /// Waits for the next event, or `None` when the stream has ended.
    pub async fn next(&mut self) -> Option<WatchEvent> {
        self.rx.recv().await
    }
}

/// Operations the IAM subsystem needs from a coordination store.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Reads a single key.
    #[must_use = "reads may fail and errors must be handled"]
    async fn get(&self, key: &str) -> StorageResult<Option<Bytes>>;

    /// Lists every live key starting with `prefix`, in key order.
    #[must_use = "reads may fail and errors must be handled"]
    async fn get_prefix(&self, prefix: &str) -> StorageResult<Vec<KeyValue>>;

    /// Writes a key without a lease. Any lease previously attached is dropped.
    #[must_use = "writes may fail and errors must be handled"]
    async fn put(&self, key: &str, value: Vec<u8>) -> StorageResult<()>;

    /// Writes a key bound to a fresh lease of length `ttl`.
    ///
    /// The store deletes the key when the lease expires and emits a delete
    /// event to watchers.
    #[must_use = "writes may fail and errors must be handled"]
    async fn put_with_lease(&self, key: &str, value: Vec<u8>, ttl: Duration) -> StorageResult<()>;

    /// Deletes a key. Deleting an absent key succeeds.
    #[must_use = "deletes may fail and errors must be handled"]
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Opens a change stream for `key`, or for every key under it when
    /// `scope` is [`WatchScope::Prefix`].
    #[must_use = "the watcher must be polled to observe changes"]
    async fn watch(&self, key: &str, scope: WatchScope) -> StorageResult<Watcher>;
}
