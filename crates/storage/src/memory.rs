//! In-memory coordination store.
//!
//! [`MemoryCoordinationStore`] implements [`CoordinationStore`] for tests and
//! single-node deployments. It supports leases, prefix listing and watch
//! streams with create/modify/delete events.
//!
//! # Limitations
//!
//! - Data is not persisted; all data is lost when the process exits
//! - Lease cleanup runs every second, so server-side expiry is not precise.
//!   Reads filter expired keys immediately.

use std::{collections::BTreeMap, ops::Bound, sync::Arc, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tokio::{
    select,
    sync::{mpsc, watch},
    time::{Instant, sleep},
};

use crate::{
    coordination::{CoordinationStore, Watcher},
    error::StorageResult,
    types::{KeyValue, WatchEvent, WatchEventKind, WatchScope},
};

/// Holds the shutdown signal sender. When dropped, the watch channel
/// closes and the lease cleanup task exits.
struct ShutdownGuard {
    shutdown_tx: watch::Sender<()>,
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
    }
}

struct Subscriber {
    key: String,
    scope: WatchScope,
    tx: mpsc::UnboundedSender<WatchEvent>,
}

/// In-memory coordination store.
///
/// # Cloning
///
/// Clones share the same data, leases and subscribers.
///
/// # Shutdown
///
/// The lease cleanup task stops when the last clone is dropped or when
/// [`shutdown`](Self::shutdown) is called.
#[derive(Clone)]
pub struct MemoryCoordinationStore {
    data: Arc<RwLock<BTreeMap<String, Bytes>>>,
    leases: Arc<RwLock<BTreeMap<String, Instant>>>,
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
    shutdown_guard: Arc<ShutdownGuard>,
}

impl MemoryCoordinationStore {
    /// Creates an empty store and spawns its lease cleanup task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new() -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(());
        let store = Self {
            data: Arc::new(RwLock::new(BTreeMap::new())),
            leases: Arc::new(RwLock::new(BTreeMap::new())),
            subscribers: Arc::new(Mutex::new(Vec::new())),
            shutdown_guard: Arc::new(ShutdownGuard { shutdown_tx }),
        };

        let weak_data = Arc::downgrade(&store.data);
        let weak_leases = Arc::downgrade(&store.leases);
        let weak_subscribers = Arc::downgrade(&store.subscribers);
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown_rx;
            loop {
                select! {
                    _ = sleep(Duration::from_secs(1)) => {}
                    _ = shutdown_rx.changed() => return,
                }
                let (Some(data), Some(leases), Some(subscribers)) =
                    (weak_data.upgrade(), weak_leases.upgrade(), weak_subscribers.upgrade())
                else {
                    return;
                };
                expire_leases(&data, &leases, &subscribers);
            }
        });

        store
    }

    /// Signals the lease cleanup task to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_guard.shutdown_tx.send(());
    }

    /// Ends every open watch stream, as a dropped connection would.
    ///
    /// Subsequent calls to [`watch`](CoordinationStore::watch) succeed and
    /// observe new writes.
    pub fn close_watchers(&self) {
        self.subscribers.lock().clear();
    }

    /// Number of watch streams whose receiver is still alive.
    #[must_use]
    pub fn watcher_count(&self) -> usize {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|s| !s.tx.is_closed());
        subscribers.len()
    }

    /// Runs one lease expiry pass immediately.
    pub fn expire_now(&self) {
        expire_leases(&self.data, &self.leases, &self.subscribers);
    }

    fn is_expired(&self, key: &str) -> bool {
        self.leases.read().get(key).is_some_and(|deadline| *deadline <= Instant::now())
    }

    fn write(&self, key: &str, value: Vec<u8>, lease: Option<Instant>) {
        let mut data = self.data.write();
        let mut leases = self.leases.write();

        let existed = data.contains_key(key)
            && leases.get(key).is_none_or(|deadline| *deadline > Instant::now());
        let value = Bytes::from(value);
        data.insert(key.to_owned(), value.clone());
        match lease {
            Some(deadline) => leases.insert(key.to_owned(), deadline),
            None => leases.remove(key),
        };

        let kind = if existed { WatchEventKind::Modify } else { WatchEventKind::Create };
        notify(&self.subscribers, WatchEvent { kind, key: key.to_owned(), value });
    }
}

impl Default for MemoryCoordinationStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Delivers `event` to every matching subscriber, dropping closed ones.
fn notify(subscribers: &Mutex<Vec<Subscriber>>, event: WatchEvent) {
    subscribers.lock().retain(|s| {
        if !s.scope.matches(&s.key, &event.key) {
            return !s.tx.is_closed();
        }
        s.tx.send(event.clone()).is_ok()
    });
}

fn expire_leases(
    data: &RwLock<BTreeMap<String, Bytes>>,
    leases: &RwLock<BTreeMap<String, Instant>>,
    subscribers: &Mutex<Vec<Subscriber>>,
) {
    let now = Instant::now();
    let expired: Vec<String> = {
        let leases = leases.read();
        leases.iter().filter(|(_, deadline)| **deadline <= now).map(|(k, _)| k.clone()).collect()
    };
    if expired.is_empty() {
        return;
    }

    let mut data = data.write();
    let mut leases = leases.write();
    for key in expired {
        // A concurrent put may have renewed the lease since the scan.
        if leases.get(&key).is_some_and(|deadline| *deadline > now) {
            continue;
        }
        leases.remove(&key);
        if data.remove(&key).is_some() {
            tracing::debug!(key = %key, "lease expired");
            let event = WatchEvent { kind: WatchEventKind::Delete, key, value: Bytes::new() };
            notify(subscribers, event);
        }
    }
}

#[async_trait]
impl CoordinationStore for MemoryCoordinationStore {
    #[tracing::instrument(skip(self))]
    async fn get(&self, key: &str) -> StorageResult<Option<Bytes>> {
        if self.is_expired(key) {
            return Ok(None);
        }
        Ok(self.data.read().get(key).cloned())
    }

    #[tracing::instrument(skip(self))]
    async fn get_prefix(&self, prefix: &str) -> StorageResult<Vec<KeyValue>> {
        let data = self.data.read();
        let results = data
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(k, _)| k.starts_with(prefix))
            .filter(|(k, _)| !self.is_expired(k))
            .map(|(k, v)| KeyValue::new(k.clone(), v.clone()))
            .collect();
        Ok(results)
    }

    #[tracing::instrument(skip(self, value), fields(value_len = value.len()))]
    async fn put(&self, key: &str, value: Vec<u8>) -> StorageResult<()> {
        self.write(key, value, None);
        Ok(())
    }

    #[tracing::instrument(skip(self, value), fields(value_len = value.len()))]
    async fn put_with_lease(&self, key: &str, value: Vec<u8>, ttl: Duration) -> StorageResult<()> {
        self.write(key, value, Some(Instant::now() + ttl));
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn delete(&self, key: &str) -> StorageResult<()> {
        let mut data = self.data.write();
        let mut leases = self.leases.write();
        leases.remove(key);
        if data.remove(key).is_some() {
            let key = key.to_owned();
            let event = WatchEvent { kind: WatchEventKind::Delete, key, value: Bytes::new() };
            notify(&self.subscribers, event);
        }
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn watch(&self, key: &str, scope: WatchScope) -> StorageResult<Watcher> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(Subscriber { key: key.to_owned(), scope, tx });
        Ok(Watcher::new(rx))
    }
}
