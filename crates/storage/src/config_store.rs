//! Backend-agnostic access to named configuration documents.
//!
//! [`ConfigStore`] hides whether documents live in the quorum-replicated
//! object store or in a coordination store. Both backends report the same
//! outcomes:
//!
//! | Situation | Result |
//! |-----------|--------|
//! | never written | [`StorageError::NotFound`] |
//! | unreadable under the current read quorum | [`StorageError::NotFound`] |
//! | partial body read | [`StorageError::NotFound`] |
//! | zero-length payload | [`StorageError::NotFound`] |
//! | write quorum not met | [`StorageError::QuorumInsufficient`] |
//! | checksum mismatch on write | [`StorageError::ChecksumMismatch`] |
//!
//! Only the coordination backend has a change stream, so
//! [`watch`](ConfigStore::watch) on the object backend returns an inert
//! handle.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use fail::fail_point;

use crate::{
    backoff::BackoffConfig,
    coordination::CoordinationStore,
    error::{StorageError, StorageResult},
    object::{META_BUCKET, ObjectError, ObjectLayer, PutPayload},
    types::{WatchEvent, WatchScope},
    watch::{WatchHandle, WatchHandler, spawn_watch},
};

/// Notified when a watched configuration document is created or replaced.
#[async_trait]
pub trait ChangeListener: Send + Sync + 'static {
    /// Called with the path of the changed document.
    async fn on_change(&self, path: &str);
}

/// Configuration document storage over one of two backends.
#[derive(Clone)]
pub enum ConfigStore {
    /// Documents are objects in [`META_BUCKET`] on the quorum object store.
    Object(Arc<dyn ObjectLayer>),
    /// Documents are keys in a coordination store.
    Coordination(Arc<dyn CoordinationStore>),
}

impl std::fmt::Debug for ConfigStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Object(_) => f.write_str("ConfigStore::Object"),
            Self::Coordination(_) => f.write_str("ConfigStore::Coordination"),
        }
    }
}

impl ConfigStore {
    /// Returns the coordination store when that backend is active.
    #[must_use]
    pub fn coordination(&self) -> Option<Arc<dyn CoordinationStore>> {
        match self {
            Self::Object(_) => None,
            Self::Coordination(store) => Some(Arc::clone(store)),
        }
    }

    /// Returns `true` if documents are held in a coordination store.
    #[must_use]
    pub fn is_distributed(&self) -> bool {
        matches!(self, Self::Coordination(_))
    }

    /// Reads the document at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] when the document is absent,
    /// unreadable under quorum, or empty.
    #[tracing::instrument(skip(self), fields(backend = ?self))]
    pub async fn get(&self, path: &str) -> StorageResult<Bytes> {
        fail_point!("config-store-before-get", |_| {
            Err(StorageError::connection("injected config store failure"))
        });

        let data = match self {
            Self::Object(layer) => {
                layer.get_object(META_BUCKET, path).await.map_err(|e| map_read_error(path, e))?
            },
            Self::Coordination(store) => {
                store.get(path).await?.ok_or_else(|| StorageError::not_found(path))?
            },
        };

        if data.is_empty() {
            tracing::debug!("empty configuration payload treated as absent");
            return Err(StorageError::not_found(path));
        }
        Ok(data)
    }

    /// Writes `data` to `path`.
    ///
    /// On the object backend the payload is checksummed and written through
    /// the quorum write path. A checksum mismatch is returned as-is and not
    /// retried.
    #[tracing::instrument(skip(self, data), fields(backend = ?self, len = data.len()))]
    pub async fn put(&self, path: &str, data: Vec<u8>) -> StorageResult<()> {
        match self {
            Self::Object(layer) => {
                let payload = PutPayload::new(data);
                layer
                    .put_object(META_BUCKET, path, payload)
                    .await
                    .map(|_| ())
                    .map_err(|e| map_write_error(path, e))
            },
            Self::Coordination(store) => store.put(path, data).await,
        }
    }

    /// Returns whether a non-empty document exists at `path`.
    #[tracing::instrument(skip(self), fields(backend = ?self))]
    pub async fn exists(&self, path: &str) -> StorageResult<bool> {
        let exists = match self {
            Self::Object(layer) => match layer.get_object_info(META_BUCKET, path).await {
                Ok(info) => info.size > 0,
                Err(err) => match map_read_error(path, err) {
                    StorageError::NotFound { .. } => false,
                    other => return Err(other),
                },
            },
            Self::Coordination(store) => store.get(path).await?.is_some_and(|v| !v.is_empty()),
        };
        Ok(exists)
    }

    /// Subscribes `listener` to create and modify events on `path`.
    ///
    /// Delete events are ignored. After a reconnect the listener is invoked
    /// once so it can pick up changes made while the stream was down.
    #[must_use = "dropping the handle cancels the watch"]
    pub fn watch(
        &self,
        path: &str,
        backoff: BackoffConfig,
        listener: Arc<dyn ChangeListener>,
    ) -> WatchHandle {
        match self {
            Self::Object(_) => {
                tracing::debug!(path, "object backend has no change stream; watch is inert");
                WatchHandle::inert()
            },
            Self::Coordination(store) => spawn_watch(
                Arc::clone(store),
                path,
                WatchScope::Key,
                backoff,
                Arc::new(DocumentWatch { path: path.to_owned(), listener }),
            ),
        }
    }
}

struct DocumentWatch {
    path: String,
    listener: Arc<dyn ChangeListener>,
}

#[async_trait]
impl WatchHandler for DocumentWatch {
    async fn on_event(&self, event: WatchEvent) {
        if event.is_upsert() && event.key == self.path {
            self.listener.on_change(&self.path).await;
        }
    }

    async fn on_resubscribe(&self) {
        self.listener.on_change(&self.path).await;
    }
}

fn map_read_error(path: &str, err: ObjectError) -> StorageError {
    match err {
        ObjectError::ObjectNotFound { .. }
        | ObjectError::IncompleteBody { .. }
        | ObjectError::InsufficientReadQuorum => {
            tracing::debug!(path, error = %err, "configuration unreadable, treating as not found");
            StorageError::not_found(path)
        },
        other => map_write_error(path, other),
    }
}

fn map_write_error(path: &str, err: ObjectError) -> StorageError {
    match err {
        ObjectError::InsufficientWriteQuorum => {
            StorageError::quorum_insufficient(format!("write of {path}"))
        },
        ObjectError::ChecksumMismatch { expected, actual } => {
            StorageError::checksum_mismatch(expected, actual)
        },
        other => {
            StorageError::internal_with_source(format!("object layer failure on {path}"), other)
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::{
        MemoryCoordinationStore,
        object::{MemoryObjectLayer, ReadFault, WriteFault},
    };

    const PATH: &str = "config/iam/iam.json";

    fn object_store() -> (ConfigStore, MemoryObjectLayer) {
        let layer = MemoryObjectLayer::new();
        (ConfigStore::Object(Arc::new(layer.clone())), layer)
    }

    fn coordination_store() -> (ConfigStore, MemoryCoordinationStore) {
        let store = MemoryCoordinationStore::new();
        (ConfigStore::Coordination(Arc::new(store.clone())), store)
    }

    #[tokio::test]
    async fn test_round_trip_on_both_backends() {
        for store in [object_store().0, coordination_store().0] {
            store.put(PATH, b"{\"version\":\"1\"}".to_vec()).await.unwrap();
            assert_eq!(store.get(PATH).await.unwrap(), Bytes::from("{\"version\":\"1\"}"));
            assert!(store.exists(PATH).await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_missing_is_not_found_on_both_backends() {
        for store in [object_store().0, coordination_store().0] {
            assert!(store.get(PATH).await.unwrap_err().is_not_found());
            assert!(!store.exists(PATH).await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_empty_payload_is_not_found_on_both_backends() {
        for store in [object_store().0, coordination_store().0] {
            store.put(PATH, Vec::new()).await.unwrap();
            assert!(store.get(PATH).await.unwrap_err().is_not_found());
            assert!(!store.exists(PATH).await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_quorum_and_partial_reads_fold_into_not_found() {
        let (store, layer) = object_store();
        store.put(PATH, b"{}".to_vec()).await.unwrap();

        for fault in [ReadFault::IncompleteBody, ReadFault::InsufficientReadQuorum] {
            layer.inject_read_fault(fault);
            assert!(store.get(PATH).await.unwrap_err().is_not_found(), "{fault:?}");
        }

        layer.inject_read_fault(ReadFault::InsufficientReadQuorum);
        assert!(!store.exists(PATH).await.unwrap());
    }

    #[tokio::test]
    async fn test_io_read_failure_is_surfaced() {
        let (store, layer) = object_store();
        layer.inject_read_fault(ReadFault::Io);
        let err = store.get(PATH).await.unwrap_err();
        assert!(matches!(err, StorageError::Internal { .. }), "got {err:?}");
        assert!(store.exists(PATH).await.is_err());
    }

    #[tokio::test]
    async fn test_write_quorum_failure() {
        let (store, layer) = object_store();
        layer.inject_write_fault(WriteFault::InsufficientWriteQuorum);
        let err = store.put(PATH, b"{}".to_vec()).await.unwrap_err();
        assert!(matches!(err, StorageError::QuorumInsufficient { .. }));
    }

    #[test]
    fn test_checksum_mismatch_maps_to_hard_error() {
        let err = map_write_error(
            PATH,
            ObjectError::ChecksumMismatch { expected: "aa".into(), actual: "bb".into() },
        );
        assert!(matches!(err, StorageError::ChecksumMismatch { .. }));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_object_watch_is_inert() {
        struct Never;
        #[async_trait]
        impl ChangeListener for Never {
            async fn on_change(&self, _path: &str) {
                panic!("object backend must not deliver changes");
            }
        }

        let (store, _) = object_store();
        let handle = store.watch(PATH, BackoffConfig::default(), Arc::new(Never));
        assert!(!handle.is_active());
        assert!(!store.is_distributed());
        assert!(store.coordination().is_none());
    }
}
