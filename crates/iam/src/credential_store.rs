//! Live access-key-to-credential mapping.
//!
//! Without a coordination store, [`CredentialStore`] is a process-local map.
//! With one, the coordination store is authoritative: records live under
//! `users/<accessKey>`, temporary credentials carry a lease that expires
//! them server-side, and the in-memory map is a mirror kept current by a
//! prefix watch.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use chrono::Utc;
use iamsys_storage::{
    BackoffConfig, CoordinationStore, KeyValue, WatchEvent, WatchHandle, WatchHandler,
    WatchScope, spawn_watch_from,
};
use parking_lot::{Mutex, RwLock};

use crate::{
    credential::Credential,
    error::{IamError, Result},
};

/// Key prefix for credential records in the coordination store.
pub const USERS_PREFIX: &str = "users/";

/// Access key to credential, guarded by one reader/writer lock.
#[derive(Debug, Default)]
pub struct CredentialMap {
    inner: RwLock<HashMap<String, Credential>>,
}

impl CredentialMap {
    /// Inserts or replaces the entry for `credential.access_key`.
    pub fn upsert(&self, credential: Credential) {
        self.inner.write().insert(credential.access_key.clone(), credential);
    }

    /// Removes the entry for `access_key`.
    pub fn remove(&self, access_key: &str) -> Option<Credential> {
        self.inner.write().remove(access_key)
    }

    /// Returns the entry for `access_key` if it is currently valid.
    #[must_use]
    pub fn get_valid(&self, access_key: &str) -> Option<Credential> {
        let now = Utc::now();
        self.inner.read().get(access_key).filter(|c| c.is_valid_at(now)).cloned()
    }

    /// Returns `true` if an entry exists for `access_key`, valid or not.
    #[must_use]
    pub fn contains(&self, access_key: &str) -> bool {
        self.inner.read().contains_key(access_key)
    }

    /// Replaces every entry.
    pub fn replace_all(&self, entries: HashMap<String, Credential>) {
        *self.inner.write() = entries;
    }

    /// Number of entries, including expired ones not yet removed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Returns `true` if the map has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

struct Distributed {
    store: Arc<dyn CoordinationStore>,
    watch: Mutex<Option<WatchHandle>>,
}

/// Holds the live credentials.
pub struct CredentialStore {
    entries: Arc<CredentialMap>,
    distributed: Option<Distributed>,
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("entries", &self.entries.len())
            .field("distributed", &self.distributed.is_some())
            .finish()
    }
}

impl CredentialStore {
    /// A process-local store.
    #[must_use]
    pub fn local() -> Self {
        Self { entries: Arc::new(CredentialMap::default()), distributed: None }
    }

    /// A store backed by `store`.
    ///
    /// The prefix watch is opened first, then every record under
    /// [`USERS_PREFIX`] is loaded. Records are decoded strictly.
    ///
    /// # Errors
    ///
    /// Returns a transport error if subscribing or the listing fails, or
    /// [`IamError::Serialization`] if any record does not decode.
    #[tracing::instrument(skip(store, backoff))]
    pub async fn distributed(
        store: Arc<dyn CoordinationStore>,
        backoff: BackoffConfig,
    ) -> Result<Self> {
        let watcher = store.watch(USERS_PREFIX, WatchScope::Prefix).await?;
        let records = store.get_prefix(USERS_PREFIX).await?;
        let mut entries = HashMap::with_capacity(records.len());
        for record in records {
            let credential = Credential::from_record(&record.value).map_err(|e| {
                IamError::serialization_with_source(format!("credential record {}", record.key), e)
            })?;
            entries.insert(credential.access_key.clone(), credential);
        }
        tracing::debug!(count = entries.len(), "preloaded distributed credentials");

        let mirror = Arc::new(CredentialMap::default());
        mirror.replace_all(entries);

        let handler = Arc::new(CredentialWatch {
            store: Arc::clone(&store),
            mirror: Arc::clone(&mirror),
        });
        let handle = spawn_watch_from(
            Arc::clone(&store),
            USERS_PREFIX,
            WatchScope::Prefix,
            backoff,
            handler,
            watcher,
        );

        Ok(Self {
            entries: mirror,
            distributed: Some(Distributed { store, watch: Mutex::new(Some(handle)) }),
        })
    }

    /// Returns `true` if a coordination store is authoritative.
    #[must_use]
    pub fn is_distributed(&self) -> bool {
        self.distributed.is_some()
    }

    /// Stores `credential`.
    ///
    /// With a coordination store, a credential carrying an expiration is
    /// written under a lease that ends at that instant; one without an
    /// expiration is written permanently. The in-memory map is updated
    /// after the write succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`IamError::InvalidCredential`] if a key is empty or the
    /// expiration has already passed, or a transport error if the write fails.
    #[tracing::instrument(skip(self, credential), fields(access_key = %credential.access_key))]
    pub async fn set(&self, credential: Credential) -> Result<()> {
        credential.check_fields()?;

        if let Some(distributed) = &self.distributed {
            let key = record_key(&credential.access_key);
            let data = serde_json::to_vec(&credential)?;
            match credential.expiration {
                Some(expiration) => {
                    let ttl = (expiration - Utc::now())
                        .to_std()
                        .ok()
                        .filter(|ttl| !ttl.is_zero())
                        .ok_or_else(|| {
                            IamError::invalid_credential("credential has already expired")
                        })?;
                    distributed.store.put_with_lease(&key, data, ttl).await?;
                },
                None => distributed.store.put(&key, data).await?,
            }
        }

        self.entries.upsert(credential);
        Ok(())
    }

    /// Returns the credential for `access_key` if present and valid.
    ///
    /// An entry whose expiration has passed is not returned even if the
    /// coordination store has not yet expired its lease.
    #[must_use]
    pub fn get(&self, access_key: &str) -> Option<Credential> {
        self.entries.get_valid(access_key)
    }

    /// Removes the credential for `access_key` from the coordination store
    /// and from memory.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the coordination store delete fails; the
    /// in-memory entry is left in place.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, access_key: &str) -> Result<()> {
        if let Some(distributed) = &self.distributed {
            distributed.store.delete(&record_key(access_key)).await?;
        }
        self.entries.remove(access_key);
        Ok(())
    }

    /// The in-memory map.
    #[must_use]
    pub fn entries(&self) -> &Arc<CredentialMap> {
        &self.entries
    }

    /// Stops the credential watch, if any, and waits for it to exit.
    pub async fn shutdown(&self) {
        let handle = self.distributed.as_ref().and_then(|d| d.watch.lock().take());
        if let Some(handle) = handle {
            handle.shutdown().await;
        }
    }
}

fn record_key(access_key: &str) -> String {
    format!("{USERS_PREFIX}{access_key}")
}

struct CredentialWatch {
    store: Arc<dyn CoordinationStore>,
    mirror: Arc<CredentialMap>,
}

#[async_trait]
impl WatchHandler for CredentialWatch {
    async fn on_event(&self, event: WatchEvent) {
        if event.is_upsert() {
            match Credential::from_record(&event.value) {
                Ok(credential) => self.mirror.upsert(credential),
                Err(err) => {
                    tracing::warn!(
                        key = %event.key,
                        error = %err,
                        "skipping undecodable credential record"
                    );
                },
            }
        } else if let Some(access_key) = event.key.strip_prefix(USERS_PREFIX) {
            self.mirror.remove(access_key);
        }
    }

    async fn on_resubscribe(&self) {
        match self.store.get_prefix(USERS_PREFIX).await {
            Ok(records) => self.mirror.replace_all(decode_lenient(records)),
            Err(err) => tracing::warn!(error = %err, "credential re-list after resubscribe failed"),
        }
    }
}

fn decode_lenient(records: Vec<KeyValue>) -> HashMap<String, Credential> {
    records
        .into_iter()
        .filter_map(|record| match Credential::from_record(&record.value) {
            Ok(credential) => Some((credential.access_key.clone(), credential)),
            Err(err) => {
                tracing::warn!(
                    key = %record.key,
                    error = %err,
                    "skipping undecodable credential record"
                );
                None
            },
        })
        .collect()
}
