//! Loading, validating, bootstrapping and persisting the IAM document.

use std::{future::Future, time::Duration};

use bytes::Bytes;
use iamsys_storage::{ConfigStore, StorageError};

use crate::{
    config::BootstrapOptions,
    document::IamDocument,
    error::{IamError, Result},
};

/// Largest raw document accepted by [`IamConfigManager::save_raw`] (1 MiB).
pub const MAX_CONFIG_SIZE: usize = 1 << 20;

/// Reads and writes the IAM document through a [`ConfigStore`].
///
/// Every store call is bounded by the configured timeout.
#[derive(Debug, Clone)]
pub struct IamConfigManager {
    store: ConfigStore,
    path: String,
    timeout: Duration,
}

impl IamConfigManager {
    /// Creates a manager for the document at `path`.
    #[must_use]
    pub fn new(store: ConfigStore, path: impl Into<String>, timeout: Duration) -> Self {
        Self { store, path: path.into(), timeout }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    /// The document path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    async fn bounded<T>(
        &self,
        op: impl Future<Output = iamsys_storage::StorageResult<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.timeout, op).await {
            Ok(result) => result.map_err(IamError::from),
            Err(_) => {
                tracing::warn!(
                    path = %self.path,
                    timeout = ?self.timeout,
                    "configuration store call timed out"
                );
                Err(StorageError::Timeout.into())
            },
        }
    }

    /// Loads and validates the document.
    ///
    /// # Errors
    ///
    /// - [`IamError::NotFound`] if no document is stored; callers bootstrap
    /// - [`IamError::StructuralInvalid`] if the document repeats a key
    /// - [`IamError::ValidationFailed`] if a source type is empty or unsupported
    /// - [`IamError::Transport`] for any other storage failure
    #[tracing::instrument(skip(self), fields(path = %self.path))]
    pub async fn load(&self) -> Result<IamDocument> {
        let data = self.load_raw().await?;
        IamDocument::parse(&data)
    }

    /// Validates and persists `document`.
    ///
    /// # Errors
    ///
    /// Returns [`IamError::ValidationFailed`] without writing if the document
    /// is invalid, or a storage error if the write fails.
    #[tracing::instrument(skip(self, document), fields(path = %self.path))]
    pub async fn save(&self, document: &IamDocument) -> Result<()> {
        document.validate()?;
        let data = document.to_vec()?;
        self.bounded(self.store.put(&self.path, data)).await
    }

    /// Builds and persists the default document.
    ///
    /// # Errors
    ///
    /// Returns any error from [`save`](Self::save).
    #[tracing::instrument(skip(self, options), fields(path = %self.path))]
    pub async fn bootstrap(&self, options: &BootstrapOptions) -> Result<IamDocument> {
        let document = IamDocument::bootstrap(options);
        self.save(&document).await?;
        tracing::info!(
            identity = %document.identity.kind,
            policy = %document.policy.kind,
            "bootstrapped IAM configuration"
        );
        Ok(document)
    }

    /// Loads the document, bootstrapping it if none is stored.
    ///
    /// # Errors
    ///
    /// Any [`load`](Self::load) error other than `NotFound`, or any
    /// [`bootstrap`](Self::bootstrap) error.
    pub async fn load_or_bootstrap(&self, options: &BootstrapOptions) -> Result<IamDocument> {
        match self.load().await {
            Err(err) if err.is_not_found() => self.bootstrap(options).await,
            other => other,
        }
    }

    /// Reads the stored document bytes without parsing them.
    ///
    /// # Errors
    ///
    /// Returns [`IamError::NotFound`] when no document is stored, or a
    /// storage error.
    pub async fn load_raw(&self) -> Result<Bytes> {
        self.bounded(self.store.get(&self.path)).await
    }

    /// Replaces the stored document with `data` after checking it.
    ///
    /// # Errors
    ///
    /// - [`IamError::TooLarge`] above [`MAX_CONFIG_SIZE`]
    /// - any [`IamDocument::parse`] error
    /// - a storage error if the write fails
    #[tracing::instrument(skip(self, data), fields(path = %self.path, len = data.len()))]
    pub async fn save_raw(&self, data: Vec<u8>) -> Result<IamDocument> {
        if data.len() > MAX_CONFIG_SIZE {
            return Err(IamError::too_large(data.len(), MAX_CONFIG_SIZE));
        }
        let document = IamDocument::parse(&data)?;
        self.bounded(self.store.put(&self.path, data)).await?;
        Ok(document)
    }
}
