//! Object-store capability used as the quorum-replicated configuration backend.
//!
//! The object read/write path itself lives outside this crate. [`ObjectLayer`]
//! is the boundary: full-object get, checksummed put, and metadata lookup, each
//! able to fail with the quorum error classes the cluster reports.
//! [`MemoryObjectLayer`] is a single-process implementation with fault
//! injection for exercising those error classes.

use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Reserved bucket holding system configuration objects.
pub const META_BUCKET: &str = ".iamsys.sys";

/// Errors reported by an [`ObjectLayer`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ObjectError {
    /// The object was never written or has been removed.
    #[error("Object not found: {bucket}/{object}")]
    ObjectNotFound {
        /// Bucket name.
        bucket: String,
        /// Object name.
        object: String,
    },

    /// Fewer bytes were read than the object metadata promised.
    #[error("Incomplete body: read {read} of {expected} bytes")]
    IncompleteBody {
        /// Bytes actually read.
        read: u64,
        /// Bytes the metadata declared.
        expected: u64,
    },

    /// Not enough replicas answered the read.
    #[error("Insufficient read quorum")]
    InsufficientReadQuorum,

    /// Not enough replicas acknowledged the write.
    #[error("Insufficient write quorum")]
    InsufficientWriteQuorum,

    /// The payload did not hash to the checksum supplied with it.
    #[error("Checksum mismatch: expected {expected}, computed {actual}")]
    ChecksumMismatch {
        /// Declared hex SHA-256.
        expected: String,
        /// Computed hex SHA-256.
        actual: String,
    },

    /// Any other failure of the underlying disks or network.
    #[error("Object layer I/O error: {0}")]
    Io(String),
}

/// Metadata for a stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    /// Bucket name.
    pub bucket: String,
    /// Object name.
    pub name: String,
    /// Payload size in bytes.
    pub size: u64,
    /// Hex SHA-256 of the payload.
    pub etag: String,
    /// Last modification time.
    pub mod_time: DateTime<Utc>,
}

/// A write payload paired with the SHA-256 checksum it must hash to.
#[derive(Debug, Clone)]
pub struct PutPayload {
    data: Bytes,
    sha256_hex: String,
}

impl PutPayload {
    /// Wraps `data`, computing its checksum.
    pub fn new(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let sha256_hex = sha256_hex(&data);
        Self { data, sha256_hex }
    }

    /// Wraps `data` with a caller-declared checksum that the object layer verifies.
    pub fn with_checksum(data: impl Into<Bytes>, sha256_hex: impl Into<String>) -> Self {
        Self { data: data.into(), sha256_hex: sha256_hex.into() }
    }

    /// The payload bytes.
    #[must_use]
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// The declared hex SHA-256.
    #[must_use]
    pub fn sha256_hex(&self) -> &str {
        &self.sha256_hex
    }

    /// Recomputes the checksum and compares it with the declared one.
    pub fn verify(&self) -> Result<(), ObjectError> {
        let actual = sha256_hex(&self.data);
        if actual != self.sha256_hex {
            return Err(ObjectError::ChecksumMismatch {
                expected: self.sha256_hex.clone(),
                actual,
            });
        }
        Ok(())
    }
}

/// Hex-encoded SHA-256 digest of `data`.
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Quorum-replicated object storage, as seen by the configuration layer.
#[async_trait]
pub trait ObjectLayer: Send + Sync {
    /// Reads the full object.
    #[must_use = "object reads may fail and errors must be handled"]
    async fn get_object(&self, bucket: &str, object: &str) -> Result<Bytes, ObjectError>;

    /// Writes the object through the quorum write path after verifying its checksum.
    #[must_use = "object writes may fail and errors must be handled"]
    async fn put_object(
        &self,
        bucket: &str,
        object: &str,
        payload: PutPayload,
    ) -> Result<ObjectInfo, ObjectError>;

    /// Reads object metadata without the payload.
    #[must_use = "metadata reads may fail and errors must be handled"]
    async fn get_object_info(&self, bucket: &str, object: &str) -> Result<ObjectInfo, ObjectError>;
}

/// Read-side fault to inject into a [`MemoryObjectLayer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadFault {
    /// Reads return [`ObjectError::IncompleteBody`].
    IncompleteBody,
    /// Reads return [`ObjectError::InsufficientReadQuorum`].
    InsufficientReadQuorum,
    /// Reads return [`ObjectError::Io`].
    Io,
}

/// Write-side fault to inject into a [`MemoryObjectLayer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteFault {
    /// Writes return [`ObjectError::InsufficientWriteQuorum`].
    InsufficientWriteQuorum,
    /// Writes return [`ObjectError::Io`].
    Io,
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    info: ObjectInfo,
}

/// In-memory [`ObjectLayer`].
///
/// Clones share the same objects and fault configuration.
#[derive(Clone, Default)]
pub struct MemoryObjectLayer {
    objects: Arc<RwLock<BTreeMap<(String, String), StoredObject>>>,
    read_fault: Arc<Mutex<Option<ReadFault>>>,
    write_fault: Arc<Mutex<Option<WriteFault>>>,
}

impl MemoryObjectLayer {
    /// Creates an empty object layer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent read fail with `fault` until cleared.
    pub fn inject_read_fault(&self, fault: ReadFault) {
        *self.read_fault.lock() = Some(fault);
    }

    /// Makes every subsequent write fail with `fault` until cleared.
    pub fn inject_write_fault(&self, fault: WriteFault) {
        *self.write_fault.lock() = Some(fault);
    }

    /// Removes any injected faults.
    pub fn clear_faults(&self) {
        *self.read_fault.lock() = None;
        *self.write_fault.lock() = None;
    }

    /// Number of stored objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    /// Returns `true` if nothing has been stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    fn check_read_fault(&self, expected: u64) -> Result<(), ObjectError> {
        match *self.read_fault.lock() {
            None => Ok(()),
            Some(ReadFault::IncompleteBody) => {
                Err(ObjectError::IncompleteBody { read: expected / 2, expected })
            },
            Some(ReadFault::InsufficientReadQuorum) => Err(ObjectError::InsufficientReadQuorum),
            Some(ReadFault::Io) => Err(ObjectError::Io("injected read failure".into())),
        }
    }

    fn lookup(&self, bucket: &str, object: &str) -> Result<StoredObject, ObjectError> {
        self.objects.read().get(&(bucket.to_owned(), object.to_owned())).cloned().ok_or_else(
            || ObjectError::ObjectNotFound { bucket: bucket.to_owned(), object: object.to_owned() },
        )
    }
}

#[async_trait]
impl ObjectLayer for MemoryObjectLayer {
    async fn get_object(&self, bucket: &str, object: &str) -> Result<Bytes, ObjectError> {
        let stored = self.lookup(bucket, object);
        let expected = stored.as_ref().map(|s| s.info.size).unwrap_or_default();
        self.check_read_fault(expected)?;
        Ok(stored?.data)
    }

    async fn put_object(
        &self,
        bucket: &str,
        object: &str,
        payload: PutPayload,
    ) -> Result<ObjectInfo, ObjectError> {
        payload.verify()?;

        match *self.write_fault.lock() {
            None => {},
            Some(WriteFault::InsufficientWriteQuorum) => {
                return Err(ObjectError::InsufficientWriteQuorum);
            },
            Some(WriteFault::Io) => return Err(ObjectError::Io("injected write failure".into())),
        }

        let info = ObjectInfo {
            bucket: bucket.to_owned(),
            name: object.to_owned(),
            size: payload.data.len() as u64,
            etag: payload.sha256_hex.clone(),
            mod_time: Utc::now(),
        };
        self.objects.write().insert(
            (bucket.to_owned(), object.to_owned()),
            StoredObject { data: payload.data, info: info.clone() },
        );
        Ok(info)
    }

    async fn get_object_info(&self, bucket: &str, object: &str) -> Result<ObjectInfo, ObjectError> {
        let stored = self.lookup(bucket, object);
        self.check_read_fault(0)?;
        Ok(stored?.info)
    }
}
