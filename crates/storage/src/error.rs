//! Storage error types and result alias.
//!
//! Every backend behind [`ConfigStore`](crate::ConfigStore) maps its native
//! failures onto [`StorageError`], so callers observe the same not-found and
//! quorum semantics whichever backend is active.
//!
//! # Example
//!
//! ```
//! use iamsys_storage::{StorageError, StorageResult};
//!
//! fn lookup(path: &str) -> StorageResult<Vec<u8>> {
//!     Err(StorageError::not_found(path))
//! }
//!
//! assert!(lookup("config/iam/iam.json").unwrap_err().is_not_found());
//! ```

use std::sync::Arc;

use thiserror::Error;

/// A boxed error type for source chain tracking.
pub type BoxError = Arc<dyn std::error::Error + Send + Sync>;

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during configuration storage operations.
///
/// # Non-exhaustive
///
/// This enum is marked `#[non_exhaustive]`. Downstream match expressions
/// must include a wildcard arm (`_ =>`).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    /// The document is absent, unreadable under the current read quorum,
    /// or stored with an empty payload.
    ///
    /// Callers treat this as "use defaults".
    #[error("Key not found: {key}")]
    NotFound {
        /// The key or path that was not found.
        key: String,
    },

    /// A write could not reach the required number of replicas.
    #[error("Insufficient quorum: {message}")]
    QuorumInsufficient {
        /// Description of the quorum failure.
        message: String,
    },

    /// The payload checksum did not match the checksum declared for the write.
    #[error("Checksum mismatch: expected {expected}, computed {actual}")]
    ChecksumMismatch {
        /// Hex-encoded checksum declared by the writer.
        expected: String,
        /// Hex-encoded checksum computed over the payload.
        actual: String,
    },

    /// Connection or network error.
    #[error("Connection error: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
        /// The underlying error that caused this connection failure.
        #[source]
        source: Option<BoxError>,
    },

    /// Serialization or deserialization error.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Description of the serialization error.
        message: String,
        /// The underlying error that caused serialization to fail.
        #[source]
        source: Option<BoxError>,
    },

    /// Internal storage backend error.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
        /// The underlying error that caused this internal failure.
        #[source]
        source: Option<BoxError>,
    },

    /// Operation exceeded its time bound.
    #[error("Operation timeout")]
    Timeout,
}

impl StorageError {
    /// Creates a new `NotFound` error for the given key.
    #[must_use]
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Creates a new `QuorumInsufficient` error.
    #[must_use]
    pub fn quorum_insufficient(message: impl Into<String>) -> Self {
        Self::QuorumInsufficient { message: message.into() }
    }

    /// Creates a new `ChecksumMismatch` error.
    #[must_use]
    pub fn checksum_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::ChecksumMismatch { expected: expected.into(), actual: actual.into() }
    }

    /// Creates a new `Connection` error with the given message.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection { message: message.into(), source: None }
    }

    /// Creates a new `Connection` error with a message and source error.
    #[must_use]
    pub fn connection_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a new `Serialization` error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization { message: message.into(), source: None }
    }

    /// Creates a new `Serialization` error with a message and source error.
    #[must_use]
    pub fn serialization_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Serialization { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a new `Internal` error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into(), source: None }
    }

    /// Creates a new `Internal` error with a message and source error.
    #[must_use]
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Internal { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a new `Timeout` error.
    #[must_use]
    pub fn timeout() -> Self {
        Self::Timeout
    }

    /// Returns `true` for the recoverable "absent document" outcome.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` when retrying the same operation may succeed.
    ///
    /// Connection failures, timeouts and quorum shortfalls are transient.
    /// Checksum mismatches, serialization failures and not-found are not.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout | Self::QuorumInsufficient { .. })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use std::error::Error;

    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(StorageError::not_found("a/b").to_string(), "Key not found: a/b");
        assert_eq!(
            StorageError::quorum_insufficient("2 of 4 disks").to_string(),
            "Insufficient quorum: 2 of 4 disks"
        );
        assert_eq!(
            StorageError::checksum_mismatch("aa", "bb").to_string(),
            "Checksum mismatch: expected aa, computed bb"
        );
        assert_eq!(StorageError::timeout().to_string(), "Operation timeout");
    }

    #[test]
    fn test_transient_classification() {
        assert!(StorageError::connection("reset").is_transient());
        assert!(StorageError::timeout().is_transient());
        assert!(StorageError::quorum_insufficient("write").is_transient());

        assert!(!StorageError::not_found("k").is_transient());
        assert!(!StorageError::checksum_mismatch("a", "b").is_transient());
        assert!(!StorageError::serialization("bad").is_transient());
        assert!(!StorageError::internal("boom").is_transient());
    }

    #[test]
    fn test_source_chain_preserved() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "peer reset");
        let err = StorageError::connection_with_source("watch stream dropped", io);

        let source = err.source().expect("source should be preserved");
        assert_eq!(source.to_string(), "peer reset");
    }
}
