//! IAM subsystem error types.
//!
//! [`IamError`] distinguishes the recoverable "no document yet" signal from
//! structural and semantic document failures, startup configuration
//! errors, transport failures, and token exchange rejections.

use std::sync::Arc;

use iamsys_authn::AuthError;
use iamsys_storage::{BoxError, StorageError};
use thiserror::Error;

/// Result type alias for IAM operations.
pub type Result<T> = std::result::Result<T, IamError>;

/// Errors surfaced by the IAM subsystem.
///
/// # Non-exhaustive
///
/// This enum is marked `#[non_exhaustive]`. Downstream match expressions
/// must include a wildcard arm (`_ =>`).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum IamError {
    /// No configuration document exists, or it is unreadable under quorum.
    ///
    /// Callers treat this as "bootstrap defaults".
    #[error("IAM configuration not found: {path}")]
    NotFound {
        /// Document path.
        path: String,
    },

    /// The document repeats a JSON key.
    #[error("Structurally invalid configuration: {message}")]
    StructuralInvalid {
        /// Which key was repeated, and where.
        message: String,
    },

    /// A required document field is empty or unsupported.
    #[error("IAM configuration validation failed: {message}")]
    ValidationFailed {
        /// Description of the failed check.
        message: String,
    },

    /// The document asks for a combination this deployment cannot serve.
    #[error("Invalid IAM configuration: {message}")]
    ConfigInvalid {
        /// Description of the unsupported combination.
        message: String,
    },

    /// Network or storage failure reaching the configuration store,
    /// coordination store, or decision service.
    #[error("Transport error: {message}")]
    Transport {
        /// Description of the failure.
        message: String,
        /// The underlying error.
        #[source]
        source: Option<BoxError>,
    },

    /// Token validation or signing key resolution failed.
    #[error(transparent)]
    Token(#[from] AuthError),

    /// A credential is missing required fields or has already expired.
    #[error("Invalid credential: {message}")]
    InvalidCredential {
        /// Description of the defect.
        message: String,
    },

    /// JSON encoding or decoding failed.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Description of the failure.
        message: String,
        /// The underlying error.
        #[source]
        source: Option<BoxError>,
    },

    /// A raw configuration payload exceeds the size cap.
    #[error("Configuration too large: {size} bytes exceeds limit of {limit}")]
    TooLarge {
        /// Payload size in bytes.
        size: usize,
        /// Maximum accepted size in bytes.
        limit: usize,
    },

    /// The subsystem has not finished initialising, or is shutting down.
    #[error("IAM subsystem is not ready")]
    NotReady,
}

impl IamError {
    /// Creates a `NotFound` error.
    #[must_use]
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// Creates a `StructuralInvalid` error.
    #[must_use]
    pub fn structural_invalid(message: impl Into<String>) -> Self {
        Self::StructuralInvalid { message: message.into() }
    }

    /// Creates a `ValidationFailed` error.
    #[must_use]
    pub fn validation_failed(message: impl Into<String>) -> Self {
        Self::ValidationFailed { message: message.into() }
    }

    /// Creates a `ConfigInvalid` error.
    #[must_use]
    pub fn config_invalid(message: impl Into<String>) -> Self {
        Self::ConfigInvalid { message: message.into() }
    }

    /// Creates a `Transport` error.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport { message: message.into(), source: None }
    }

    /// Creates a `Transport` error with a source error.
    #[must_use]
    pub fn transport_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Transport { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates an `InvalidCredential` error.
    #[must_use]
    pub fn invalid_credential(message: impl Into<String>) -> Self {
        Self::InvalidCredential { message: message.into() }
    }

    /// Creates a `Serialization` error with a source error.
    #[must_use]
    pub fn serialization_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Serialization { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a `TooLarge` error.
    #[must_use]
    pub fn too_large(size: usize, limit: usize) -> Self {
        Self::TooLarge { size, limit }
    }

    /// Returns `true` if this is a `NotFound` error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<StorageError> for IamError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { key } => Self::NotFound { path: key },
            StorageError::Serialization { message, source } => {
                Self::Serialization { message, source }
            },
            other => {
                Self::transport_with_source("configuration store operation failed", other)
            },
        }
    }
}

impl From<serde_json::Error> for IamError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization_with_source("invalid JSON", err)
    }
}
