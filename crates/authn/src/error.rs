//! Authentication error types.
//!
//! This module defines errors that can occur while resolving a signing key
//! and validating bearer tokens against it.

use thiserror::Error;

/// Token validation and key resolution errors.
///
/// # Non-exhaustive
///
/// This enum is marked `#[non_exhaustive]`. Downstream match expressions
/// must include a wildcard arm (`_ =>`).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthError {
    /// Malformed JWT - cannot be decoded.
    #[error("Invalid token format: {0}")]
    InvalidTokenFormat(String),

    /// Signature verification failed.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Token has expired.
    #[error("Token expired")]
    TokenExpired,

    /// Algorithm not in allowed list, or not usable with the resolved key.
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// The `exp` claim is missing or not a number.
    #[error("Invalid expiry value: {0}")]
    InvalidExpiry(String),

    /// Requested session duration outside the accepted bounds.
    #[error("Out of range value for duration in seconds: {requested}")]
    DurationOutOfRange {
        /// The duration the caller asked for, in seconds.
        requested: u64,
    },

    /// The key set could not be fetched or was unusable.
    #[error("JWKS error: {0}")]
    Jwks(String),

    /// Invalid public key format.
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),
}

impl AuthError {
    /// Creates an `InvalidTokenFormat` error.
    #[must_use]
    pub fn invalid_token_format(message: impl Into<String>) -> Self {
        Self::InvalidTokenFormat(message.into())
    }

    /// Creates an `InvalidSignature` error.
    #[must_use]
    pub fn invalid_signature() -> Self {
        Self::InvalidSignature
    }

    /// Creates a `TokenExpired` error.
    #[must_use]
    pub fn token_expired() -> Self {
        Self::TokenExpired
    }

    /// Creates an `UnsupportedAlgorithm` error.
    #[must_use]
    pub fn unsupported_algorithm(message: impl Into<String>) -> Self {
        Self::UnsupportedAlgorithm(message.into())
    }

    /// Creates an `InvalidExpiry` error.
    #[must_use]
    pub fn invalid_expiry(message: impl Into<String>) -> Self {
        Self::InvalidExpiry(message.into())
    }

    /// Creates a `DurationOutOfRange` error.
    #[must_use]
    pub fn duration_out_of_range(requested: u64) -> Self {
        Self::DurationOutOfRange { requested }
    }

    /// Creates a `Jwks` error.
    #[must_use]
    pub fn jwks(message: impl Into<String>) -> Self {
        Self::Jwks(message.into())
    }

    /// Creates an `InvalidPublicKey` error.
    #[must_use]
    pub fn invalid_public_key(message: impl Into<String>) -> Self {
        Self::InvalidPublicKey(message.into())
    }

    /// Returns `true` for failures caused by the token itself: structure,
    /// signature, algorithm, expiry, or the `exp` encoding.
    #[must_use]
    pub fn is_token_invalid(&self) -> bool {
        matches!(
            self,
            Self::InvalidTokenFormat(_)
                | Self::InvalidSignature
                | Self::TokenExpired
                | Self::UnsupportedAlgorithm(_)
                | Self::InvalidExpiry(_)
        )
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::InvalidToken => AuthError::invalid_token_format("Invalid JWT structure"),
            ErrorKind::InvalidSignature => AuthError::InvalidSignature,
            ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
                AuthError::unsupported_algorithm("Algorithm not supported")
            },
            ErrorKind::InvalidRsaKey(_)
            | ErrorKind::InvalidEcdsaKey
            | ErrorKind::InvalidKeyFormat
            | ErrorKind::MissingAlgorithm => AuthError::invalid_public_key(err.to_string()),
            _ => AuthError::invalid_token_format(format!("JWT error: {err}")),
        }
    }
}

/// Result type alias for authentication operations.
pub type Result<T> = std::result::Result<T, AuthError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            AuthError::invalid_token_format("test").to_string(),
            "Invalid token format: test"
        );
        assert_eq!(AuthError::token_expired().to_string(), "Token expired");
        assert_eq!(
            AuthError::duration_out_of_range(100).to_string(),
            "Out of range value for duration in seconds: 100"
        );
    }

    #[test]
    fn test_error_from_jsonwebtoken() {
        use jsonwebtoken::errors::{Error, ErrorKind};

        let auth_err: AuthError = Error::from(ErrorKind::ExpiredSignature).into();
        assert!(matches!(auth_err, AuthError::TokenExpired));

        let auth_err: AuthError = Error::from(ErrorKind::InvalidSignature).into();
        assert!(matches!(auth_err, AuthError::InvalidSignature));

        let auth_err: AuthError = Error::from(ErrorKind::InvalidEcdsaKey).into();
        assert!(matches!(auth_err, AuthError::InvalidPublicKey(_)));
    }

    #[test]
    fn test_token_invalid_family() {
        assert!(AuthError::invalid_signature().is_token_invalid());
        assert!(AuthError::invalid_expiry("true").is_token_invalid());
        assert!(AuthError::unsupported_algorithm("HS256").is_token_invalid());
        assert!(!AuthError::duration_out_of_range(50_000).is_token_invalid());
        assert!(!AuthError::jwks("status 500").is_token_invalid());
    }
}
