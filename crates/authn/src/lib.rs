//! # IAMSys Authentication
//!
//! Bearer token validation for token-for-credential exchange.
//!
//! This crate provides:
//! - **Key resolution**: fetch a JSON Web Key Set once and keep its first key
//! - **Token validation**: signature, algorithm and `exp` checks
//! - **Session negotiation**: requested duration bounds and clamping to the
//!   token's own lifetime
//!
//! ## Features
//!
//! - RSA (`RS*`, `PS*`), ECDSA (`ES256`, `ES384`) and EdDSA keys are supported
//! - Symmetric algorithms (HS256, etc.) and `none` are explicitly rejected
//! - A token's algorithm must match the family of the resolved key
//!
//! ## Example
//!
//! ```no_run
//! use iamsys_authn::TokenValidator;
//!
//! # async fn example(token: &str) -> Result<(), Box<dyn std::error::Error>> {
//! let validator = TokenValidator::from_url("https://idp.example.com/jwks").await?;
//!
//! // Ask for a 30 minute session; it is cut short if the token expires sooner.
//! let claims = validator.validate(token, Some(1800))?;
//! println!("session expires at {}", claims.expires_at());
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Authentication error types.
pub mod error;
/// Key set fetch and key material.
pub mod jwks;
/// Shared test utilities.
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used, clippy::panic, missing_docs)]
pub mod testutil;
/// Algorithm validation.
pub mod validation;
/// Token validation and session expiry.
pub mod validator;

// Re-export key types for convenience
pub use error::{AuthError, Result};
pub use jwks::{SigningKeyMaterial, fetch_signing_key, jwks_client};
pub use validation::{ACCEPTED_ALGORITHMS, FORBIDDEN_ALGORITHMS, KeyFamily, validate_algorithm};
pub use validator::{
    DEFAULT_SESSION_DURATION_SECS, MAX_SESSION_DURATION_SECS, MIN_SESSION_DURATION_SECS,
    TokenValidator, ValidatedClaims,
};
