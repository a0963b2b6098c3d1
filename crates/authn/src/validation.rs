//! JWT algorithm validation.
//!
//! Only asymmetric algorithms are accepted. Symmetric algorithms and `none`
//! are always rejected, and a token's algorithm must belong to the same key
//! family as the resolved signing key so an RSA key can never be used to
//! verify an ECDSA token or the reverse.

use jsonwebtoken::Algorithm;

use crate::error::AuthError;

/// Forbidden JWT algorithms that are never accepted.
///
/// - `none`: No signature verification
/// - `HS256`, `HS384`, `HS512`: Symmetric algorithms (shared secret)
pub const FORBIDDEN_ALGORITHMS: &[&str] = &["none", "HS256", "HS384", "HS512"];

/// Accepted JWT algorithms.
pub const ACCEPTED_ALGORITHMS: &[&str] =
    &["RS256", "RS384", "RS512", "PS256", "PS384", "PS512", "ES256", "ES384", "EdDSA"];

/// Public key family of a signing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFamily {
    /// RSA keys, used with `RS*` and `PS*`.
    Rsa,
    /// NIST curve keys, used with `ES256` and `ES384`.
    Ecdsa,
    /// Edwards curve keys, used with `EdDSA`.
    EdDsa,
}

impl KeyFamily {
    /// Returns `true` if tokens signed with `alg` can be verified by a key
    /// of this family.
    #[must_use]
    pub fn supports(self, alg: Algorithm) -> bool {
        match self {
            Self::Rsa => matches!(
                alg,
                Algorithm::RS256
                    | Algorithm::RS384
                    | Algorithm::RS512
                    | Algorithm::PS256
                    | Algorithm::PS384
                    | Algorithm::PS512
            ),
            Self::Ecdsa => matches!(alg, Algorithm::ES256 | Algorithm::ES384),
            Self::EdDsa => alg == Algorithm::EdDSA,
        }
    }
}

/// Validate JWT algorithm name against the allow-list.
///
/// # Errors
///
/// Returns [`AuthError::UnsupportedAlgorithm`] if the algorithm is symmetric,
/// `none`, or otherwise not in [`ACCEPTED_ALGORITHMS`].
///
/// # Examples
///
/// ```
/// use iamsys_authn::validation::validate_algorithm;
///
/// assert!(validate_algorithm("RS256").is_ok());
/// assert!(validate_algorithm("ES256").is_ok());
/// assert!(validate_algorithm("HS256").is_err());
/// assert!(validate_algorithm("none").is_err());
/// ```
pub fn validate_algorithm(alg: &str) -> Result<(), AuthError> {
    if FORBIDDEN_ALGORITHMS.contains(&alg) {
        return Err(AuthError::unsupported_algorithm(format!(
            "Algorithm '{alg}' is not allowed for security reasons"
        )));
    }

    if !ACCEPTED_ALGORITHMS.contains(&alg) {
        return Err(AuthError::unsupported_algorithm(format!(
            "Algorithm '{alg}' is not in accepted list"
        )));
    }

    Ok(())
}

/// Validate that a token algorithm can be verified with a key of `family`.
///
/// # Errors
///
/// Returns [`AuthError::UnsupportedAlgorithm`] on a family mismatch.
pub fn validate_key_family(alg: Algorithm, family: KeyFamily) -> Result<(), AuthError> {
    if family.supports(alg) {
        Ok(())
    } else {
        Err(AuthError::unsupported_algorithm(format!(
            "Algorithm '{alg:?}' cannot be verified with a {family:?} key"
        )))
    }
}
