//! Bearer token validation and session expiry negotiation.
//!
//! [`TokenValidator::validate`] verifies a token against the resolved
//! signing key and derives the expiry of the session it may be exchanged
//! for. The derived session never outlives the token:
//!
//! ```text
//! effective = min(requested or 3600, token exp - now)
//! ```
//!
//! where `requested`, when given, must lie in `[900, 43200]` seconds.

use std::sync::Arc;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use jsonwebtoken::{Validation, decode, decode_header};
use serde_json::{Map, Value};

use crate::{
    error::{AuthError, Result},
    jwks::{SigningKeyMaterial, fetch_signing_key, jwks_client},
    validation::{validate_algorithm, validate_key_family},
};

/// Session duration used when the caller does not request one.
pub const DEFAULT_SESSION_DURATION_SECS: u64 = 3600;

/// Shortest session duration a caller may request.
pub const MIN_SESSION_DURATION_SECS: u64 = 900;

/// Longest session duration a caller may request.
pub const MAX_SESSION_DURATION_SECS: u64 = 43_200;

/// Claims of a validated token, with `exp` rewritten to the session expiry.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedClaims {
    claims: Map<String, Value>,
    expires_at: i64,
    duration_secs: u64,
}

impl ValidatedClaims {
    /// The full claim set. `exp` holds the session expiry as integer seconds.
    #[must_use]
    pub fn claims(&self) -> &Map<String, Value> {
        &self.claims
    }

    /// Consumes `self`, returning the claim set.
    #[must_use]
    pub fn into_claims(self) -> Map<String, Value> {
        self.claims
    }

    /// Session expiry in seconds since the Unix epoch.
    #[must_use]
    pub fn expires_at(&self) -> i64 {
        self.expires_at
    }

    /// Session length after clamping to the token lifetime.
    #[must_use]
    pub fn duration_secs(&self) -> u64 {
        self.duration_secs
    }

    /// String claim lookup.
    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.claims.get(name).and_then(Value::as_str)
    }
}

/// Validates bearer tokens against one resolved signing key.
#[derive(Debug, Clone)]
pub struct TokenValidator {
    key: Arc<SigningKeyMaterial>,
}

impl TokenValidator {
    /// Creates a validator over already resolved key material.
    #[must_use]
    pub fn new(key: SigningKeyMaterial) -> Self {
        Self { key: Arc::new(key) }
    }

    /// Fetches the key set at `url` and creates a validator over its first key.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Jwks`] or [`AuthError::InvalidPublicKey`] if the
    /// key cannot be resolved.
    pub async fn from_url(url: &str) -> Result<Self> {
        let client = jwks_client()?;
        let key = fetch_signing_key(&client, url).await?;
        Ok(Self::new(key))
    }

    /// The signing key this validator verifies against.
    #[must_use]
    pub fn key(&self) -> &SigningKeyMaterial {
        &self.key
    }

    /// Validates `token` and negotiates a session of `requested_secs` seconds.
    ///
    /// # Errors
    ///
    /// - [`AuthError::is_token_invalid`] errors for bad structure, algorithm,
    ///   signature, `exp` encoding, or an expired token
    /// - [`AuthError::DurationOutOfRange`] when `requested_secs` is outside
    ///   `[900, 43200]`
    pub fn validate(&self, token: &str, requested_secs: Option<u64>) -> Result<ValidatedClaims> {
        self.validate_at(token, requested_secs, Utc::now().timestamp())
    }

    /// [`validate`](Self::validate) against an explicit clock, in seconds
    /// since the Unix epoch.
    pub fn validate_at(
        &self,
        token: &str,
        requested_secs: Option<u64>,
        now: i64,
    ) -> Result<ValidatedClaims> {
        // The raw name is checked first so that `none` and unknown names are
        // reported as algorithm failures rather than header parse failures.
        validate_algorithm(&raw_header_alg(token)?)?;

        let header = decode_header(token).map_err(|e| {
            AuthError::invalid_token_format(format!("Failed to decode JWT header: {e}"))
        })?;
        validate_key_family(header.alg, self.key.family())?;

        let mut validation = Validation::new(header.alg);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let mut claims =
            decode::<Map<String, Value>>(token, self.key.decoding_key(), &validation)?.claims;

        let exp = parse_expiry(claims.get("exp"))?;
        if exp <= now {
            tracing::debug!(exp, now, "rejecting expired token");
            return Err(AuthError::token_expired());
        }

        let requested = resolve_duration(requested_secs)?;
        let duration_secs = clamp_duration(requested, exp - now);
        let expires_at = now.saturating_add(i64::try_from(duration_secs).unwrap_or(i64::MAX));
        claims.insert("exp".to_owned(), Value::from(expires_at));

        Ok(ValidatedClaims { claims, expires_at, duration_secs })
    }
}

/// Applies the default and the accepted bounds to a requested duration.
///
/// # Errors
///
/// Returns [`AuthError::DurationOutOfRange`] outside `[900, 43200]`.
pub fn resolve_duration(requested_secs: Option<u64>) -> Result<u64> {
    match requested_secs {
        None => Ok(DEFAULT_SESSION_DURATION_SECS),
        Some(secs) if (MIN_SESSION_DURATION_SECS..=MAX_SESSION_DURATION_SECS).contains(&secs) => {
            Ok(secs)
        },
        Some(secs) => Err(AuthError::duration_out_of_range(secs)),
    }
}

/// Shortens `requested` so it ends no later than the token does.
#[must_use]
pub fn clamp_duration(requested: u64, remaining_secs: i64) -> u64 {
    requested.min(u64::try_from(remaining_secs).unwrap_or(0))
}

/// Reads `exp` as integer seconds.
///
/// JSON numbers (integer or fractional) and numeric strings are accepted.
/// Fractional values are truncated.
///
/// # Errors
///
/// Returns [`AuthError::InvalidExpiry`] for a missing claim or any other
/// encoding.
pub fn parse_expiry(value: Option<&Value>) -> Result<i64> {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().and_then(finite_secs)),
        Some(Value::String(s)) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| s.parse::<f64>().ok().and_then(finite_secs))
        },
        Some(_) => None,
        None => return Err(AuthError::invalid_expiry("missing exp claim")),
    };

    parsed.ok_or_else(|| {
        AuthError::invalid_expiry(value.map(Value::to_string).unwrap_or_default())
    })
}

fn finite_secs(value: f64) -> Option<i64> {
    value.is_finite().then_some(value as i64)
}

fn raw_header_alg(token: &str) -> Result<String> {
    let header_b64 = token
        .split('.')
        .next()
        .filter(|segment| !segment.is_empty())
        .ok_or_else(|| AuthError::invalid_token_format("missing header segment"))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(header_b64)
        .map_err(|e| AuthError::invalid_token_format(format!("Failed to decode JWT header: {e}")))?;
    let header: Value = serde_json::from_slice(&bytes)
        .map_err(|e| AuthError::invalid_token_format(format!("Failed to parse JWT header: {e}")))?;
    header
        .get("alg")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| AuthError::invalid_token_format("header has no alg"))
}
