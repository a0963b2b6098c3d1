//! Signing key resolution from a JSON Web Key Set.
//!
//! The key set is fetched once, when the identity configuration is parsed,
//! and the first key is kept as [`SigningKeyMaterial`]. Keys are not
//! re-fetched per token.
//!
//! The fetch client does not verify TLS certificates. Key set endpoints are
//! commonly served from inside the cluster with self-signed certificates.

use std::fmt;

use jsonwebtoken::{
    DecodingKey,
    jwk::{AlgorithmParameters, EllipticCurve, Jwk, JwkSet},
};
use reqwest::StatusCode;

use crate::{
    error::{AuthError, Result},
    validation::KeyFamily,
};

/// A resolved public key ready to verify token signatures.
#[derive(Clone)]
pub struct SigningKeyMaterial {
    key: DecodingKey,
    family: KeyFamily,
    source_url: Option<String>,
}

impl fmt::Debug for SigningKeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeyMaterial")
            .field("family", &self.family)
            .field("source_url", &self.source_url)
            .finish_non_exhaustive()
    }
}

impl SigningKeyMaterial {
    /// Builds key material from a single JWK.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidPublicKey`] for symmetric keys, unsupported
    /// curves, or key parameters that fail to decode.
    pub fn from_jwk(jwk: &Jwk, source_url: Option<String>) -> Result<Self> {
        let family = match &jwk.algorithm {
            AlgorithmParameters::RSA(_) => KeyFamily::Rsa,
            AlgorithmParameters::EllipticCurve(params) => match params.curve {
                EllipticCurve::P256 | EllipticCurve::P384 => KeyFamily::Ecdsa,
                ref curve => {
                    return Err(AuthError::invalid_public_key(format!(
                        "unsupported EC curve {curve:?}"
                    )));
                },
            },
            AlgorithmParameters::OctetKeyPair(params) => match params.curve {
                EllipticCurve::Ed25519 => KeyFamily::EdDsa,
                ref curve => {
                    return Err(AuthError::invalid_public_key(format!(
                        "unsupported OKP curve {curve:?}"
                    )));
                },
            },
            AlgorithmParameters::OctetKey(_) => {
                return Err(AuthError::invalid_public_key("symmetric keys are not accepted"));
            },
        };

        let key = DecodingKey::from_jwk(jwk)?;
        Ok(Self { key, family, source_url })
    }

    /// Builds key material from the first key in `set`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Jwks`] if the set is empty, or any error from
    /// [`from_jwk`](Self::from_jwk).
    pub fn from_jwk_set(set: &JwkSet, source_url: Option<String>) -> Result<Self> {
        let first = set.keys.first().ok_or_else(|| AuthError::jwks("key set is empty"))?;
        Self::from_jwk(first, source_url)
    }

    /// The key used for signature verification.
    #[must_use]
    pub fn decoding_key(&self) -> &DecodingKey {
        &self.key
    }

    /// The key family, which bounds the algorithms a token may use.
    #[must_use]
    pub fn family(&self) -> KeyFamily {
        self.family
    }

    /// The URL the key set was fetched from, if any.
    #[must_use]
    pub fn source_url(&self) -> Option<&str> {
        self.source_url.as_deref()
    }
}

/// Builds the HTTP client used for key set fetches.
///
/// # Errors
///
/// Returns [`AuthError::Jwks`] if the TLS backend cannot be initialised.
pub fn jwks_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .build()
        .map_err(|e| AuthError::jwks(format!("failed to build HTTP client: {e}")))
}

/// Fetches the key set at `url` and resolves its first key.
///
/// # Errors
///
/// Returns [`AuthError::Jwks`] on transport failure, any status other than
/// `200 OK`, an undecodable body, or an empty set.
#[tracing::instrument(skip(client))]
pub async fn fetch_signing_key(client: &reqwest::Client, url: &str) -> Result<SigningKeyMaterial> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| AuthError::jwks(format!("request to {url} failed: {e}")))?;

    let status = response.status();
    if status != StatusCode::OK {
        tracing::warn!(%status, "key set endpoint returned non-OK status");
        return Err(AuthError::jwks(format!("{url} returned status {status}")));
    }

    let set: JwkSet = response
        .json()
        .await
        .map_err(|e| AuthError::jwks(format!("undecodable key set from {url}: {e}")))?;

    let key = SigningKeyMaterial::from_jwk_set(&set, Some(url.to_owned()))?;
    tracing::debug!(family = ?key.family(), keys = set.keys.len(), "resolved signing key");
    Ok(key)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::testutil::{RSA_JWK_E, RSA_JWK_N, TestSigner};

    fn jwk(value: serde_json::Value) -> Jwk {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_rsa_jwk_resolves_rsa_family() {
        let key = SigningKeyMaterial::from_jwk(
            &jwk(json!({"kty": "RSA", "n": RSA_JWK_N, "e": RSA_JWK_E})),
            None,
        )
        .unwrap();
        assert_eq!(key.family(), KeyFamily::Rsa);
        assert!(key.source_url().is_none());
    }

    #[test]
    fn test_ec_and_okp_families() {
        let ec = SigningKeyMaterial::from_jwk(&jwk(TestSigner::ec_p256().jwk()), None).unwrap();
        assert_eq!(ec.family(), KeyFamily::Ecdsa);

        let ed = SigningKeyMaterial::from_jwk(&jwk(TestSigner::ed25519().jwk()), None).unwrap();
        assert_eq!(ed.family(), KeyFamily::EdDsa);
    }

    #[test]
    fn test_symmetric_jwk_rejected() {
        let oct = jwk(json!({"kty": "oct", "k": "c2VjcmV0"}));
        let result = SigningKeyMaterial::from_jwk(&oct, None);
        assert!(matches!(result, Err(AuthError::InvalidPublicKey(_))), "got {result:?}");
    }

    #[test]
    fn test_empty_set_rejected() {
        let set: JwkSet = serde_json::from_value(json!({"keys": []})).unwrap();
        let result = SigningKeyMaterial::from_jwk_set(&set, None);
        assert!(matches!(result, Err(AuthError::Jwks(_))));
    }

    #[test]
    fn test_first_key_wins() {
        let set: JwkSet = serde_json::from_value(json!({
            "keys": [TestSigner::ec_p256().jwk(), {"kty": "RSA", "n": RSA_JWK_N, "e": RSA_JWK_E}]
        }))
        .unwrap();
        let key = SigningKeyMaterial::from_jwk_set(&set, Some("https://idp/keys".into())).unwrap();
        assert_eq!(key.family(), KeyFamily::Ecdsa);
        assert_eq!(key.source_url(), Some("https://idp/keys"));
    }

    #[test]
    fn test_debug_omits_key_bytes() {
        let key = SigningKeyMaterial::from_jwk(&jwk(TestSigner::ec_p256().jwk()), None).unwrap();
        let rendered = format!("{key:?}");
        assert!(rendered.contains("Ecdsa"));
        assert!(!rendered.contains("DecodingKey"));
    }
}
