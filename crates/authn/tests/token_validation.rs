//! End-to-end token validation against a key set served over HTTP.
//!
//! Each test starts an in-process key set endpoint, builds a
//! [`TokenValidator`] from its URL, and validates tokens signed by the
//! matching private key.
#![allow(clippy::expect_used, clippy::panic)]

use axum::http::StatusCode;
use chrono::Utc;
use iamsys_authn::{
    AuthError, KeyFamily, TokenValidator, assert_auth_error,
    testutil::{TestSigner, serve_jwks, serve_jwks_status},
};
use serde_json::json;

// ===========================================================================
// Key resolution
// ===========================================================================

#[tokio::test]
async fn resolves_first_key_from_served_set() {
    let ec = TestSigner::ec_p256();
    let rsa = TestSigner::rsa();
    let server = serve_jwks(json!({"keys": [ec.jwk(), rsa.jwk()]})).await;

    let validator = TokenValidator::from_url(&server.url("/jwks")).await.expect("validator");
    assert_eq!(validator.key().family(), KeyFamily::Ecdsa);
    assert_eq!(validator.key().source_url(), Some(server.url("/jwks").as_str()));

    validator.validate(&ec.token_expiring_in("alice", 7200), None).expect("first key verifies");
    assert_auth_error!(
        validator.validate(&rsa.token_expiring_in("alice", 7200), None),
        UnsupportedAlgorithm
    );
}

#[tokio::test]
async fn non_ok_status_is_jwks_error() {
    let statuses =
        [StatusCode::NOT_FOUND, StatusCode::INTERNAL_SERVER_ERROR, StatusCode::NO_CONTENT];
    for status in statuses {
        let server = serve_jwks_status(status).await;
        let result = TokenValidator::from_url(&server.url("/jwks")).await;
        assert_auth_error!(result, Jwks, status.to_string());
    }
}

#[tokio::test]
async fn empty_or_garbage_set_is_jwks_error() {
    let server = serve_jwks(json!({"keys": []})).await;
    assert_auth_error!(TokenValidator::from_url(&server.url("/jwks")).await, Jwks);

    let server = serve_jwks(json!({"not": "a key set"})).await;
    assert_auth_error!(TokenValidator::from_url(&server.url("/jwks")).await, Jwks);
}

#[tokio::test]
async fn unreachable_endpoint_is_jwks_error() {
    let server = serve_jwks(json!({"keys": []})).await;
    let url = server.url("/jwks");
    drop(server);
    tokio::task::yield_now().await;

    let result = TokenValidator::from_url(&url).await;
    assert!(matches!(result, Err(AuthError::Jwks(_))), "got {result:?}");
}

// ===========================================================================
// Session negotiation
// ===========================================================================

#[tokio::test]
async fn session_bounds_and_clamping() {
    let signer = TestSigner::rsa();
    let server = serve_jwks(signer.jwks()).await;
    let validator = TokenValidator::from_url(&server.url("/jwks")).await.expect("validator");

    let long_lived = signer.token_expiring_in("alice", 86_400);
    assert_auth_error!(validator.validate(&long_lived, Some(100)), DurationOutOfRange);
    assert_auth_error!(validator.validate(&long_lived, Some(50_000)), DurationOutOfRange);

    let default = validator.validate(&long_lived, None).expect("default duration");
    assert_eq!(default.duration_secs(), 3600);

    let short_lived = signer.token_expiring_in("alice", 600);
    let before = Utc::now().timestamp();
    let clamped = validator.validate(&short_lived, Some(1800)).expect("clamped");
    assert!(clamped.duration_secs() <= 600);
    assert!(clamped.expires_at() <= before + 600 + 1);
    assert_eq!(clamped.claims()["exp"], json!(clamped.expires_at()));
    assert_eq!(clamped.get_str("sub"), Some("alice"));
    assert_eq!(clamped.get_str("iss"), Some("https://idp.example.test"));
}

#[tokio::test]
async fn eddsa_key_set_round_trip() {
    let signer = TestSigner::ed25519();
    let server = serve_jwks(signer.jwks()).await;
    let validator = TokenValidator::from_url(&server.url("/jwks")).await.expect("validator");

    let validated =
        validator.validate(&signer.token_expiring_in("bob", 3600), Some(900)).expect("valid");
    assert_eq!(validated.duration_secs(), 900);
}
