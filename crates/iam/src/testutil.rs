//! Shared test utilities for the IAM subsystem.
//!
//! Feature-gated behind `testutil` to prevent leaking into production
//! builds. Provides fast-cycling configuration, document and policy
//! fixtures, and a fake decision service that records what it receives.
//!
//! ```toml
//! [dev-dependencies]
//! iamsys-iam = { path = "../iam", features = ["testutil"] }
//! ```

use std::{sync::Arc, time::Duration};

use axum::{
    Json, Router,
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    routing::post,
};
use iamsys_authn::testutil::TestServer;
use iamsys_storage::testutil::fast_backoff;
use parking_lot::Mutex;
use reqwest::Url;
use serde_json::{Value, json};

use crate::{
    config::{BootstrapOptions, IamSysConfig},
    document::IamDocument,
    policy::Policy,
};

/// Configuration with fast watch backoff and a ticker slow enough to never
/// fire during a test.
#[must_use]
pub fn test_config() -> IamSysConfig {
    IamSysConfig::builder()
        .refresh_interval(Duration::from_secs(3600))
        .store_timeout(Duration::from_secs(5))
        .decision_timeout(Duration::from_secs(2))
        .watch_backoff(fast_backoff())
        .build()
}

/// [`test_config`] with the periodic refresh every `interval`.
#[must_use]
pub fn ticking_config(interval: Duration) -> IamSysConfig {
    IamSysConfig { refresh_interval: interval, ..test_config() }
}

/// Parses a policy from its JSON form.
///
/// # Panics
///
/// Panics if `value` is not a valid policy.
pub fn policy(value: Value) -> Policy {
    serde_json::from_value(value).expect("fixture policy")
}

/// A policy allowing `action` on every resource under `bucket`.
pub fn allow_bucket(action: &str, bucket: &str) -> Policy {
    policy(json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Effect": "Allow",
            "Action": action,
            "Resource": [format!("arn:aws:s3:::{bucket}"), format!("arn:aws:s3:::{bucket}/*")],
        }]
    }))
}

/// The document a fresh embedded deployment bootstraps.
#[must_use]
pub fn embedded_document() -> IamDocument {
    IamDocument::bootstrap(&BootstrapOptions::default())
}

/// An `openid` document using the key set at `jwks_url`.
///
/// # Panics
///
/// Panics if `jwks_url` is not a URL.
pub fn openid_document(jwks_url: &str) -> IamDocument {
    let jwks_url = Url::parse(jwks_url).expect("jwks url");
    let options = BootstrapOptions::builder().jwks_url(jwks_url).build();
    IamDocument::bootstrap(&options)
}

/// Serializes `document`.
///
/// # Panics
///
/// Panics if serialization fails.
pub fn document_bytes(document: &IamDocument) -> Vec<u8> {
    document.to_vec().expect("serialize fixture document")
}

/// One request received by a [`DecisionService`].
#[derive(Debug, Clone)]
pub struct RecordedDecision {
    /// The `Authorization` header, if any.
    pub authorization: Option<String>,
    /// The request body.
    pub body: Value,
}

/// A fake decision service answering on `/v1/data/iam/allow`.
pub struct DecisionService {
    server: TestServer,
    received: Arc<Mutex<Vec<RecordedDecision>>>,
}

impl DecisionService {
    /// Answers every request with `{"result": {"allow": allow}}`.
    pub async fn spawn(allow: bool) -> Self {
        Self::spawn_raw(StatusCode::OK, json!({"result": {"allow": allow}}).to_string()).await
    }

    /// Answers every request with `status` and `body`.
    pub async fn spawn_raw(status: StatusCode, body: impl Into<String>) -> Self {
        let body = body.into();
        let received = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&received);

        let router = Router::new().route(
            "/v1/data/iam/allow",
            post(move |headers: HeaderMap, Json(request): Json<Value>| {
                let recorder = Arc::clone(&recorder);
                let body = body.clone();
                async move {
                    let authorization = headers
                        .get(AUTHORIZATION)
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_owned);
                    recorder.lock().push(RecordedDecision { authorization, body: request });
                    (status, body)
                }
            }),
        );
        Self { server: TestServer::spawn(router).await, received }
    }

    /// The decision endpoint.
    ///
    /// # Panics
    ///
    /// Panics if the bound address does not form a URL.
    pub fn url(&self) -> Url {
        Url::parse(&self.server.url("/v1/data/iam/allow")).expect("decision service url")
    }

    /// Requests received so far.
    pub fn received(&self) -> Vec<RecordedDecision> {
        self.received.lock().clone()
    }
}

/// A URL on a local port with nothing listening.
///
/// # Panics
///
/// Panics if no ephemeral port can be bound.
pub fn unreachable_url() -> Url {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    let addr = listener.local_addr().expect("ephemeral address");
    drop(listener);
    Url::parse(&format!("http://{addr}/v1/data/iam/allow")).expect("unreachable url")
}

/// Asserts that a [`Result`](crate::Result) is an `Err` matching the given
/// [`IamError`](crate::IamError) variant.
///
/// # Examples
///
/// ```no_run
/// // Requires the `testutil` feature to be enabled.
/// use iamsys_iam::{IamError, Result, assert_iam_error};
///
/// let result: Result<()> = Err(IamError::NotReady);
/// assert_iam_error!(result, NotReady);
/// ```
#[macro_export]
macro_rules! assert_iam_error {
    ($result:expr, $variant:ident) => {{
        let result = $result;
        assert!(
            matches!(result, Err($crate::IamError::$variant { .. })),
            "expected IamError::{}, got: {:?}",
            stringify!($variant),
            result,
        );
    }};
    ($result:expr, $variant:ident, $msg:expr) => {{
        let result = $result;
        assert!(
            matches!(result, Err($crate::IamError::$variant { .. })),
            "{}: expected IamError::{}, got: {:?}",
            $msg,
            stringify!($variant),
            result,
        );
    }};
}
