//! Decision strategies.
//!
//! The strategy is chosen once when the policy configuration is parsed.
//! Callers only see [`PolicyDecider::is_allowed`], so a new decision source
//! is added by implementing the trait.

use std::{fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use fail::fail_point;
use reqwest::{StatusCode, Url, header::AUTHORIZATION};
use serde::{Deserialize, Serialize};

use super::{Args, engine::PolicyMap};
use crate::error::{IamError, Result};

/// Produces an allow or deny verdict for an authorization request.
///
/// Implementations must fail closed: any error becomes `false`.
#[async_trait]
pub trait PolicyDecider: Send + Sync + fmt::Debug {
    /// Returns `true` if the request is allowed.
    async fn is_allowed(&self, args: &Args) -> bool;

    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Returns `true` if verdicts come from outside the process.
    fn is_remote(&self) -> bool {
        false
    }
}

/// Evaluates requests against the in-memory policy map.
///
/// Accounts with no policy fall back to the request's owner flag.
#[derive(Debug, Clone)]
pub struct LocalDecider {
    policies: Arc<PolicyMap>,
}

impl LocalDecider {
    /// Creates a decider reading from `policies`.
    #[must_use]
    pub fn new(policies: Arc<PolicyMap>) -> Self {
        Self { policies }
    }
}

#[async_trait]
impl PolicyDecider for LocalDecider {
    async fn is_allowed(&self, args: &Args) -> bool {
        match self.policies.evaluate(args) {
            Some(allowed) => allowed,
            None => args.is_owner,
        }
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

#[derive(Serialize)]
struct DecisionRequest<'a> {
    input: &'a Args,
}

#[derive(Deserialize)]
struct DecisionResponse {
    result: DecisionResult,
}

#[derive(Deserialize)]
struct DecisionResult {
    allow: bool,
}

/// Delegates every decision to an external decision service.
///
/// The request is posted as `{"input": <Args>}` and the service must answer
/// `{"result": {"allow": <bool>}}`. Connection failures, non-`200` statuses
/// and any other response shape all deny. The local policy map is never
/// consulted.
///
/// The client does not verify TLS certificates.
pub struct DecisionServiceDecider {
    client: reqwest::Client,
    url: Url,
    auth_token: Option<String>,
}

impl fmt::Debug for DecisionServiceDecider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecisionServiceDecider")
            .field("url", &self.url.as_str())
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

impl DecisionServiceDecider {
    /// Creates a decider posting to `url`.
    ///
    /// An empty `auth_token` is treated as absent.
    ///
    /// # Errors
    ///
    /// Returns [`IamError::Transport`] if the HTTP client cannot be built.
    pub fn new(url: Url, auth_token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(timeout)
            .build()
            .map_err(|e| IamError::transport_with_source("failed to build decision client", e))?;

        Ok(Self { client, url, auth_token: auth_token.filter(|t| !t.is_empty()) })
    }

    /// The decision service endpoint.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    async fn query(&self, args: &Args) -> Result<bool> {
        let mut request = self.client.post(self.url.clone()).json(&DecisionRequest { input: args });
        if let Some(token) = &self.auth_token {
            request = request.header(AUTHORIZATION, token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| IamError::transport_with_source("decision request failed", e))?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(IamError::transport(format!("decision service returned {status}")));
        }

        let body: DecisionResponse = response
            .json()
            .await
            .map_err(|e| IamError::transport_with_source("undecodable decision response", e))?;
        Ok(body.result.allow)
    }
}

#[async_trait]
impl PolicyDecider for DecisionServiceDecider {
    #[tracing::instrument(skip(self, args), fields(account = %args.account, action = %args.action))]
    async fn is_allowed(&self, args: &Args) -> bool {
        fail_point!("decision-before-request", |_| {
            tracing::warn!("injected decision service failure, denying");
            false
        });

        match self.query(args).await {
            Ok(allowed) => allowed,
            Err(err) => {
                tracing::warn!(
                    url = %self.url,
                    error = %err,
                    "decision service unavailable, denying"
                );
                false
            },
        }
    }

    fn name(&self) -> &'static str {
        "decision-service"
    }

    fn is_remote(&self) -> bool {
        true
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        policy::Policy,
        testutil::{DecisionService, unreachable_url},
    };

    fn args(account: &str, is_owner: bool) -> Args {
        Args::builder()
            .account(account)
            .action("s3:GetObject")
            .bucket("photos")
            .object("a.jpg")
            .is_owner(is_owner)
            .build()
    }

    #[tokio::test]
    async fn test_local_owner_fallback_only_without_policy() {
        let map = Arc::new(PolicyMap::default());
        let decider = LocalDecider::new(Arc::clone(&map));

        assert!(!decider.is_allowed(&args("alice", false)).await);
        assert!(decider.is_allowed(&args("alice", true)).await);

        let deny_all: Policy = serde_json::from_value(json!({
            "Statement": [{"Effect": "Deny", "Action": "*", "Resource": "*"}]
        }))
        .unwrap();
        map.set("alice", deny_all);
        assert!(!decider.is_allowed(&args("alice", true)).await);
    }

    #[test]
    fn test_empty_token_is_absent() {
        let url = Url::parse("http://127.0.0.1:1/v1/data/authz").unwrap();
        let decider =
            DecisionServiceDecider::new(url, Some(String::new()), Duration::from_secs(1)).unwrap();
        assert!(decider.auth_token.is_none());
        assert!(decider.is_remote());
    }

    #[tokio::test]
    async fn test_query_failures_are_transport_errors() {
        let decider =
            DecisionServiceDecider::new(unreachable_url(), None, Duration::from_secs(1)).unwrap();
        let err = decider.query(&args("alice", false)).await.unwrap_err();
        assert!(matches!(err, IamError::Transport { source: Some(_), .. }), "got {err:?}");

        let service = DecisionService::spawn_raw(StatusCode::FORBIDDEN, "{}").await;
        let decider =
            DecisionServiceDecider::new(service.url(), None, Duration::from_secs(1)).unwrap();
        let err = decider.query(&args("alice", false)).await.unwrap_err();
        assert!(matches!(err, IamError::Transport { source: None, .. }), "got {err:?}");
        assert!(err.to_string().contains("403"), "got {err}");

        let service = DecisionService::spawn_raw(StatusCode::OK, "not json").await;
        let decider =
            DecisionServiceDecider::new(service.url(), None, Duration::from_secs(1)).unwrap();
        let err = decider.query(&args("alice", false)).await.unwrap_err();
        assert!(matches!(err, IamError::Transport { source: Some(_), .. }), "got {err:?}");
    }

    #[test]
    fn test_request_envelope() {
        let args = args("alice", false);
        let body = serde_json::to_value(DecisionRequest { input: &args }).unwrap();
        assert_eq!(body["input"]["account"], "alice");
        assert_eq!(body["input"]["owner"], false);
    }

    #[test]
    fn test_response_shape() {
        let ok: DecisionResponse = serde_json::from_str(r#"{"result":{"allow":true}}"#).unwrap();
        assert!(ok.result.allow);
        assert!(serde_json::from_str::<DecisionResponse>(r#"{"allow":true}"#).is_err());
        assert!(serde_json::from_str::<DecisionResponse>(r#"{"result":{"allow":"yes"}}"#).is_err());
    }
}
