use std::{collections::HashMap, sync::Arc, time::Duration};

use parking_lot::RwLock;
use reqwest::Url;

use super::{
    Args, Policy,
    decider::{DecisionServiceDecider, LocalDecider, PolicyDecider},
};
use crate::{
    document::{PolicyConfig, PolicyType},
    error::{IamError, Result},
};

/// Account-to-policy map guarded by one reader/writer lock.
///
/// The lock is held only for the map operation itself.
#[derive(Debug, Default)]
pub struct PolicyMap {
    inner: RwLock<HashMap<String, Policy>>,
}

impl PolicyMap {
    /// Stores `policy` for `account`, or removes the entry if `policy` is empty.
    pub fn set(&self, account: impl Into<String>, policy: Policy) {
        let account = account.into();
        let mut map = self.inner.write();
        if policy.is_empty() {
            map.remove(&account);
        } else {
            map.insert(account, policy);
        }
    }

    /// Removes any policy for `account`.
    pub fn remove(&self, account: &str) -> Option<Policy> {
        self.inner.write().remove(account)
    }

    /// Returns a copy of the policy for `account`.
    #[must_use]
    pub fn get(&self, account: &str) -> Option<Policy> {
        self.inner.read().get(account).cloned()
    }

    /// Evaluates the request against its account's policy, or `None` if the
    /// account has no policy.
    #[must_use]
    pub fn evaluate(&self, args: &Args) -> Option<bool> {
        self.inner.read().get(&args.account).map(|p| p.is_allowed(args))
    }

    /// Number of accounts with a policy.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Returns `true` if no account has a policy.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

/// Live account policies plus the decision strategy applied to them.
#[derive(Debug, Clone)]
pub struct PolicyEngine {
    policies: Arc<PolicyMap>,
    decider: Arc<dyn PolicyDecider>,
}

impl PolicyEngine {
    /// An engine that evaluates requests locally.
    #[must_use]
    pub fn local() -> Self {
        let policies = Arc::new(PolicyMap::default());
        let decider = Arc::new(LocalDecider::new(Arc::clone(&policies)));
        Self { policies, decider }
    }

    /// An engine with an explicit decision strategy.
    #[must_use]
    pub fn with_decider(decider: Arc<dyn PolicyDecider>) -> Self {
        Self { policies: Arc::new(PolicyMap::default()), decider }
    }

    /// Builds the engine the policy configuration asks for.
    ///
    /// # Errors
    ///
    /// Returns [`IamError::ConfigInvalid`] when the decision service is
    /// selected without a usable URL, and [`IamError::ValidationFailed`] for
    /// an unset or unsupported policy type.
    pub fn from_config(config: &PolicyConfig, decision_timeout: Duration) -> Result<Self> {
        match &config.kind {
            PolicyType::Embedded => Ok(Self::local()),
            PolicyType::Opa => {
                let raw = config
                    .opa
                    .url
                    .as_deref()
                    .filter(|u| !u.is_empty())
                    .ok_or_else(|| IamError::config_invalid("decision service URL is not set"))?;
                let url = Url::parse(raw).map_err(|e| {
                    IamError::config_invalid(format!("decision service URL {raw:?}: {e}"))
                })?;
                let token = Some(config.opa.auth_token.clone());
                let decider = DecisionServiceDecider::new(url, token, decision_timeout)?;
                Ok(Self::with_decider(Arc::new(decider)))
            },
            other => Err(IamError::validation_failed(format!("unsupported policy type {other}"))),
        }
    }

    /// Stores or, for an empty policy, removes the policy for `account`.
    pub fn set_policy(&self, account: impl Into<String>, policy: Policy) {
        self.policies.set(account, policy);
    }

    /// Removes the policy for `account`.
    pub fn remove_policy(&self, account: &str) {
        self.policies.remove(account);
    }

    /// Returns the policy stored for `account`.
    #[must_use]
    pub fn get_policy(&self, account: &str) -> Option<Policy> {
        self.policies.get(account)
    }

    /// The policy map, shared with the local decider.
    #[must_use]
    pub fn policies(&self) -> &Arc<PolicyMap> {
        &self.policies
    }

    /// Decides the request. Never returns an error: failures deny.
    pub async fn is_allowed(&self, args: &Args) -> bool {
        let allowed = self.decider.is_allowed(args).await;
        if !allowed {
            tracing::debug!(
                account = %args.account,
                action = %args.action,
                decider = self.decider.name(),
                "request denied"
            );
        }
        allowed
    }

    /// Returns `true` if decisions go to an external service.
    #[must_use]
    pub fn is_delegated(&self) -> bool {
        self.decider.is_remote()
    }

    /// Name of the active decision strategy.
    #[must_use]
    pub fn decider_name(&self) -> &'static str {
        self.decider.name()
    }
}
