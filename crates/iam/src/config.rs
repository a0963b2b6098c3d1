//! Runtime configuration for the IAM subsystem.
//!
//! [`IamSysConfig`] covers where the document lives and how long the
//! subsystem waits on storage and the decision service. [`BootstrapOptions`]
//! carries the process-start inputs that shape a freshly bootstrapped
//! document; they are only consulted when no document exists yet.

use std::time::Duration;

use iamsys_storage::BackoffConfig;
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::{IamError, Result};

/// Default document path.
pub const DEFAULT_CONFIG_PATH: &str = "config/iam/iam.json";

/// Default interval between periodic refreshes (5 minutes).
const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Default bound on a single document read or write (5 minutes).
const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Default decision service request timeout (10 seconds).
const DEFAULT_DECISION_TIMEOUT: Duration = Duration::from_secs(10);

/// Environment variable holding the key set URL.
pub const JWKS_URL_ENV: &str = "IAMSYS_JWKS_URL";

/// Environment variable holding the decision service URL.
pub const DECISION_URL_ENV: &str = "IAMSYS_DECISION_URL";

/// Environment variable holding the decision service auth token.
pub const DECISION_AUTH_TOKEN_ENV: &str = "IAMSYS_DECISION_AUTH_TOKEN";

/// Configuration for [`IamSys`](crate::IamSys).
///
/// # Example
///
/// ```
/// use std::time::Duration;
///
/// use iamsys_iam::IamSysConfig;
///
/// let config = IamSysConfig::builder()
///     .refresh_interval(Duration::from_secs(60))
///     .build();
/// assert_eq!(config.config_path, "config/iam/iam.json");
/// config.validate().unwrap();
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bon::Builder)]
#[serde(deny_unknown_fields)]
pub struct IamSysConfig {
    /// Path of the IAM document in the configuration store.
    #[serde(default = "default_config_path")]
    #[builder(into, default = default_config_path())]
    pub config_path: String,

    /// Interval between periodic refreshes.
    #[serde(with = "humantime_serde", default = "default_refresh_interval")]
    #[builder(default = DEFAULT_REFRESH_INTERVAL)]
    pub refresh_interval: Duration,

    /// Bound on each document read or write.
    #[serde(with = "humantime_serde", default = "default_store_timeout")]
    #[builder(default = DEFAULT_STORE_TIMEOUT)]
    pub store_timeout: Duration,

    /// Timeout for each decision service request.
    #[serde(with = "humantime_serde", default = "default_decision_timeout")]
    #[builder(default = DEFAULT_DECISION_TIMEOUT)]
    pub decision_timeout: Duration,

    /// Resubscribe schedule for document and credential watches.
    #[serde(default)]
    #[builder(default)]
    pub watch_backoff: BackoffConfig,
}

fn default_config_path() -> String {
    DEFAULT_CONFIG_PATH.to_owned()
}

fn default_refresh_interval() -> Duration {
    DEFAULT_REFRESH_INTERVAL
}

fn default_store_timeout() -> Duration {
    DEFAULT_STORE_TIMEOUT
}

fn default_decision_timeout() -> Duration {
    DEFAULT_DECISION_TIMEOUT
}

impl Default for IamSysConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl IamSysConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`IamError::ConfigInvalid`] for an empty path or a zero
    /// interval or timeout.
    pub fn validate(&self) -> Result<()> {
        if self.config_path.is_empty() {
            return Err(IamError::config_invalid("config_path cannot be empty"));
        }
        for (name, value) in [
            ("refresh_interval", self.refresh_interval),
            ("store_timeout", self.store_timeout),
            ("decision_timeout", self.decision_timeout),
        ] {
            if value.is_zero() {
                return Err(IamError::config_invalid(format!("{name} must be greater than zero")));
            }
        }
        Ok(())
    }
}

/// Inputs that shape a bootstrapped document.
#[derive(Debug, Clone, Default, PartialEq, Eq, bon::Builder)]
pub struct BootstrapOptions {
    /// Enables `openid` identity with this key set.
    pub jwks_url: Option<Url>,

    /// Enables `opa` policy with this decision service.
    pub decision_url: Option<Url>,

    /// Attached to every decision service request.
    pub decision_auth_token: Option<String>,
}

impl BootstrapOptions {
    /// Reads [`JWKS_URL_ENV`], [`DECISION_URL_ENV`] and
    /// [`DECISION_AUTH_TOKEN_ENV`] from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`IamError::ConfigInvalid`] if a URL variable does not parse.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds options from an arbitrary variable source. Empty values count
    /// as unset.
    ///
    /// # Errors
    ///
    /// Returns [`IamError::ConfigInvalid`] if a URL variable does not parse.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let url = |name: &str| {
            var(name)
                .map(|raw| {
                    Url::parse(raw.trim())
                        .map_err(|e| IamError::config_invalid(format!("{name}={raw:?}: {e}")))
                })
                .transpose()
        };

        Ok(Self {
            jwks_url: url(JWKS_URL_ENV)?,
            decision_url: url(DECISION_URL_ENV)?,
            decision_auth_token: var(DECISION_AUTH_TOKEN_ENV),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect();
        move |name: &str| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = IamSysConfig::default();
        assert_eq!(config.config_path, DEFAULT_CONFIG_PATH);
        assert_eq!(config.refresh_interval, Duration::from_secs(300));
        assert_eq!(config.store_timeout, Duration::from_secs(300));
        assert_eq!(config.decision_timeout, Duration::from_secs(10));
        assert_eq!(config.watch_backoff, BackoffConfig::default());
        config.validate().unwrap();
    }

    #[test]
    fn test_deserialize_humantime_with_defaults() {
        let config: IamSysConfig =
            serde_json::from_str(r#"{"refresh_interval": "30s", "decision_timeout": "500ms"}"#)
                .unwrap();
        assert_eq!(config.refresh_interval, Duration::from_secs(30));
        assert_eq!(config.decision_timeout, Duration::from_millis(500));
        assert_eq!(config.store_timeout, DEFAULT_STORE_TIMEOUT);
    }

    #[test]
    fn test_unknown_fields_rejected() {
        assert!(serde_json::from_str::<IamSysConfig>(r#"{"refresh": "30s"}"#).is_err());
    }

    #[test]
    fn test_zero_durations_rejected() {
        let config = IamSysConfig::builder().refresh_interval(Duration::ZERO).build();
        let err = config.validate().unwrap_err();
        assert!(
            matches!(&err, IamError::ConfigInvalid { message } if message.contains("refresh_interval")),
            "got {err:?}"
        );

        let config = IamSysConfig::builder().config_path("").build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bootstrap_from_lookup() {
        let options = BootstrapOptions::from_lookup(lookup(&[
            (JWKS_URL_ENV, "https://idp.example.com/jwks"),
            (DECISION_URL_ENV, ""),
            (DECISION_AUTH_TOKEN_ENV, "Bearer abc"),
        ]))
        .unwrap();

        assert_eq!(options.jwks_url.unwrap().as_str(), "https://idp.example.com/jwks");
        assert!(options.decision_url.is_none());
        assert_eq!(options.decision_auth_token.as_deref(), Some("Bearer abc"));
    }

    #[test]
    fn test_bootstrap_rejects_bad_url() {
        let err = BootstrapOptions::from_lookup(lookup(&[(DECISION_URL_ENV, "not a url")]))
            .unwrap_err();
        assert!(
            matches!(&err, IamError::ConfigInvalid { message } if message.contains(DECISION_URL_ENV)),
            "got {err:?}"
        );
    }

    #[test]
    fn test_bootstrap_empty_environment() {
        assert_eq!(BootstrapOptions::from_lookup(|_| None).unwrap(), BootstrapOptions::default());
    }
}
