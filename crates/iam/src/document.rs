//! The persisted IAM configuration document.
//!
//! ```json
//! {
//!   "version": "1",
//!   "identity": {
//!     "type": "minio",
//!     "openid": { "jwt": { "webKeyURL": "https://idp.example.com/jwks" } },
//!     "minio":  { "users": { "AKIA...": { "accessKey": "AKIA...", "secretKey": "..." } } }
//!   },
//!   "policy": {
//!     "type": "minio",
//!     "opa":   { "url": "https://opa.example.com/v1/data/authz/allow", "authToken": "..." },
//!     "minio": { "users": { "alice": { "Version": "2012-10-17", "Statement": [] } } }
//!   }
//! }
//! ```
//!
//! `identity.type` selects where credentials come from (`minio` for the
//! embedded user table, `openid` for token exchange) and `policy.type`
//! selects where decisions come from (`minio` for the embedded policy
//! table, `opa` for an external decision service).

use std::{collections::BTreeMap, fmt};

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::{
    config::BootstrapOptions,
    credential::Credential,
    duplicate_keys::check_duplicate_keys,
    error::{IamError, Result},
    policy::Policy,
};

/// Version written into bootstrapped documents.
pub const DOCUMENT_VERSION: &str = "1";

const EMBEDDED: &str = "minio";
const OPENID: &str = "openid";
const OPA: &str = "opa";

/// Source of account credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum IdentityType {
    /// Missing or empty. Rejected by [`IamDocument::validate`].
    #[default]
    Unset,
    /// Credentials listed in the document (`"minio"`).
    Embedded,
    /// Temporary credentials minted from external bearer tokens (`"openid"`).
    OpenId,
    /// Any other value. Rejected by [`IamDocument::validate`].
    Other(String),
}

impl From<String> for IdentityType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "" => Self::Unset,
            EMBEDDED => Self::Embedded,
            OPENID => Self::OpenId,
            _ => Self::Other(value),
        }
    }
}

impl From<IdentityType> for String {
    fn from(value: IdentityType) -> Self {
        match value {
            IdentityType::Unset => String::new(),
            IdentityType::Embedded => EMBEDDED.to_owned(),
            IdentityType::OpenId => OPENID.to_owned(),
            IdentityType::Other(other) => other,
        }
    }
}

impl fmt::Display for IdentityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from(self.clone()))
    }
}

/// Source of authorization decisions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PolicyType {
    /// Missing or empty. Rejected by [`IamDocument::validate`].
    #[default]
    Unset,
    /// Policies listed in the document, evaluated locally (`"minio"`).
    Embedded,
    /// An external decision service (`"opa"`).
    Opa,
    /// Any other value. Rejected by [`IamDocument::validate`].
    Other(String),
}

impl From<String> for PolicyType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "" => Self::Unset,
            EMBEDDED => Self::Embedded,
            OPA => Self::Opa,
            _ => Self::Other(value),
        }
    }
}

impl From<PolicyType> for String {
    fn from(value: PolicyType) -> Self {
        match value {
            PolicyType::Unset => String::new(),
            PolicyType::Embedded => EMBEDDED.to_owned(),
            PolicyType::Opa => OPA.to_owned(),
            PolicyType::Other(other) => other,
        }
    }
}

impl fmt::Display for PolicyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from(self.clone()))
    }
}

/// Token verification settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtArgs {
    /// Where the signing key set is published.
    #[serde(rename = "webKeyURL", default, skip_serializing_if = "Option::is_none")]
    pub web_key_url: Option<String>,
}

/// External identity settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenIdConfig {
    /// Token verification settings.
    #[serde(default)]
    pub jwt: JwtArgs,
}

/// Credentials embedded in the document, keyed by access key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddedUsers {
    /// Access key to credential.
    #[serde(default)]
    pub users: BTreeMap<String, Credential>,
}

/// The `identity` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Which identity source is active.
    #[serde(rename = "type", default)]
    pub kind: IdentityType,

    /// External identity settings.
    #[serde(default)]
    pub openid: OpenIdConfig,

    /// Embedded credentials.
    #[serde(default)]
    pub minio: EmbeddedUsers,
}

/// Decision service settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpaArgs {
    /// Decision endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Sent as the `Authorization` header when non-empty.
    #[serde(rename = "authToken", default, skip_serializing_if = "String::is_empty")]
    pub auth_token: String,
}

/// Policies embedded in the document, keyed by account name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddedPolicies {
    /// Account name to policy.
    #[serde(default)]
    pub users: BTreeMap<String, Policy>,
}

/// The `policy` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Which decision source is active.
    #[serde(rename = "type", default)]
    pub kind: PolicyType,

    /// Decision service settings.
    #[serde(default)]
    pub opa: OpaArgs,

    /// Embedded policies.
    #[serde(default)]
    pub minio: EmbeddedPolicies,
}

/// The IAM configuration document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IamDocument {
    /// Document format version.
    #[serde(default)]
    pub version: String,

    /// Identity source and embedded credentials.
    #[serde(default)]
    pub identity: IdentityConfig,

    /// Decision source and embedded policies.
    #[serde(default)]
    pub policy: PolicyConfig,
}

impl IamDocument {
    /// Builds the default document for a deployment with no stored configuration.
    ///
    /// Identity is `openid` only when a key set URL is supplied, and policy is
    /// `opa` only when a decision service URL is supplied. Both otherwise
    /// default to the embedded tables, which start empty.
    #[must_use]
    pub fn bootstrap(options: &BootstrapOptions) -> Self {
        let identity = match &options.jwks_url {
            Some(url) => IdentityConfig {
                kind: IdentityType::OpenId,
                openid: OpenIdConfig { jwt: JwtArgs { web_key_url: Some(url.to_string()) } },
                ..IdentityConfig::default()
            },
            None => IdentityConfig { kind: IdentityType::Embedded, ..IdentityConfig::default() },
        };

        let policy = match &options.decision_url {
            Some(url) => PolicyConfig {
                kind: PolicyType::Opa,
                opa: OpaArgs {
                    url: Some(url.to_string()),
                    auth_token: options.decision_auth_token.clone().unwrap_or_default(),
                },
                ..PolicyConfig::default()
            },
            None => PolicyConfig { kind: PolicyType::Embedded, ..PolicyConfig::default() },
        };

        Self { version: DOCUMENT_VERSION.to_owned(), identity, policy }
    }

    /// Parses raw document bytes.
    ///
    /// Duplicate keys are rejected before the bytes are decoded, and the
    /// decoded document is validated.
    ///
    /// # Errors
    ///
    /// - [`IamError::StructuralInvalid`] if any object repeats a key
    /// - [`IamError::Serialization`] if the bytes do not decode
    /// - [`IamError::ValidationFailed`] from [`validate`](Self::validate)
    pub fn parse(data: &[u8]) -> Result<Self> {
        check_duplicate_keys(data)?;
        let document: Self = serde_json::from_slice(data)?;
        document.validate()?;
        Ok(document)
    }

    /// Encodes the document as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`IamError::Serialization`] if encoding fails.
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Checks that both source types are set to supported values and that
    /// any configured URLs parse.
    ///
    /// # Errors
    ///
    /// Returns [`IamError::ValidationFailed`] describing the first failure.
    pub fn validate(&self) -> Result<()> {
        match &self.identity.kind {
            IdentityType::Embedded | IdentityType::OpenId => {},
            IdentityType::Unset => {
                return Err(IamError::validation_failed(
                    "IAM identity configuration type cannot be empty, supported values are \
                     ['minio', 'openid']",
                ));
            },
            IdentityType::Other(other) => {
                return Err(IamError::validation_failed(format!(
                    "unsupported IAM identity configuration type {other:?}, supported values are \
                     ['minio', 'openid']"
                )));
            },
        }

        match &self.policy.kind {
            PolicyType::Embedded | PolicyType::Opa => {},
            PolicyType::Unset => {
                return Err(IamError::validation_failed(
                    "IAM policy configuration type cannot be empty, supported values are \
                     ['opa', 'minio']",
                ));
            },
            PolicyType::Other(other) => {
                return Err(IamError::validation_failed(format!(
                    "unsupported IAM policy configuration type {other:?}, supported values are \
                     ['opa', 'minio']"
                )));
            },
        }

        let web_key_url = self.identity.openid.jwt.web_key_url.as_deref();
        check_url("identity.openid.jwt.webKeyURL", web_key_url)?;
        check_url("policy.opa.url", self.policy.opa.url.as_deref())
    }

    /// The key set URL, if set and non-empty.
    #[must_use]
    pub fn jwks_url(&self) -> Option<&str> {
        self.identity.openid.jwt.web_key_url.as_deref().filter(|u| !u.is_empty())
    }
}

fn check_url(field: &str, value: Option<&str>) -> Result<()> {
    match value.filter(|v| !v.is_empty()) {
        Some(raw) => Url::parse(raw)
            .map(|_| ())
            .map_err(|e| IamError::validation_failed(format!("{field} {raw:?} is not a URL: {e}"))),
        None => Ok(()),
    }
}
