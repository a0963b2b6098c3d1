//! Account access credentials.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use rand::{
    Rng,
    distr::{Alphanumeric, SampleString},
};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{IamError, Result};

/// Length of a generated temporary access key.
pub const ACCESS_KEY_LEN: usize = 20;

/// Length of a generated temporary secret key.
pub const SECRET_KEY_LEN: usize = 40;

const SESSION_TOKEN_BYTES: usize = 32;

/// An account's access secret.
///
/// Serialized as `{"accessKey", "secretKey", "sessionToken"?, "expiration"?}`
/// with an RFC 3339 expiration. Unknown fields are ignored by the `Deserialize`
/// impl; [`Credential::from_record`] rejects them.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    /// Public identifier. Also the key the credential is stored under.
    pub access_key: String,

    /// Shared secret.
    pub secret_key: String,

    /// Session token for temporary credentials.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,

    /// Instant after which the credential is no longer valid.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_expiration"
    )]
    pub expiration: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .field("expiration", &self.expiration)
            .finish()
    }
}

impl Credential {
    /// Creates a permanent credential.
    #[must_use]
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            session_token: None,
            expiration: None,
        }
    }

    /// Sets the expiration instant.
    #[must_use]
    pub fn with_expiration(mut self, expiration: DateTime<Utc>) -> Self {
        self.expiration = Some(expiration);
        self
    }

    /// Generates a temporary credential with random keys and a session token.
    #[must_use]
    pub fn temporary(expiration: DateTime<Utc>) -> Self {
        let mut rng = rand::rng();
        let access_key = Alphanumeric.sample_string(&mut rng, ACCESS_KEY_LEN).to_uppercase();
        let secret_key = Alphanumeric.sample_string(&mut rng, SECRET_KEY_LEN);
        let mut token = [0u8; SESSION_TOKEN_BYTES];
        rng.fill(&mut token);

        Self {
            access_key,
            secret_key,
            session_token: Some(URL_SAFE_NO_PAD.encode(token)),
            expiration: Some(expiration),
        }
    }

    /// Decodes a coordination store record, rejecting unknown fields.
    ///
    /// # Errors
    ///
    /// Returns the decode error if `bytes` is not a well-formed record.
    pub fn from_record(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice::<StrictCredential>(bytes).map(Into::into)
    }

    /// Returns `true` if the secret is set and the credential has not expired at `now`.
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.secret_key.is_empty() && self.expiration.is_none_or(|exp| exp > now)
    }

    /// Returns `true` if the credential is usable right now.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    /// Rejects credentials without an access key or secret key.
    ///
    /// # Errors
    ///
    /// Returns [`IamError::InvalidCredential`] naming the missing field.
    pub fn check_fields(&self) -> Result<()> {
        if self.access_key.is_empty() {
            return Err(IamError::invalid_credential("access key is empty"));
        }
        if self.secret_key.is_empty() {
            return Err(IamError::invalid_credential("secret key is empty"));
        }
        Ok(())
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct StrictCredential {
    access_key: String,
    secret_key: String,
    #[serde(default)]
    session_token: Option<String>,
    #[serde(default, deserialize_with = "deserialize_expiration")]
    expiration: Option<DateTime<Utc>>,
}

impl From<StrictCredential> for Credential {
    fn from(record: StrictCredential) -> Self {
        Self {
            access_key: record.access_key,
            secret_key: record.secret_key,
            session_token: record.session_token,
            expiration: record.expiration,
        }
    }
}

/// Unix timestamp of `0001-01-01T00:00:00Z`, the zero value some writers
/// emit in place of an absent expiration.
const ZERO_INSTANT_SECS: i64 = -62_135_596_800;

fn deserialize_expiration<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<DateTime<Utc>>::deserialize(deserializer)?;
    Ok(value.filter(|exp| exp.timestamp() != ZERO_INSTANT_SECS))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn test_validity_predicate() {
        let now = Utc::now();
        assert!(Credential::new("AK", "SK").is_valid_at(now));
        assert!(!Credential::new("AK", "").is_valid_at(now));

        let cred = Credential::new("AK", "SK");
        assert!(cred.clone().with_expiration(now + Duration::seconds(1)).is_valid_at(now));
        assert!(!cred.clone().with_expiration(now).is_valid_at(now));
        assert!(!cred.with_expiration(now - Duration::seconds(1)).is_valid_at(now));
    }

    #[test]
    fn test_wire_format() {
        let exp = "2030-01-02T03:04:05Z".parse::<DateTime<Utc>>().unwrap();
        let cred = Credential::new("AKIA", "secret").with_expiration(exp);
        let json = serde_json::to_value(&cred).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "accessKey": "AKIA",
                "secretKey": "secret",
                "expiration": "2030-01-02T03:04:05Z",
            })
        );
        assert_eq!(serde_json::from_value::<Credential>(json).unwrap(), cred);
    }

    #[test]
    fn test_unknown_fields_only_rejected_in_records() {
        let json = r#"{"accessKey":"a","secretKey":"b","status":"enabled"}"#;
        assert!(Credential::from_record(json.as_bytes()).is_err());

        let cred: Credential = serde_json::from_str(json).unwrap();
        assert_eq!(cred, Credential::new("a", "b"));
    }

    #[test]
    fn test_record_decode_matches_lenient_decode() {
        let json = concat!(
            r#"{"accessKey":"a","secretKey":"b","sessionToken":"t","#,
            r#""expiration":"0001-01-01T00:00:00Z"}"#,
        );
        let strict = Credential::from_record(json.as_bytes()).unwrap();
        assert_eq!(strict, serde_json::from_str::<Credential>(json).unwrap());
        assert_eq!(strict.expiration, None);
        assert_eq!(strict.session_token.as_deref(), Some("t"));
    }

    #[test]
    fn test_zero_expiration_means_none() {
        let cred: Credential = serde_json::from_str(
            r#"{"accessKey":"a","secretKey":"b","expiration":"0001-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(cred.expiration, None);
        assert!(cred.is_valid());
    }

    #[test]
    fn test_temporary_shape() {
        let exp = Utc::now() + Duration::hours(1);
        let cred = Credential::temporary(exp);
        assert_eq!(cred.access_key.len(), ACCESS_KEY_LEN);
        assert_eq!(cred.secret_key.len(), SECRET_KEY_LEN);
        assert!(cred.session_token.as_deref().is_some_and(|t| !t.is_empty()));
        assert_eq!(cred.expiration, Some(exp));
        assert!(cred.is_valid());
        assert_ne!(Credential::temporary(exp).access_key, cred.access_key);
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let debug = format!("{:?}", Credential::temporary(Utc::now()));
        assert!(debug.contains("<redacted>"));
        let cred = Credential::new("AK", "hunter2");
        assert!(!format!("{cred:?}").contains("hunter2"));
    }

    #[test]
    fn test_check_fields() {
        assert!(Credential::new("AK", "SK").check_fields().is_ok());
        assert!(matches!(
            Credential::new("", "SK").check_fields(),
            Err(IamError::InvalidCredential { .. })
        ));
        assert!(matches!(
            Credential::new("AK", "").check_fields(),
            Err(IamError::InvalidCredential { .. })
        ));
    }
}
