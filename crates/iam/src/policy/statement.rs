//! Policy documents and their statements.

use serde::{Deserialize, Serialize};

use super::{
    Args,
    condition::{self, Conditions},
    pattern::wildcard_match,
};

/// Prefix stripped from resource patterns before matching.
pub const RESOURCE_ARN_PREFIX: &str = "arn:aws:s3:::";

/// One string or a list of strings.
///
/// Policies may write `"Action": "s3:GetObject"` or
/// `"Action": ["s3:GetObject", "s3:PutObject"]`. Always serialized as a list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "OneOrMany")]
pub struct StringList(Vec<String>);

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl From<OneOrMany> for StringList {
    fn from(value: OneOrMany) -> Self {
        match value {
            OneOrMany::One(s) => Self(vec![s]),
            OneOrMany::Many(v) => Self(v),
        }
    }
}

impl<S: Into<String>> FromIterator<S> for StringList {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl StringList {
    /// Iterates over the entries.
    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.0.iter()
    }

    /// Returns `true` if there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn any_matches(&self, value: &str) -> bool {
        self.0.iter().any(|pattern| wildcard_match(pattern, value))
    }
}

/// Whether a matching statement grants or refuses access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    /// Grants access unless another statement denies it.
    Allow,
    /// Refuses access regardless of any allow.
    Deny,
}

/// A single rule in a [`Policy`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Statement {
    /// Optional statement identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,

    /// Allow or deny.
    pub effect: Effect,

    /// Action patterns, such as `s3:GetObject` or `s3:*`.
    pub action: StringList,

    /// Resource patterns, with or without the `arn:aws:s3:::` prefix.
    pub resource: StringList,

    /// Condition blocks that must all hold for the statement to apply.
    #[serde(default, skip_serializing_if = "Conditions::is_empty")]
    pub condition: Conditions,
}

impl Statement {
    /// Returns `true` if this statement covers the request.
    #[must_use]
    pub fn matches(&self, args: &Args) -> bool {
        if !self.action.any_matches(&args.action) {
            return false;
        }

        let resource = args.resource();
        let resource_matches = self
            .resource
            .iter()
            .map(|r| r.strip_prefix(RESOURCE_ARN_PREFIX).unwrap_or(r))
            .any(|pattern| wildcard_match(pattern, &resource));

        resource_matches && condition::evaluate(&self.condition, &args.conditions)
    }
}

/// An account's authorization rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Policy {
    /// Policy language version.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,

    /// Statements, evaluated together.
    #[serde(default)]
    pub statement: Vec<Statement>,
}

impl Policy {
    /// Returns `true` if the policy has no statements.
    ///
    /// An empty policy is equivalent to no policy and is never stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.statement.is_empty()
    }

    /// Evaluates the request against this policy.
    ///
    /// A matching `Deny` overrides any `Allow`. With no matching statement
    /// the request is denied.
    #[must_use]
    pub fn is_allowed(&self, args: &Args) -> bool {
        let mut allowed = false;
        for statement in self.statement.iter().filter(|s| s.matches(args)) {
            match statement.effect {
                Effect::Deny => return false,
                Effect::Allow => allowed = true,
            }
        }
        allowed
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use serde_json::json;

    use super::*;

    fn policy(value: serde_json::Value) -> Policy {
        serde_json::from_value(value).unwrap()
    }

    fn args(action: &str, bucket: &str, object: &str) -> Args {
        Args::builder().account("alice").action(action).bucket(bucket).object(object).build()
    }

    #[test]
    fn test_single_string_or_list() {
        let p = policy(json!({
            "Version": "2012-10-17",
            "Statement": [{
                "Effect": "Allow",
                "Action": "s3:GetObject",
                "Resource": ["arn:aws:s3:::photos/*", "arn:aws:s3:::videos/*"]
            }]
        }));
        assert_eq!(p.statement[0].action.iter().count(), 1);
        assert_eq!(p.statement[0].resource.iter().count(), 2);

        let round_trip = serde_json::to_value(&p).unwrap();
        assert_eq!(round_trip["Statement"][0]["Action"], json!(["s3:GetObject"]));
        assert_eq!(serde_json::from_value::<Policy>(round_trip).unwrap(), p);
    }

    #[test]
    fn test_default_deny() {
        let p = policy(json!({
            "Statement": [{"Effect": "Allow", "Action": "s3:GetObject", "Resource": "photos/*"}]
        }));
        assert!(p.is_allowed(&args("s3:GetObject", "photos", "cat.jpg")));
        assert!(!p.is_allowed(&args("s3:PutObject", "photos", "cat.jpg")));
        assert!(!p.is_allowed(&args("s3:GetObject", "videos", "clip.mp4")));
    }

    #[test]
    fn test_explicit_deny_overrides_allow() {
        let p = policy(json!({
            "Statement": [
                {"Effect": "Allow", "Action": "s3:*", "Resource": "arn:aws:s3:::photos/*"},
                {"Effect": "Deny", "Action": "s3:DeleteObject", "Resource": "arn:aws:s3:::photos/*"}
            ]
        }));
        assert!(p.is_allowed(&args("s3:GetObject", "photos", "a")));
        assert!(!p.is_allowed(&args("s3:DeleteObject", "photos", "a")));
    }

    #[test]
    fn test_bucket_level_resource() {
        let p = policy(json!({
            "Statement": [{"Effect": "Allow", "Action": "s3:ListBucket", "Resource": "arn:aws:s3:::photos"}]
        }));
        assert!(p.is_allowed(&args("s3:ListBucket", "photos", "")));
        assert!(!p.is_allowed(&args("s3:ListBucket", "photos", "x")));
    }

    #[test]
    fn test_conditions_gate_statement() {
        let p = policy(json!({
            "Statement": [{
                "Effect": "Allow",
                "Action": "s3:ListBucket",
                "Resource": "photos",
                "Condition": {"StringLike": {"s3:prefix": "public/*"}}
            }]
        }));
        let mut request = args("s3:ListBucket", "photos", "");
        assert!(!p.is_allowed(&request));
        request.conditions.insert("s3:prefix".into(), vec!["public/2024".into()]);
        assert!(p.is_allowed(&request));
    }

    #[test]
    fn test_owner_flag_does_not_bypass_policy() {
        let p = policy(json!({
            "Statement": [{"Effect": "Deny", "Action": "*", "Resource": "*"}]
        }));
        let mut request = args("s3:GetObject", "photos", "a");
        request.is_owner = true;
        assert!(!p.is_allowed(&request));
    }

    #[test]
    fn test_empty_policy() {
        assert!(Policy::default().is_empty());
        assert!(policy(json!({"Version": "2012-10-17"})).is_empty());
        assert!(!Policy::default().is_allowed(&args("s3:GetObject", "b", "o")));
    }
}
