//! Account policies and authorization decisions.
//!
//! [`PolicyEngine`] owns the live account-to-policy map and a
//! [`PolicyDecider`] chosen once from the IAM document:
//!
//! - [`LocalDecider`] evaluates the account's [`Policy`], falling back to
//!   the request's owner flag when the account has no policy at all
//! - [`DecisionServiceDecider`] posts the request to an external decision
//!   service and denies on any failure

mod condition;
mod decider;
mod engine;
mod pattern;
mod statement;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub use condition::{ConditionOperator, Conditions};
pub use decider::{DecisionServiceDecider, LocalDecider, PolicyDecider};
pub use engine::{PolicyEngine, PolicyMap};
pub use pattern::wildcard_match;
pub use statement::{Effect, Policy, RESOURCE_ARN_PREFIX, Statement, StringList};

/// One authorization request.
///
/// Serialized with the field names the decision service receives under
/// `input`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, bon::Builder)]
#[builder(on(String, into))]
pub struct Args {
    /// Account making the request.
    pub account: String,

    /// Requested action, such as `s3:GetObject`.
    pub action: String,

    /// Target bucket.
    #[serde(default)]
    #[builder(default)]
    pub bucket: String,

    /// Request context values for condition evaluation.
    #[serde(default)]
    #[builder(default)]
    pub conditions: HashMap<String, Vec<String>>,

    /// Whether the account owns the target resource.
    #[serde(rename = "owner", default)]
    #[builder(default)]
    pub is_owner: bool,

    /// Target object within the bucket; empty for bucket-level requests.
    #[serde(default)]
    #[builder(default)]
    pub object: String,
}

impl Args {
    /// The resource string policies match against: `bucket` or `bucket/object`.
    #[must_use]
    pub fn resource(&self) -> String {
        if self.object.is_empty() {
            self.bucket.clone()
        } else {
            format!("{}/{}", self.bucket, self.object)
        }
    }
}
