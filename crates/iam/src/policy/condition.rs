//! Condition blocks attached to policy statements.
//!
//! A condition block maps an operator to a set of `key -> values` pairs:
//!
//! ```json
//! {"StringEquals": {"aws:SourceIp": ["10.0.0.1", "10.0.0.2"]}}
//! ```
//!
//! Every key in every operator must be satisfied. Within one key, any of
//! the listed values may match.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use super::{pattern::wildcard_match, statement::StringList};

/// Comparison applied between a request's condition values and a statement's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ConditionOperator {
    /// Some request value equals some listed value.
    StringEquals,
    /// No request value equals any listed value.
    StringNotEquals,
    /// Some request value matches some listed wildcard pattern.
    StringLike,
    /// No request value matches any listed wildcard pattern.
    StringNotLike,
}

/// All condition blocks of one statement.
pub type Conditions = BTreeMap<ConditionOperator, BTreeMap<String, StringList>>;

impl ConditionOperator {
    fn matches_one(self, expected: &StringList, actual: Option<&Vec<String>>) -> bool {
        match self {
            Self::StringEquals => any_match(expected, actual, |e, a| e == a),
            Self::StringNotEquals => !any_match(expected, actual, |e, a| e == a),
            Self::StringLike => any_match(expected, actual, wildcard_match),
            Self::StringNotLike => !any_match(expected, actual, wildcard_match),
        }
    }
}

fn any_match(
    expected: &StringList,
    actual: Option<&Vec<String>>,
    test: impl Fn(&str, &str) -> bool,
) -> bool {
    actual.is_some_and(|values| {
        values.iter().any(|a| expected.iter().any(|e| test(e.as_str(), a.as_str())))
    })
}

/// Returns `true` if `context` satisfies every condition block.
///
/// A key missing from `context` fails the positive operators and passes
/// the negated ones.
pub fn evaluate(conditions: &Conditions, context: &HashMap<String, Vec<String>>) -> bool {
    conditions.iter().all(|(operator, keys)| {
        keys.iter().all(|(key, expected)| operator.matches_one(expected, context.get(key)))
    })
}
