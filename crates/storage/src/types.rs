//! Common types shared by the storage backends and their consumers.

use bytes::Bytes;

/// Key-value pair returned from prefix queries.
///
/// # Examples
///
/// ```
/// use bytes::Bytes;
/// use iamsys_storage::KeyValue;
///
/// let kv = KeyValue::new("users/AKIA1", Bytes::from(r#"{"accessKey":"AKIA1"}"#));
/// assert_eq!(kv.key, "users/AKIA1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    /// The key identifying this entry.
    pub key: String,

    /// The value stored at this key.
    pub value: Bytes,
}

impl KeyValue {
    /// Creates a new key-value pair.
    pub fn new(key: impl Into<String>, value: Bytes) -> Self {
        Self { key: key.into(), value }
    }
}

/// Kind of change observed on a watched key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchEventKind {
    /// The key did not exist before this write.
    Create,
    /// The key existed and its value was replaced.
    Modify,
    /// The key was deleted, either explicitly or by lease expiry.
    Delete,
}

/// A single change delivered by a coordination store watch stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    /// What happened to the key.
    pub kind: WatchEventKind,
    /// Full key as stored, including any path prefix.
    pub key: String,
    /// The new value. Empty for [`WatchEventKind::Delete`].
    pub value: Bytes,
}

impl WatchEvent {
    /// Returns `true` for create and modify events.
    #[must_use]
    pub fn is_upsert(&self) -> bool {
        matches!(self.kind, WatchEventKind::Create | WatchEventKind::Modify)
    }
}

/// Whether a watch matches one key exactly or every key under a prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WatchScope {
    /// Match only the exact key.
    #[default]
    Key,
    /// Match every key that starts with the watched key.
    Prefix,
}

impl WatchScope {
    /// Returns `true` if `key` falls inside a watch registered on `watched`.
    #[must_use]
    pub fn matches(self, watched: &str, key: &str) -> bool {
        match self {
            Self::Key => watched == key,
            Self::Prefix => key.starts_with(watched),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watch_scope_matches() {
        assert!(WatchScope::Key.matches("config/iam/iam.json", "config/iam/iam.json"));
        assert!(!WatchScope::Key.matches("config/iam/iam.json", "config/iam/iam.json.bak"));
        assert!(WatchScope::Prefix.matches("users/", "users/AKIA1"));
        assert!(!WatchScope::Prefix.matches("users/", "config/iam/iam.json"));
    }

    #[test]
    fn test_is_upsert() {
        let mut event =
            WatchEvent { kind: WatchEventKind::Create, key: "k".into(), value: Bytes::new() };
        assert!(event.is_upsert());
        event.kind = WatchEventKind::Modify;
        assert!(event.is_upsert());
        event.kind = WatchEventKind::Delete;
        assert!(!event.is_upsert());
    }
}
