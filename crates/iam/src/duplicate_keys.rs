//! Duplicate JSON key detection.
//!
//! `serde_json` keeps the last occurrence of a repeated object key, which
//! lets a document silently shadow a credential or policy. This pass walks
//! the raw bytes with a [`DeserializeSeed`] before the document is parsed
//! and rejects any object, at any depth, that names the same key twice.

use std::{collections::HashSet, fmt};

use serde::de::{self, DeserializeSeed, Deserializer, MapAccess, SeqAccess, Visitor};
use serde_json::error::Category;

use crate::error::{IamError, Result};

/// Rejects `data` if any JSON object in it repeats a key.
///
/// # Errors
///
/// Returns [`IamError::StructuralInvalid`] naming the first repeated key and
/// its path, or [`IamError::Serialization`] if `data` is not JSON.
pub fn check_duplicate_keys(data: &[u8]) -> Result<()> {
    let mut deserializer = serde_json::Deserializer::from_slice(data);
    KeyCheck { path: String::from("$") }.deserialize(&mut deserializer).map_err(classify)?;
    deserializer.end().map_err(classify)
}

fn classify(err: serde_json::Error) -> IamError {
    match err.classify() {
        Category::Data => IamError::structural_invalid(err.to_string()),
        Category::Io | Category::Syntax | Category::Eof => IamError::from(err),
    }
}

struct KeyCheck {
    path: String,
}

impl<'de> DeserializeSeed<'de> for KeyCheck {
    type Value = ();

    fn deserialize<D: Deserializer<'de>>(
        self,
        deserializer: D,
    ) -> std::result::Result<(), D::Error> {
        deserializer.deserialize_any(self)
    }
}

impl<'de> Visitor<'de> for KeyCheck {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("any JSON value")
    }

    fn visit_bool<E: de::Error>(self, _: bool) -> std::result::Result<(), E> {
        Ok(())
    }

    fn visit_i64<E: de::Error>(self, _: i64) -> std::result::Result<(), E> {
        Ok(())
    }

    fn visit_u64<E: de::Error>(self, _: u64) -> std::result::Result<(), E> {
        Ok(())
    }

    fn visit_f64<E: de::Error>(self, _: f64) -> std::result::Result<(), E> {
        Ok(())
    }

    fn visit_str<E: de::Error>(self, _: &str) -> std::result::Result<(), E> {
        Ok(())
    }

    fn visit_unit<E: de::Error>(self) -> std::result::Result<(), E> {
        Ok(())
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<(), A::Error> {
        let mut index = 0usize;
        while seq.next_element_seed(KeyCheck { path: format!("{}[{index}]", self.path) })?.is_some()
        {
            index += 1;
        }
        Ok(())
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<(), A::Error> {
        let mut seen = HashSet::new();
        while let Some(key) = map.next_key::<String>()? {
            let path = format!("{}.{key}", self.path);
            if !seen.insert(key) {
                return Err(de::Error::custom(format!("duplicate key at {path}")));
            }
            map.next_value_seed(KeyCheck { path })?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    fn structural(data: &str) -> String {
        match check_duplicate_keys(data.as_bytes()) {
            Err(IamError::StructuralInvalid { message }) => message,
            other => panic!("expected StructuralInvalid for {data}, got {other:?}"),
        }
    }

    #[test]
    fn test_accepts_unique_keys() {
        check_duplicate_keys(br#"{"a": 1, "b": {"a": 2}, "c": [{"a": 3}, {"a": 4}]}"#).unwrap();
        check_duplicate_keys(b"[]").unwrap();
        check_duplicate_keys(b"null").unwrap();
    }

    #[test]
    fn test_top_level_duplicate() {
        let message = structural(r#"{"version": "1", "version": "2"}"#);
        assert!(message.contains("$.version"), "{message}");
    }

    #[test]
    fn test_nested_duplicate_path() {
        let message = structural(r#"{"identity": {"minio": {"users": {"AK": {}, "AK": {}}}}}"#);
        assert!(message.contains("$.identity.minio.users.AK"), "{message}");
    }

    #[test]
    fn test_duplicate_inside_array_element() {
        let message = structural(r#"{"Statement": [{}, {"Effect": "Allow", "Effect": "Deny"}]}"#);
        assert!(message.contains("$.Statement[1].Effect"), "{message}");
    }

    #[test]
    fn test_syntax_errors_are_not_structural() {
        for data in ["{", "{\"a\": }", "", "{} trailing"] {
            let err = check_duplicate_keys(data.as_bytes()).unwrap_err();
            assert!(matches!(err, IamError::Serialization { .. }), "{data:?}: {err:?}");
        }
    }

    #[test]
    fn test_escaped_keys_compare_decoded() {
        let message = structural(r#"{"a": 1, "\u0061": 2}"#);
        assert!(message.contains("$.a"), "{message}");
    }
}
