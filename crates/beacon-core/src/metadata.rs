//! Size-bounded, schema-validated event metadata.
//!
//! Producers attach free-form attributes to events. To keep storage bounded
//! and privacy-safe, metadata is restricted to a flat map of primitive
//! values; free-text content keys are dropped, nested structures are
//! dropped, and the serialized map is truncated to a byte ceiling.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Default ceiling on the serialized size of a metadata map, in bytes.
pub const DEFAULT_BYTE_CEILING: usize = 4096;

/// Keys that carry free-text or conversational content and are never
/// stored, regardless of value type.
const BLOCKED_KEYS: &[&str] = &[
    "message",
    "messages",
    "prompt",
    "completion",
    "input",
    "output",
    "text",
    "content",
    "conversation",
    "thread",
    "assistant",
    "response",
];

/// A primitive metadata value.
///
/// Nested objects and arrays are rejected during sanitization; new producer
/// fields remain forward-compatible as long as they are primitives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    /// Explicit null.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Numeric value (integer or float).
    Number(serde_json::Number),
    /// String value.
    String(String),
}

impl MetadataValue {
    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(Self::Null),
            Value::Bool(b) => Some(Self::Bool(*b)),
            Value::Number(n) => Some(Self::Number(n.clone())),
            Value::String(s) => Some(Self::String(s.clone())),
            Value::Array(_) | Value::Object(_) => None,
        }
    }
}

/// A sanitized, size-bounded metadata map.
///
/// Keys are kept sorted so truncation is deterministic: when the map
/// exceeds the byte ceiling, keys are dropped from the end of the sort
/// order until it fits, and the number of dropped keys is recorded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataMap {
    /// The surviving key/value pairs.
    #[serde(default)]
    pub values: BTreeMap<String, MetadataValue>,
    /// Number of keys dropped by blocking, type rejection, or truncation.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub dropped_keys: u32,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero(n: &u32) -> bool {
    *n == 0
}

impl MetadataMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sanitizes a raw JSON payload into a bounded metadata map.
    ///
    /// Non-object payloads produce an empty map. Blocked keys, nested
    /// values, and keys beyond the byte ceiling are dropped and counted.
    #[must_use]
    pub fn sanitize(raw: Option<&Value>, byte_ceiling: usize) -> Self {
        let mut map = Self::new();
        let Some(Value::Object(object)) = raw else {
            return map;
        };

        for (key, value) in object {
            if BLOCKED_KEYS.contains(&key.as_str()) {
                map.dropped_keys += 1;
                continue;
            }
            match MetadataValue::from_json(value) {
                Some(primitive) => {
                    map.values.insert(key.clone(), primitive);
                }
                None => map.dropped_keys += 1,
            }
        }

        map.truncate_to(byte_ceiling);
        map
    }

    /// Inserts a string value, replacing any existing entry for the key.
    pub fn insert_str(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values
            .insert(key.into(), MetadataValue::String(value.into()));
    }

    /// Returns true if the map holds no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the serialized size of the map in bytes.
    #[must_use]
    pub fn serialized_len(&self) -> usize {
        serde_json::to_vec(self).map_or(0, |v| v.len())
    }

    /// Drops keys from the end of the sort order until the serialized map
    /// fits the ceiling.
    fn truncate_to(&mut self, byte_ceiling: usize) {
        while !self.values.is_empty() && self.serialized_len() > byte_ceiling {
            self.values.pop_last();
            self.dropped_keys += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sanitize_keeps_primitives_only() {
        let raw = json!({
            "utm_source": "newsletter",
            "count": 3,
            "active": true,
            "missing": null,
            "nested": { "a": 1 },
            "list": [1, 2, 3],
        });
        let map = MetadataMap::sanitize(Some(&raw), DEFAULT_BYTE_CEILING);

        assert_eq!(map.values.len(), 4);
        assert_eq!(map.dropped_keys, 2);
        assert_eq!(
            map.values.get("utm_source"),
            Some(&MetadataValue::String("newsletter".into()))
        );
        assert_eq!(map.values.get("missing"), Some(&MetadataValue::Null));
    }

    #[test]
    fn test_sanitize_drops_blocked_keys() {
        let raw = json!({
            "prompt": "tell me everything",
            "content": "long free text",
            "plan": "lunar",
        });
        let map = MetadataMap::sanitize(Some(&raw), DEFAULT_BYTE_CEILING);

        assert_eq!(map.values.len(), 1);
        assert!(map.values.contains_key("plan"));
        assert_eq!(map.dropped_keys, 2);
    }

    #[test]
    fn test_non_object_payload_is_empty() {
        assert!(MetadataMap::sanitize(Some(&json!("hello")), 1024).is_empty());
        assert!(MetadataMap::sanitize(Some(&json!([1, 2])), 1024).is_empty());
        assert!(MetadataMap::sanitize(None, 1024).is_empty());
    }

    #[test]
    fn test_truncation_is_deterministic() {
        let mut object = serde_json::Map::new();
        for i in 0..50 {
            object.insert(format!("key_{i:02}"), json!("x".repeat(40)));
        }
        let raw = Value::Object(object);

        let a = MetadataMap::sanitize(Some(&raw), 512);
        let b = MetadataMap::sanitize(Some(&raw), 512);

        assert_eq!(a, b);
        assert!(a.serialized_len() <= 512);
        assert!(a.dropped_keys > 0);
        // Keys survive in sort order from the front.
        assert!(a.values.contains_key("key_00"));
        assert!(!a.values.contains_key("key_49"));
    }

    #[test]
    fn test_serde_roundtrip() {
        let raw = json!({ "plan": "solstice", "trial_days_remaining": 7 });
        let map = MetadataMap::sanitize(Some(&raw), DEFAULT_BYTE_CEILING);
        let encoded = serde_json::to_string(&map).unwrap();
        let decoded: MetadataMap = serde_json::from_str(&encoded).unwrap();
        assert_eq!(map, decoded);
    }
}
