//! Serde helpers for layout fields that distinguish `null` from absent

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Serialize Option<T> as null when None (don't skip the field)
pub fn serialize_option_as_null<T, S>(value: &Option<T>, serializer: S) -> Result<S::Ok, S::Error>
where
    T: Serialize,
    S: Serializer,
{
    match value {
        Some(v) => serializer.serialize_some(v),
        None => serializer.serialize_none(),
    }
}

/// Deserialize a field whose explicit `null` must survive as `Some(Value::Null)`
///
/// Pair with `#[serde(default)]` so an absent field stays `None`.
pub fn deserialize_present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}
