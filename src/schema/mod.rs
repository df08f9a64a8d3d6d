//! JSON Schema helpers
//!
//! Dialect normalization, `$ref` resolution, schema lookups by value key,
//! required-field lookup and the default widget inference table.

pub mod normalize;
pub mod refs;

pub use normalize::{normalize_schema, wrap_legacy_schema};
pub use refs::resolve_refs;

use serde_json::{Map, Value};

use crate::errors::PathError;
use crate::utils::path::{get_by_path, schema_path_for};

/// Declared type of a schema node
///
/// A type list (`["string", "null"]`) yields its first non-null entry.
pub fn schema_type(schema: &Value) -> Option<&str> {
    match schema.get("type")? {
        Value::String(ty) => Some(ty.as_str()),
        Value::Array(types) => types
            .iter()
            .filter_map(Value::as_str)
            .find(|ty| *ty != "null"),
        _ => None,
    }
}

/// Properties map of an object schema
pub fn properties(schema: &Value) -> Option<&Map<String, Value>> {
    schema.get("properties").and_then(Value::as_object)
}

/// Schema node describing the value at `key`
///
/// `key` may be generic (`a[].b`) or concrete (`a[3].b`).
pub fn schema_node_for_key<'a>(schema: &'a Value, key: &str) -> Result<Option<&'a Value>, PathError> {
    if key.is_empty() {
        return Err(PathError::Empty);
    }
    let props = match schema.get("properties") {
        Some(props) => props,
        None => return Ok(None),
    };
    get_by_path(props, &schema_path_for(key), true)
}

/// `true` when the immediate parent lists the key's last segment as required
pub fn is_required_field(schema: &Value, key: &str) -> Result<bool, PathError> {
    let (parent_key, name) = match key.rfind('.') {
        Some(pos) => (&key[..pos], &key[pos + 1..]),
        None => ("", key),
    };
    if name.is_empty() || name.contains('[') {
        return Ok(false);
    }
    let parent = if parent_key.is_empty() {
        Some(schema)
    } else {
        schema_node_for_key(schema, parent_key)?
    };
    Ok(parent
        .and_then(|node| node.get("required"))
        .and_then(Value::as_array)
        .map(|required| required.iter().any(|entry| entry.as_str() == Some(name)))
        .unwrap_or(false))
}

/// Widget kind used when a layout element does not name one
pub fn infer_widget(schema: &Value) -> String {
    let has_enum = schema.get("enum").is_some();
    let ty = schema_type(schema);
    let format = schema.get("format").and_then(Value::as_str);

    let kind = match ty {
        Some("string") if format == Some("color") => "color",
        Some("number") | Some("integer") if !has_enum => "number",
        Some("string") | Some("any") if !has_enum => "text",
        Some("boolean") => "checkbox",
        Some("object") => {
            if properties(schema).is_some() {
                "fieldset"
            } else {
                "textarea"
            }
        }
        _ if has_enum => "select",
        Some(other) => other,
        None => "text",
    };
    kind.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_schema_type_picks_first_non_null() {
        assert_eq!(schema_type(&json!({"type": ["null", "integer"]})), Some("integer"));
        assert_eq!(schema_type(&json!({"type": "string"})), Some("string"));
        assert_eq!(schema_type(&json!({})), None);
    }

    #[test]
    fn test_schema_node_for_key() {
        let schema = json!({
            "properties": {
                "friends": {"type": "array", "items": {"type": "object", "properties": {"name": {"type": "string"}}}}
            }
        });
        let node = schema_node_for_key(&schema, "friends[].name").unwrap().unwrap();
        assert_eq!(node, &json!({"type": "string"}));
        assert!(schema_node_for_key(&schema, "friends[2].name").unwrap().is_some());
        assert!(schema_node_for_key(&schema, "enemies").unwrap().is_none());
    }

    #[test]
    fn test_required_only_checks_immediate_parent() {
        let schema = json!({
            "required": ["person"],
            "properties": {
                "person": {"type": "object", "required": ["name"], "properties": {
                    "name": {"type": "string"},
                    "age": {"type": "integer"}
                }}
            }
        });
        assert!(is_required_field(&schema, "person").unwrap());
        assert!(is_required_field(&schema, "person.name").unwrap());
        assert!(!is_required_field(&schema, "person.age").unwrap());
    }

    #[test]
    fn test_widget_inference_table() {
        assert_eq!(infer_widget(&json!({"type": "string", "format": "color"})), "color");
        assert_eq!(infer_widget(&json!({"type": "integer"})), "number");
        assert_eq!(infer_widget(&json!({"type": "string"})), "text");
        assert_eq!(infer_widget(&json!({"type": "boolean"})), "checkbox");
        assert_eq!(infer_widget(&json!({"type": "object", "properties": {}})), "fieldset");
        assert_eq!(infer_widget(&json!({"type": "object"})), "textarea");
        assert_eq!(infer_widget(&json!({"type": "string", "enum": ["a"]})), "select");
        assert_eq!(infer_widget(&json!({"type": "array"})), "array");
        assert_eq!(infer_widget(&json!({})), "text");
    }
}
