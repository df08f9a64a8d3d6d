//! Schema dialect normalization
//!
//! Brings v3-flavoured schemas to the shape the tree builder expects:
//! boolean `required` flags hoisted into the parent's `required` list,
//! `readonly` renamed to `readOnly`, single-element tuple `items` unwrapped.
//! Definitions are normalized as well so that `$ref` targets match.

use serde_json::{Map, Value};

use crate::errors::FormError;

/// Treat a schema with neither `properties` nor `type` as a bare properties map
pub fn wrap_legacy_schema(schema: Value) -> Value {
    let legacy = schema
        .as_object()
        .map(|map| !map.contains_key("properties") && !map.contains_key("type"))
        .unwrap_or(false);
    if !legacy {
        return schema;
    }
    log::debug!("Wrapping legacy schema as an object schema");
    let mut wrapped = Map::new();
    wrapped.insert("properties".to_string(), schema);
    Value::Object(wrapped)
}

/// Normalize a schema in place, top-down
pub fn normalize_schema(schema: &mut Value) -> Result<(), FormError> {
    normalize_node(schema, "")
}

fn normalize_node(node: &mut Value, path: &str) -> Result<(), FormError> {
    let obj = match node.as_object_mut() {
        Some(obj) => obj,
        None => return Ok(()),
    };

    if let Some(read_only) = obj.shift_remove("readonly") {
        obj.entry("readOnly").or_insert(read_only);
    }

    if let Some(items) = obj.get_mut("items") {
        let single = match &mut *items {
            Value::Array(list) if list.len() > 1 => {
                return Err(FormError::SchemaLayoutMismatch(format!(
                    "'{}' declares {} tuple items; array items must share one schema",
                    display_path(path),
                    list.len()
                )));
            }
            Value::Array(list) => list.pop(),
            _ => None,
        };
        if let Some(single) = single {
            *items = single;
        }
        normalize_node(items, &format!("{}[]", path))?;
    }

    let mut hoisted = Vec::new();
    if let Some(Value::Object(props)) = obj.get_mut("properties") {
        for (name, child) in props.iter_mut() {
            if let Some(child_obj) = child.as_object_mut() {
                if let Some(Value::Bool(required)) = child_obj.get("required") {
                    if *required {
                        hoisted.push(name.clone());
                    }
                    child_obj.shift_remove("required");
                }
            }
            let child_path = if path.is_empty() {
                name.clone()
            } else {
                format!("{}.{}", path, name)
            };
            normalize_node(child, &child_path)?;
        }
    }
    if !hoisted.is_empty() {
        let required = obj
            .entry("required")
            .or_insert_with(|| Value::Array(Vec::new()));
        if !required.is_array() {
            *required = Value::Array(Vec::new());
        }
        if let Value::Array(list) = required {
            for name in hoisted {
                if !list.iter().any(|entry| entry.as_str() == Some(name.as_str())) {
                    list.push(Value::String(name));
                }
            }
        }
    }

    for section in ["definitions", "$defs"] {
        if let Some(Value::Object(defs)) = obj.get_mut(section) {
            for (name, def) in defs.iter_mut() {
                normalize_node(def, &format!("#/{}/{}", section, name))?;
            }
        }
    }

    Ok(())
}

fn display_path(path: &str) -> &str {
    if path.is_empty() {
        "(root)"
    } else {
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_boolean_required_is_hoisted() {
        let mut schema = json!({
            "properties": {
                "foo": {"type": "object", "properties": {
                    "bar": {"type": "string", "required": true},
                    "baz": {"type": "string", "required": false}
                }}
            }
        });
        normalize_schema(&mut schema).unwrap();
        assert_eq!(schema["properties"]["foo"]["required"], json!(["bar"]));
        assert!(schema["properties"]["foo"]["properties"]["bar"].get("required").is_none());
        assert!(schema["properties"]["foo"]["properties"]["baz"].get("required").is_none());
    }

    #[test]
    fn test_readonly_renamed() {
        let mut schema = json!({"properties": {"id": {"type": "string", "readonly": true}}});
        normalize_schema(&mut schema).unwrap();
        assert_eq!(schema["properties"]["id"]["readOnly"], json!(true));
        assert!(schema["properties"]["id"].get("readonly").is_none());
    }

    #[test]
    fn test_single_tuple_items_unwrapped() {
        let mut schema = json!({"properties": {"tags": {"type": "array", "items": [{"type": "string"}]}}});
        normalize_schema(&mut schema).unwrap();
        assert_eq!(schema["properties"]["tags"]["items"], json!({"type": "string"}));
    }

    #[test]
    fn test_multi_tuple_items_rejected() {
        let mut schema = json!({"properties": {"pair": {"type": "array", "items": [{"type": "string"}, {"type": "number"}]}}});
        let err = normalize_schema(&mut schema).unwrap_err();
        assert!(matches!(err, FormError::SchemaLayoutMismatch(msg) if msg.contains("pair")));
    }

    #[test]
    fn test_definitions_are_normalized() {
        let mut schema = json!({"definitions": {"person": {"properties": {"name": {"required": true}}}}});
        normalize_schema(&mut schema).unwrap();
        assert_eq!(schema["definitions"]["person"]["required"], json!(["name"]));
    }

    #[test]
    fn test_legacy_schema_wrapped() {
        let wrapped = wrap_legacy_schema(json!({"name": {"type": "string"}}));
        assert_eq!(wrapped, json!({"properties": {"name": {"type": "string"}}}));
        let untouched = wrap_legacy_schema(json!({"type": "object"}));
        assert_eq!(untouched, json!({"type": "object"}));
    }
}
