//! Local `$ref` resolution
//!
//! Pointers into `#/definitions/*` and `#/$defs/*` are replaced by a copy of
//! their target. Each definition is expanded once; a reference met while its
//! own definition is still being expanded is left in place.

use std::collections::{HashMap, HashSet};

use serde_json::Value;

/// Resolve every local `$ref` in place
pub fn resolve_refs(schema: &mut Value) {
    let root = schema.clone();
    let mut resolver = RefResolver {
        root: &root,
        resolved: HashMap::new(),
        in_progress: HashSet::new(),
    };
    resolver.resolve_in_place(schema);
}

struct RefResolver<'a> {
    root: &'a Value,
    resolved: HashMap<String, Value>,
    in_progress: HashSet<String>,
}

impl<'a> RefResolver<'a> {
    fn resolve_in_place(&mut self, node: &mut Value) {
        match node {
            Value::Object(map) => {
                for (key, child) in map.iter_mut() {
                    if key != "$ref" {
                        self.resolve_in_place(child);
                    }
                }
                let reference = match map.get("$ref") {
                    Some(Value::String(reference)) => reference.clone(),
                    _ => return,
                };
                match self.definition(&reference) {
                    Some(Value::Object(mut target)) => {
                        for (key, value) in map.iter() {
                            if key != "$ref" {
                                target.insert(key.clone(), value.clone());
                            }
                        }
                        *node = Value::Object(target);
                    }
                    Some(other) => *node = other,
                    None => log::warn!("$ref '{}' could not be resolved locally, left in place", reference),
                }
            }
            Value::Array(list) => {
                for item in list.iter_mut() {
                    self.resolve_in_place(item);
                }
            }
            _ => {}
        }
    }

    fn definition(&mut self, reference: &str) -> Option<Value> {
        let (section, name) = ["definitions", "$defs"].iter().find_map(|section| {
            reference
                .strip_prefix("#/")
                .and_then(|rest| rest.strip_prefix(section))
                .and_then(|rest| rest.strip_prefix('/'))
                .map(|name| (*section, unescape_pointer(name)))
        })?;

        if let Some(done) = self.resolved.get(reference) {
            return Some(done.clone());
        }
        if self.in_progress.contains(reference) {
            return None;
        }

        let mut target = self.root.get(section)?.get(name.as_str())?.clone();
        self.in_progress.insert(reference.to_string());
        self.resolve_in_place(&mut target);
        self.in_progress.remove(reference);
        self.resolved.insert(reference.to_string(), target.clone());
        Some(target)
    }
}

fn unescape_pointer(token: &str) -> String {
    token.replace("~1", "/").replace("~0", "~")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_definitions_substituted() {
        let mut schema = json!({
            "definitions": {"name": {"type": "string", "maxLength": 10}},
            "properties": {"first": {"$ref": "#/definitions/name", "title": "First"}}
        });
        resolve_refs(&mut schema);
        assert_eq!(
            schema["properties"]["first"],
            json!({"type": "string", "maxLength": 10, "title": "First"})
        );
    }

    #[test]
    fn test_defs_and_nested_refs() {
        let mut schema = json!({
            "$defs": {
                "leaf": {"type": "integer"},
                "pair": {"type": "object", "properties": {"a": {"$ref": "#/$defs/leaf"}}}
            },
            "properties": {"p": {"$ref": "#/$defs/pair"}}
        });
        resolve_refs(&mut schema);
        assert_eq!(schema["properties"]["p"]["properties"]["a"], json!({"type": "integer"}));
    }

    #[test]
    fn test_cycles_and_unknown_refs_left_in_place() {
        let mut schema = json!({
            "definitions": {"node": {"type": "object", "properties": {"next": {"$ref": "#/definitions/node"}}}},
            "properties": {
                "head": {"$ref": "#/definitions/node"},
                "remote": {"$ref": "http://example.com/schema"}
            }
        });
        resolve_refs(&mut schema);
        let head = &schema["properties"]["head"];
        assert_eq!(head["type"], json!("object"));
        assert_eq!(head["properties"]["next"]["$ref"], json!("#/definitions/node"));
        assert_eq!(schema["properties"]["remote"]["$ref"], json!("http://example.com/schema"));
    }
}
