//! Initial value resolution
//!
//! Precedence, highest first: previously submitted value, explicit layout
//! `value` (an explicit `null` stops the lookup), schema `default`. String
//! results go through the value templating engine, where
//! `{{values.other.key}}` resolves another field through this same resolver.

use std::collections::HashMap;
use std::rc::Rc;

use serde_json::{Map, Value};

use crate::errors::{FormError, PathError};
use crate::models::LayoutElement;
use crate::schema::schema_node_for_key;
use crate::template::{expand, TemplateContext};
use crate::utils::path::{apply_array_path, generic_key, get_by_path, get_segments, parse_path, Segment};

/// `getValue` chains deeper than this resolve to nothing
const MAX_LOOKUP_DEPTH: usize = 8;

/// Resolves initial values for schema keys
pub struct ValueResolver<'a> {
    schema: &'a Value,
    layouts: &'a HashMap<String, Rc<LayoutElement>>,
    tpldata: &'a Map<String, Value>,
    previous: Option<&'a Value>,
}

impl<'a> ValueResolver<'a> {
    pub fn new(
        schema: &'a Value,
        layouts: &'a HashMap<String, Rc<LayoutElement>>,
        tpldata: &'a Map<String, Value>,
    ) -> Self {
        Self {
            schema,
            layouts,
            tpldata,
            previous: None,
        }
    }

    /// Consult a previous submission first
    pub fn with_previous(mut self, previous: Option<&'a Value>) -> Self {
        self.previous = previous;
        self
    }

    /// Initial value for `key` at `array_path`; `None` when nothing is set
    pub fn resolve_initial_value(
        &self,
        key: &str,
        array_path: &[usize],
        idx: usize,
        use_previous: bool,
    ) -> Result<Option<Value>, FormError> {
        self.resolve_at_depth(key, array_path, idx, use_previous, 0)
    }

    fn resolve_at_depth(
        &self,
        key: &str,
        array_path: &[usize],
        idx: usize,
        use_previous: bool,
        depth: usize,
    ) -> Result<Option<Value>, FormError> {
        let concrete = apply_array_path(key, array_path);

        if use_previous {
            if let Some(previous) = self.previous {
                if let Some(found) = get_by_path(previous, &concrete, false)? {
                    if !found.is_null() {
                        return Ok(Some(found.clone()));
                    }
                }
            }
        }

        let generic = generic_key(key);
        let layout = self.layouts.get(&generic);
        let schema_node = schema_node_for_key(self.schema, &generic)?;

        let raw = match layout.and_then(|element| element.value.as_ref()) {
            Some(explicit) => explicit.clone(),
            None => schema_node
                .and_then(|node| node.get("default"))
                .cloned()
                .unwrap_or(Value::Null),
        };
        if raw.is_null() {
            return Ok(None);
        }

        let mut value = self.stamp(raw, idx, array_path, depth)?;

        if let Some(title) = layout
            .and_then(|element| element.title_map.as_ref())
            .and_then(|title_map| title_map.title_for(&value))
        {
            value = Value::String(self.expand_at_depth(&title, idx, Value::Null, array_path, depth)?);
        }

        let value = truncate_to_max_length(value, schema_node);
        Ok(if value.is_null() { None } else { Some(value) })
    }

    /// Template-expand a string value; other values pass through
    pub fn stamp(&self, value: Value, idx: usize, array_path: &[usize], depth: usize) -> Result<Value, FormError> {
        match value {
            Value::String(template) => Ok(Value::String(self.expand_at_depth(
                &template,
                idx,
                Value::Null,
                array_path,
                depth,
            )?)),
            other => Ok(other),
        }
    }

    /// Expand a label or value template with `{idx, value, getValue}`
    pub fn expand_label(
        &self,
        template: &str,
        idx: usize,
        value: Value,
        array_path: &[usize],
    ) -> Result<String, FormError> {
        self.expand_at_depth(template, idx, value, array_path, 0)
    }

    fn expand_at_depth(
        &self,
        template: &str,
        idx: usize,
        value: Value,
        array_path: &[usize],
        depth: usize,
    ) -> Result<String, FormError> {
        let get_value = |key: &str| -> Result<Option<Value>, FormError> {
            if depth >= MAX_LOOKUP_DEPTH {
                log::warn!("getValue(\"{}\") nested too deeply, resolved to nothing", key);
                return Ok(None);
            }
            self.resolve_at_depth(key, array_path, idx, true, depth + 1)
        };
        let value = if value.is_null() { Value::String(String::new()) } else { value };
        let ctx = TemplateContext::new(idx, self.tpldata)
            .with_value(value)
            .with_get_value(&get_value);
        expand(template, &ctx)
    }
}

/// Shorten strings longer than the schema's `maxLength` to `maxLength - 1` chars plus `…`
///
/// A `maxLength` of 0 leaves an empty string.
pub fn truncate_to_max_length(value: Value, schema: Option<&Value>) -> Value {
    let max = match schema.and_then(|node| node.get("maxLength")).and_then(Value::as_u64) {
        Some(max) => max as usize,
        None => return value,
    };
    match value {
        Value::String(_) if max == 0 => Value::String(String::new()),
        Value::String(text) if text.chars().count() > max => {
            let mut truncated: String = text.chars().take(max.saturating_sub(1)).collect();
            truncated.push('…');
            Value::String(truncated)
        }
        other => other,
    }
}

/// Schema default for a concrete key, ignoring defaults above the array levels skipped
///
/// Walks the schema alongside the key. The first `default` met once no
/// array levels are left to skip answers the lookup, read at the remaining
/// part of the key.
pub fn resolve_array_scoped_default(
    schema: &Value,
    key: &str,
    top_array_levels_to_skip: usize,
) -> Result<Option<Value>, PathError> {
    let segments = parse_path(key)?;
    let mut node = schema;
    let mut skip = top_array_levels_to_skip;

    for pos in 0..=segments.len() {
        if skip == 0 {
            if let Some(default) = node.get("default") {
                return Ok(get_segments(default, &segments[pos..], false)
                    .filter(|found| !found.is_null())
                    .cloned());
            }
        }
        let segment = match segments.get(pos) {
            Some(segment) => segment,
            None => break,
        };
        node = match segment {
            Segment::Key(name) => match node.get("properties").and_then(|props| props.get(name)) {
                Some(next) => next,
                None => return Ok(None),
            },
            Segment::Index(_) => {
                skip = skip.saturating_sub(1);
                match node.get("items") {
                    Some(next) => next,
                    None => return Ok(None),
                }
            }
        };
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn layouts(entries: Vec<LayoutElement>) -> HashMap<String, Rc<LayoutElement>> {
        entries
            .into_iter()
            .map(|element| (element.key.clone().unwrap_or_default(), Rc::new(element)))
            .collect()
    }

    #[test]
    fn test_precedence_previous_layout_default() {
        let schema = json!({"properties": {"color": {"type": "string", "default": "D"}}});
        let mut element = LayoutElement::for_key("color");
        element.value = Some(json!("L"));
        let layouts = layouts(vec![element]);
        let tpldata = Map::new();
        let previous = json!({"color": "S"});

        let resolver = ValueResolver::new(&schema, &layouts, &tpldata).with_previous(Some(&previous));
        assert_eq!(resolver.resolve_initial_value("color", &[], 1, true).unwrap(), Some(json!("S")));
        assert_eq!(resolver.resolve_initial_value("color", &[], 1, false).unwrap(), Some(json!("L")));

        let empty = HashMap::new();
        let resolver = ValueResolver::new(&schema, &empty, &tpldata);
        assert_eq!(resolver.resolve_initial_value("color", &[], 1, true).unwrap(), Some(json!("D")));
    }

    #[test]
    fn test_explicit_empty_previous_wins() {
        let schema = json!({"properties": {"color": {"type": "string", "default": "D"}}});
        let empty = HashMap::new();
        let tpldata = Map::new();
        let previous = json!({"color": ""});
        let resolver = ValueResolver::new(&schema, &empty, &tpldata).with_previous(Some(&previous));
        assert_eq!(resolver.resolve_initial_value("color", &[], 1, true).unwrap(), Some(json!("")));
    }

    #[test]
    fn test_layout_null_suppresses_default() {
        let schema = json!({"properties": {"color": {"type": "string", "default": "D"}}});
        let mut element = LayoutElement::for_key("color");
        element.value = Some(Value::Null);
        let layouts = layouts(vec![element]);
        let tpldata = Map::new();
        let resolver = ValueResolver::new(&schema, &layouts, &tpldata);
        assert_eq!(resolver.resolve_initial_value("color", &[], 1, false).unwrap(), None);
    }

    #[test]
    fn test_truncation_to_max_length() {
        let schema = json!({"properties": {"code": {"type": "string", "maxLength": 5, "default": "abcdefgh"}}});
        let empty = HashMap::new();
        let tpldata = Map::new();
        let resolver = ValueResolver::new(&schema, &empty, &tpldata);
        assert_eq!(resolver.resolve_initial_value("code", &[], 1, false).unwrap(), Some(json!("abcd…")));
    }

    #[test]
    fn test_zero_max_length_empties_string() {
        let schema = json!({"maxLength": 0});
        assert_eq!(truncate_to_max_length(json!("abc"), Some(&schema)), json!(""));
        assert_eq!(truncate_to_max_length(json!(""), Some(&schema)), json!(""));
        assert_eq!(truncate_to_max_length(json!(7), Some(&schema)), json!(7));
    }

    #[test]
    fn test_values_marker_and_idx() {
        let schema = json!({"properties": {
            "first": {"type": "string", "default": "Ada"},
            "greeting": {"type": "string", "default": "Hi {{values.first}} #{{idx}}"}
        }});
        let empty = HashMap::new();
        let tpldata = Map::new();
        let resolver = ValueResolver::new(&schema, &empty, &tpldata);
        assert_eq!(
            resolver.resolve_initial_value("greeting", &[], 3, false).unwrap(),
            Some(json!("Hi Ada #3"))
        );
    }

    #[test]
    fn test_self_reference_is_bounded() {
        let schema = json!({"properties": {"loop": {"type": "string", "default": "x{{values.loop}}"}}});
        let empty = HashMap::new();
        let tpldata = Map::new();
        let resolver = ValueResolver::new(&schema, &empty, &tpldata);
        let value = resolver.resolve_initial_value("loop", &[], 1, false).unwrap().unwrap();
        assert!(value.as_str().unwrap().starts_with("xxx"));
    }

    #[test]
    fn test_array_scoped_default_skips_outer_levels() {
        let schema = json!({"properties": {"friends": {
            "type": "array",
            "default": [{"name": "Ann"}, {"name": "Bob"}],
            "items": {"type": "object", "properties": {"name": {"type": "string", "default": "New"}}}
        }}});
        assert_eq!(
            resolve_array_scoped_default(&schema, "friends[1].name", 0).unwrap(),
            Some(json!("Bob"))
        );
        assert_eq!(
            resolve_array_scoped_default(&schema, "friends[1].name", 1).unwrap(),
            Some(json!("New"))
        );
        assert_eq!(resolve_array_scoped_default(&schema, "friends[5].name", 0).unwrap(), None);
    }
}
