//! Value extraction
//!
//! Rebuilds a schema-shaped value object from the flat `(name, raw value)`
//! pairs produced by rendered controls. Bad user input never fails
//! extraction: it degrades to an empty structured value or is skipped.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::schema::{schema_node_for_key, schema_type};
use crate::utils::path::{apply_array_path, generic_key, parse_path, set_by_path, Segment};

/// Highest array index an input name may address
pub const MAX_ARRAY_INDEX: usize = 9_999;

/// How a checkbox group maps onto an array value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckboxMode {
    /// `name[i]` checked pushes the i-th `items.enum` entry
    Selected,
    /// `name[i]` checked pushes the control's own value
    Value,
}

/// Extraction flags for one generic key
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldHint {
    pub checkboxes: Option<CheckboxMode>,
    /// Keep empty strings instead of dropping them
    pub allow_empty: bool,
    /// Multi-value tag input; its list is taken as is
    pub tags: bool,
}

/// Side table of extraction flags, keyed by generic key
///
/// Filled by the tree builder so the schema itself stays untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractionHints {
    fields: HashMap<String, FieldHint>,
}

impl ExtractionHints {
    pub fn get(&self, key: &str) -> Option<&FieldHint> {
        self.fields.get(key)
    }

    pub fn entry(&mut self, key: &str) -> &mut FieldHint {
        self.fields.entry(key.to_string()).or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Raw value of one rendered control
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawInput {
    /// Unchecked checkboxes and radios are `false`, never omitted
    Flag(bool),
    Text(String),
    /// Materialized list of a multi-value control
    List(Vec<Value>),
}

impl RawInput {
    fn is_checked(&self) -> bool {
        match self {
            RawInput::Flag(checked) => *checked,
            RawInput::Text(text) => !text.is_empty() && text != "0" && text != "false",
            RawInput::List(items) => !items.is_empty(),
        }
    }
}

/// One `(name, raw value)` pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatInput {
    pub name: String,
    pub value: RawInput,
}

impl FlatInput {
    pub fn text<N: Into<String>, V: Into<String>>(name: N, value: V) -> Self {
        Self {
            name: name.into(),
            value: RawInput::Text(value.into()),
        }
    }

    pub fn flag<N: Into<String>>(name: N, checked: bool) -> Self {
        Self {
            name: name.into(),
            value: RawInput::Flag(checked),
        }
    }

    pub fn list<N: Into<String>>(name: N, items: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            value: RawInput::List(items),
        }
    }
}

/// Rebuild the value object from flat inputs
///
/// With `update_array_path`, every name has its array indices replaced
/// before extraction; that is how values move between array slots.
pub fn extract_values(
    inputs: &[FlatInput],
    schema: &Value,
    hints: &ExtractionHints,
    update_array_path: Option<&[usize]>,
) -> Value {
    let mut result = Value::Object(Map::new());
    let mut lists: Vec<(String, Vec<Value>)> = Vec::new();

    for input in inputs {
        let name = match update_array_path {
            Some(path) => apply_array_path(&input.name, path),
            None => input.name.clone(),
        };

        if let Some(index) = index_past_limit(&name) {
            log::warn!("Skipping input '{}': index {} exceeds {}", name, index, MAX_ARRAY_INDEX);
            continue;
        }

        if let Some(base) = name.strip_suffix("[]") {
            let is_array = lookup(schema, base).and_then(schema_type) == Some("array");
            if is_array {
                let raw = match &input.value {
                    RawInput::Text(text) if !text.is_empty() => Value::String(text.clone()),
                    _ => continue,
                };
                let list = list_for(&mut lists, base);
                if !list.contains(&raw) {
                    list.push(raw);
                }
                continue;
            }
        }

        if let Some((base, index)) = split_trailing_index(&name) {
            let mode = hints.get(&generic_key(base)).and_then(|hint| hint.checkboxes);
            if let Some(mode) = mode {
                let picked = match mode {
                    CheckboxMode::Selected if input.value.is_checked() => lookup(schema, base)
                        .and_then(|node| node.get("items"))
                        .and_then(|items| items.get("enum"))
                        .and_then(|choices| choices.get(index))
                        .cloned(),
                    CheckboxMode::Value => match &input.value {
                        RawInput::Text(text) => Some(Value::String(text.clone())),
                        _ => None,
                    },
                    _ => None,
                };
                let list = list_for(&mut lists, base);
                if let Some(value) = picked {
                    list.push(value);
                }
                continue;
            }
        }

        let node = match schema_node_for_key(schema, &name) {
            Ok(Some(node)) => node,
            Ok(None) => {
                log::debug!("No schema definition for input '{}', skipped", name);
                continue;
            }
            Err(err) => {
                log::warn!("Skipping input with malformed name '{}': {}", name, err);
                continue;
            }
        };
        let hint = hints.get(&generic_key(&name));

        let value = if hint.map(|h| h.tags).unwrap_or(false) {
            tags_value(&input.value)
        } else {
            coerce(&input.value, node, hint.map(|h| h.allow_empty).unwrap_or(false))
        };

        if let Some(value) = value.filter(|v| !v.is_null()) {
            if let Err(err) = set_by_path(&mut result, &name, value) {
                log::warn!("Could not store value for '{}': {}", name, err);
            }
        }
    }

    for (base, list) in lists {
        if let Err(err) = set_by_path(&mut result, &base, Value::Array(list)) {
            log::warn!("Could not store list for '{}': {}", base, err);
        }
    }

    fill_object_items(&mut result, schema);
    result
}

/// Array slots whose item schema is an object come back as `{}`, not `null`
fn fill_object_items(value: &mut Value, schema: &Value) {
    match value {
        Value::Object(map) => {
            let properties = match schema.get("properties").and_then(Value::as_object) {
                Some(properties) => properties,
                None => return,
            };
            for (name, child) in map.iter_mut() {
                if let Some(child_schema) = properties.get(name) {
                    fill_object_items(child, child_schema);
                }
            }
        }
        Value::Array(items) => {
            for (pos, item) in items.iter_mut().enumerate() {
                let item_schema = match schema.get("items") {
                    Some(Value::Array(tuple)) => tuple.get(pos),
                    Some(single) => Some(single),
                    None => None,
                };
                let item_schema = match item_schema {
                    Some(item_schema) => item_schema,
                    None => continue,
                };
                if item.is_null() && is_object_schema(item_schema) {
                    *item = Value::Object(Map::new());
                }
                fill_object_items(item, item_schema);
            }
        }
        _ => {}
    }
}

fn is_object_schema(schema: &Value) -> bool {
    schema_type(schema) == Some("object") || schema.get("properties").is_some()
}

/// First concrete index in `name` above [`MAX_ARRAY_INDEX`]
fn index_past_limit(name: &str) -> Option<usize> {
    parse_path(name).ok()?.into_iter().find_map(|segment| match segment {
        Segment::Index(Some(index)) if index > MAX_ARRAY_INDEX => Some(index),
        _ => None,
    })
}

fn lookup<'a>(schema: &'a Value, key: &str) -> Option<&'a Value> {
    schema_node_for_key(schema, key).ok().flatten()
}

fn list_for<'a>(lists: &'a mut Vec<(String, Vec<Value>)>, base: &str) -> &'a mut Vec<Value> {
    let pos = match lists.iter().position(|(name, _)| name == base) {
        Some(pos) => pos,
        None => {
            lists.push((base.to_string(), Vec::new()));
            lists.len() - 1
        }
    };
    &mut lists[pos].1
}

/// `tags[3]` gives `("tags", 3)`
fn split_trailing_index(name: &str) -> Option<(&str, usize)> {
    let inner = name.strip_suffix(']')?;
    let open = inner.rfind('[')?;
    let index = inner[open + 1..].parse::<usize>().ok()?;
    Some((&name[..open], index))
}

fn tags_value(raw: &RawInput) -> Option<Value> {
    match raw {
        RawInput::List(items) => Some(Value::Array(items.clone())),
        RawInput::Text(text) => Some(Value::Array(
            text.split(',')
                .map(str::trim)
                .filter(|tag| !tag.is_empty())
                .map(|tag| Value::String(tag.to_string()))
                .collect(),
        )),
        RawInput::Flag(_) => None,
    }
}

/// Coerce a raw control value according to the schema node's type
pub fn coerce(raw: &RawInput, schema: &Value, allow_empty: bool) -> Option<Value> {
    let ty = schema_type(schema).unwrap_or("string");
    match (ty, raw) {
        ("boolean", RawInput::Flag(checked)) => Some(Value::Bool(*checked)),
        ("boolean", RawInput::Text(text)) => match text.as_str() {
            "" => None,
            "0" | "false" => Some(Value::Bool(false)),
            _ => Some(Value::Bool(true)),
        },
        ("number", RawInput::Text(text)) | ("integer", RawInput::Text(text)) => {
            parse_number(text, ty == "integer")
        }
        ("string", RawInput::Text(text)) => {
            if text.is_empty() && !allow_empty {
                None
            } else {
                Some(Value::String(text.clone()))
            }
        }
        ("object", RawInput::Text(text)) => {
            let trimmed = text.trim();
            if trimmed.is_empty() || trimmed == "null" || !trimmed.starts_with('{') {
                return None;
            }
            match serde_json::from_str::<Value>(trimmed) {
                Ok(parsed @ Value::Object(_)) => Some(parsed),
                _ => {
                    log::warn!("Invalid JSON object in free-text field, using {{}}");
                    Some(Value::Object(Map::new()))
                }
            }
        }
        ("array", RawInput::Text(text)) => {
            let trimmed = text.trim();
            if !trimmed.starts_with('[') {
                return None;
            }
            match serde_json::from_str::<Value>(trimmed) {
                Ok(parsed @ Value::Array(_)) => Some(parsed),
                _ => {
                    log::warn!("Invalid JSON array in free-text field, using []");
                    Some(Value::Array(Vec::new()))
                }
            }
        }
        ("array", RawInput::List(items)) => Some(Value::Array(items.clone())),
        ("boolean", RawInput::List(_))
        | ("number", _)
        | ("integer", _)
        | ("string", _)
        | ("object", _)
        | ("array", _) => None,
        (_, RawInput::Text(text)) if text.is_empty() => None,
        (_, RawInput::Text(text)) => Some(Value::String(text.clone())),
        (_, RawInput::Flag(checked)) => Some(Value::Bool(*checked)),
        (_, RawInput::List(items)) => Some(Value::Array(items.clone())),
    }
}

fn parse_number(text: &str, integer: bool) -> Option<Value> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(int) = trimmed.parse::<i64>() {
        return Some(Value::from(int));
    }
    if let Ok(float) = trimmed.parse::<f64>() {
        if integer && float.is_finite() {
            return Some(Value::from(float.trunc() as i64));
        }
        if let Some(number) = Number::from_f64(float) {
            return Some(Value::Number(number));
        }
    }
    Some(Value::String(text.to_string()))
}
