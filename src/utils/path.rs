//! Dotted/bracketed path algebra over JSON values
//!
//! Keys look like `friends[2].name` (a concrete value path) or
//! `friends[].name` (a generic path, brackets left empty). The same algebra
//! addresses previously submitted values, schema defaults and, once rewritten
//! with [`schema_path_for`], schema definitions.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use crate::errors::PathError;

static ARRAY_INDEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[(\d*)\]").expect("valid regex"));
static LAST_ARRAY_LEVEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[\][^\[\]]*$").expect("valid regex"));

/// One step of a parsed path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Object property
    Key(String),
    /// Array slot; `None` for the generic `[]`
    Index(Option<usize>),
}

/// Parse a dotted/bracketed path into segments
///
/// The empty string is the root path and parses to no segments.
pub fn parse_path(path: &str) -> Result<Vec<Segment>, PathError> {
    let mut segments = Vec::new();
    if path.is_empty() {
        return Ok(segments);
    }

    let malformed = |part: &str| PathError::Malformed {
        path: path.to_string(),
        segment: part.to_string(),
    };

    for part in path.split('.') {
        let (name, mut rest) = match part.find('[') {
            Some(pos) => (&part[..pos], &part[pos..]),
            None => (part, ""),
        };
        if name.contains(']') || (name.is_empty() && rest.is_empty()) {
            return Err(malformed(part));
        }
        if !name.is_empty() {
            segments.push(Segment::Key(name.to_string()));
        }
        while !rest.is_empty() {
            if !rest.starts_with('[') {
                return Err(malformed(part));
            }
            let close = rest.find(']').ok_or_else(|| malformed(part))?;
            let inner = &rest[1..close];
            if inner.is_empty() {
                segments.push(Segment::Index(None));
            } else if inner.bytes().all(|b| b.is_ascii_digit()) {
                let index = inner.parse::<usize>().map_err(|_| malformed(part))?;
                segments.push(Segment::Index(Some(index)));
            } else {
                return Err(malformed(part));
            }
            rest = &rest[close + 1..];
        }
    }

    Ok(segments)
}

/// Look a value up by path
///
/// Missing intermediates yield `None`. With `ignore_array_mismatch`, an array
/// met where the path expects an object (or a generic `[]`) is replaced by
/// its first element.
pub fn get_by_path<'a>(
    obj: &'a Value,
    path: &str,
    ignore_array_mismatch: bool,
) -> Result<Option<&'a Value>, PathError> {
    let segments = parse_path(path)?;
    Ok(get_segments(obj, &segments, ignore_array_mismatch))
}

/// [`get_by_path`] over already parsed segments
pub fn get_segments<'a>(
    obj: &'a Value,
    segments: &[Segment],
    ignore_array_mismatch: bool,
) -> Option<&'a Value> {
    let mut current = obj;
    for segment in segments {
        current = match segment {
            Segment::Key(name) => {
                if ignore_array_mismatch {
                    if let Value::Array(items) = current {
                        current = items.first()?;
                    }
                }
                current.as_object()?.get(name)?
            }
            Segment::Index(Some(index)) => current.as_array()?.get(*index)?,
            Segment::Index(None) => {
                if !ignore_array_mismatch {
                    return None;
                }
                current.as_array()?.first()?
            }
        };
    }
    Some(current)
}

/// Store a value by path, creating (or overwriting) intermediates as needed
pub fn set_by_path(obj: &mut Value, path: &str, value: Value) -> Result<(), PathError> {
    let segments = parse_path(path)?;
    set_segments(obj, &segments, value);
    Ok(())
}

/// [`set_by_path`] over already parsed segments
///
/// A generic `[]` appends a new slot.
pub fn set_segments(obj: &mut Value, segments: &[Segment], value: Value) {
    let mut current = obj;
    for segment in segments {
        current = match segment {
            Segment::Key(name) => object_slot(current, name),
            Segment::Index(index) => array_slot(current, *index),
        };
    }
    *current = value;
}

fn object_slot<'a>(current: &'a mut Value, name: &str) -> &'a mut Value {
    if !current.is_object() {
        *current = Value::Object(Map::new());
    }
    match current {
        Value::Object(map) => map.entry(name.to_string()).or_insert(Value::Null),
        _ => unreachable!("slot was just replaced by an object"),
    }
}

fn array_slot(current: &mut Value, index: Option<usize>) -> &mut Value {
    if !current.is_array() {
        *current = Value::Array(Vec::new());
    }
    match current {
        Value::Array(items) => {
            let index = index.unwrap_or(items.len());
            if items.len() <= index {
                items.resize(index + 1, Value::Null);
            }
            &mut items[index]
        }
        _ => unreachable!("slot was just replaced by an array"),
    }
}

/// Replace the k-th bracket group of `key` with `[array_path[k]]`
///
/// Works left to right. Bracket groups past the end of `array_path` are left
/// untouched, so `a[].b[].c` with `[2]` gives `a[2].b[].c`. Concrete indices
/// are replaced too, which is how values get remapped to another slot.
pub fn apply_array_path(key: &str, array_path: &[usize]) -> String {
    if array_path.is_empty() {
        return key.to_string();
    }

    let mut out = String::with_capacity(key.len() + 4 * array_path.len());
    let mut last = 0;
    let mut depth = 0;
    for found in ARRAY_INDEX.find_iter(key) {
        let next = key[found.end()..].chars().next();
        if !matches!(next, None | Some('[') | Some('.')) {
            continue;
        }
        out.push_str(&key[last..found.start()]);
        match array_path.get(depth) {
            Some(index) => {
                out.push('[');
                out.push_str(&index.to_string());
                out.push(']');
            }
            None => out.push_str(found.as_str()),
        }
        depth += 1;
        last = found.end();
    }
    out.push_str(&key[last..]);
    out
}

/// Rewrite a value-space path into a schema-space path
///
/// `a[0].b` becomes `a.items.properties.b`; the result is meant to be looked
/// up from the root schema's `properties`.
pub fn schema_path_for(value_path: &str) -> String {
    let dotted = value_path.replace('.', ".properties.");
    let rewritten = ARRAY_INDEX.replace_all(&dotted, ".items");
    rewritten.trim_start_matches('.').to_string()
}

/// Drop concrete indices: `a[2].b[0]` becomes `a[].b[]`
pub fn generic_key(key: &str) -> String {
    ARRAY_INDEX.replace_all(key, "[]").into_owned()
}

/// Cut a generic key right before its `(depth + 1)`-th `[]`
///
/// `foo[].bar[].baz` at depth 1 gives `foo[].bar`. Keys with fewer array
/// levels are returned unchanged.
pub fn truncate_to_array_depth(key: &str, depth: usize) -> String {
    let mut pos = 0;
    for _ in 0..depth {
        match key[pos..].find("[]") {
            Some(found) => pos += found + 2,
            None => return key.to_string(),
        }
    }
    match key[pos..].find("[]") {
        Some(found) => key[..pos + found].to_string(),
        None => key.to_string(),
    }
}

/// Strip the innermost array level and everything after it: `foo[].bar` gives `foo`
pub fn strip_last_array_level(key: &str) -> String {
    LAST_ARRAY_LEVEL.replace(key, "").into_owned()
}

/// `true` when a value is present and not JSON `null`
pub fn is_set(value: Option<&Value>) -> bool {
    matches!(value, Some(v) if !v.is_null())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_path_segments() {
        let segments = parse_path("a.b[2][].c").unwrap();
        assert_eq!(
            segments,
            vec![
                Segment::Key("a".into()),
                Segment::Key("b".into()),
                Segment::Index(Some(2)),
                Segment::Index(None),
                Segment::Key("c".into()),
            ]
        );
    }

    #[test]
    fn test_parse_path_rejects_malformed() {
        assert!(parse_path("a..b").is_err());
        assert!(parse_path("a[x]").is_err());
        assert!(parse_path("a]b").is_err());
        assert!(parse_path("a[1").is_err());
    }

    #[test]
    fn test_set_then_get_round_trip() {
        let mut obj = json!({});
        set_by_path(&mut obj, "a.b.c", json!(42)).unwrap();
        assert_eq!(get_by_path(&obj, "a.b.c", false).unwrap(), Some(&json!(42)));
    }

    #[test]
    fn test_get_missing_intermediate_is_none() {
        let obj = json!({"a": {"b": 1}});
        assert_eq!(get_by_path(&obj, "a.x.y", false).unwrap(), None);
        assert_eq!(get_by_path(&obj, "a.b.c", false).unwrap(), None);
    }

    #[test]
    fn test_get_ignores_array_mismatch() {
        let schema = json!({"items": [{"type": "string"}]});
        assert_eq!(get_by_path(&schema, "items.type", false).unwrap(), None);
        assert_eq!(
            get_by_path(&schema, "items.type", true).unwrap(),
            Some(&json!("string"))
        );
    }

    #[test]
    fn test_set_creates_arrays_and_overwrites_scalars() {
        let mut obj = json!({"a": "scalar"});
        set_by_path(&mut obj, "a[1].name", json!("x")).unwrap();
        assert_eq!(obj, json!({"a": [null, {"name": "x"}]}));
    }

    #[test]
    fn test_apply_array_path_left_to_right() {
        assert_eq!(apply_array_path("a[].b[].c", &[2, 5]), "a[2].b[5].c");
        assert_eq!(apply_array_path("a[].b[].c", &[2]), "a[2].b[].c");
        assert_eq!(apply_array_path("a[0].b[1]", &[3]), "a[3].b[1]");
        assert_eq!(apply_array_path("a.b", &[1]), "a.b");
    }

    #[test]
    fn test_schema_path_for() {
        assert_eq!(schema_path_for("a[0].b"), "a.items.properties.b");
        assert_eq!(schema_path_for("tags[]"), "tags.items");
        assert_eq!(schema_path_for("name"), "name");
    }

    #[test]
    fn test_truncate_and_strip() {
        assert_eq!(truncate_to_array_depth("foo[].bar[].baz", 0), "foo");
        assert_eq!(truncate_to_array_depth("foo[].bar[].baz", 1), "foo[].bar");
        assert_eq!(truncate_to_array_depth("foo.bar", 0), "foo.bar");
        assert_eq!(strip_last_array_level("foo[].bar"), "foo");
        assert_eq!(strip_last_array_level("a[].b[].c"), "a[].b");
        assert_eq!(generic_key("a[2].b[10]"), "a[].b[]");
    }
}
