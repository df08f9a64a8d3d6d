//! Value extraction from flat inputs

use jsonform_wasm::{FlatInput, FormDescriptor, FormSession};
use serde_json::{json, Value};

fn session(descriptor: Value) -> FormSession {
    FormSession::initialize(FormDescriptor::from_value(descriptor).unwrap()).unwrap()
}

#[test]
fn test_empty_text_is_omitted() {
    let form = session(json!({
        "schema": {"properties": {"name": {"type": "string"}, "note": {"type": "string"}}}
    }));
    let values = form.get_values_from_inputs(&[FlatInput::text("name", ""), FlatInput::text("note", "hi")]);
    assert_eq!(values, json!({"note": "hi"}));
}

#[test]
fn test_checkbox_group_collects_checked_options() {
    let form = session(json!({
        "schema": {"properties": {"tags": {
            "type": "array",
            "items": {"type": "string", "enum": ["red", "green", "blue"]}
        }}},
        "form": [{"key": "tags", "type": "checkboxes"}]
    }));
    let values = form.get_values_from_inputs(&[
        FlatInput::text("tags[0]", "1"),
        FlatInput::flag("tags[1]", false),
        FlatInput::text("tags[2]", "1"),
    ]);
    assert_eq!(values, json!({"tags": ["red", "blue"]}));
}

#[test]
fn test_nested_values_are_coerced() {
    let form = session(json!({
        "schema": {"properties": {"friends": {
            "type": "array",
            "items": {"type": "object", "properties": {
                "name": {"type": "string"},
                "age": {"type": "integer"},
                "active": {"type": "boolean"}
            }}
        }}}
    }));
    let values = form.get_values_from_inputs(&[
        FlatInput::text("friends[0].name", "Ann"),
        FlatInput::text("friends[0].age", "31"),
        FlatInput::text("friends[0].active", "1"),
        FlatInput::text("friends[1].name", "Bob"),
        FlatInput::flag("friends[1].active", false),
    ]);
    assert_eq!(
        values,
        json!({"friends": [
            {"name": "Ann", "age": 31, "active": true},
            {"name": "Bob", "active": false}
        ]})
    );
}

#[test]
fn test_tree_values_match_extracted_inputs() {
    let form = session(json!({
        "schema": {"properties": {
            "title": {"type": "string"},
            "count": {"type": "number"}
        }},
        "value": {"title": "Report", "count": 2.5}
    }));
    let inputs = form.tree().collect_inputs(form.tree().root()).unwrap();
    assert_eq!(form.get_values_from_inputs(&inputs), form.get_values().unwrap());
    assert_eq!(form.get_values().unwrap(), json!({"title": "Report", "count": 2.5}));
}
