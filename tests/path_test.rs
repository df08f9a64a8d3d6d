//! Path algebra through the public API

use jsonform_wasm::utils::path::{apply_array_path, generic_key, get_by_path, schema_path_for, set_by_path};
use jsonform_wasm::PathError;
use serde_json::json;

#[test]
fn test_set_then_get_round_trip() {
    let mut obj = json!({"keep": true});
    for (path, value) in [
        ("a", json!(1)),
        ("b.c", json!("x")),
        ("b.d.e", json!([1, 2])),
        ("keep", json!(false)),
    ] {
        set_by_path(&mut obj, path, value.clone()).unwrap();
        assert_eq!(get_by_path(&obj, path, false).unwrap(), Some(&value));
    }
    assert_eq!(obj["b"]["c"], json!("x"));
}

#[test]
fn test_array_path_applied_left_to_right() {
    assert_eq!(apply_array_path("a[].b[].c", &[2, 5]), "a[2].b[5].c");
    assert_eq!(apply_array_path("a[].b[].c", &[2]), "a[2].b[].c");
    assert_eq!(apply_array_path("a[1].b", &[4]), "a[4].b");
    assert_eq!(apply_array_path("plain", &[3]), "plain");
}

#[test]
fn test_schema_path_and_generic_key() {
    assert_eq!(schema_path_for("friends[0].name"), "friends.items.properties.name");
    assert_eq!(generic_key("friends[3].tags[1]"), "friends[].tags[]");
}

#[test]
fn test_malformed_path_is_an_error() {
    let err = get_by_path(&json!({}), "a[x]", false).unwrap_err();
    assert!(matches!(err, PathError::Malformed { .. }));
}
