//! Layout elements
//!
//! A layout element describes how and where a control is rendered. It either
//! binds to a schema path through `key` or is a pure container. Layout
//! elements are read-only once the tree is built: many nodes (every clone of
//! an array item template) share one element.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::serde_helpers::{deserialize_present, serialize_option_as_null};

/// Declarative description of one control or container
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LayoutElement {
    /// Generic (bracket-empty) path into the value object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    /// Widget kind; inferred from the schema when omitted
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub widget: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legend: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prepend: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub append: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub helpvalue: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inlinetitle: Option<String>,

    /// Explicit value; `Some(Value::Null)` suppresses the schema default
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        serialize_with = "serialize_option_as_null",
        skip_serializing_if = "Option::is_none"
    )]
    pub value: Option<Value>,

    /// Nested layout (container children, or the array item layout)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<LayoutItem>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<OptionItem>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_map: Option<TitleMap>,

    /// Use this field's value in the legend of the enclosing array item
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub value_in_legend: bool,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub notitle: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_only: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,

    /// Keep empty strings in extracted values
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub allow_empty: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_class: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_html_class: Option<String>,

    /// Widget-specific configuration passed through to templates untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl LayoutElement {
    /// Layout element bound to a key, everything else inferred
    pub fn for_key<S: Into<String>>(key: S) -> Self {
        Self {
            key: Some(key.into()),
            ..Self::default()
        }
    }

    /// Keyless container of the given widget kind
    pub fn container<S: Into<String>>(widget: S, items: Vec<LayoutItem>) -> Self {
        Self {
            widget: Some(widget.into()),
            items: Some(items),
            ..Self::default()
        }
    }

    /// Read a string label property by name
    pub fn label(&self, prop: LabelProp) -> Option<&str> {
        match prop {
            LabelProp::Title => self.title.as_deref(),
            LabelProp::Legend => self.legend.as_deref(),
            LabelProp::Description => self.description.as_deref(),
            LabelProp::Prepend => self.prepend.as_deref(),
            LabelProp::Append => self.append.as_deref(),
            LabelProp::Placeholder => self.placeholder.as_deref(),
            LabelProp::Helpvalue => self.helpvalue.as_deref(),
            LabelProp::Inlinetitle => self.inlinetitle.as_deref(),
        }
    }
}

/// Templated string properties of a layout element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LabelProp {
    Title,
    Legend,
    Description,
    Prepend,
    Append,
    Placeholder,
    Helpvalue,
    Inlinetitle,
}

impl LabelProp {
    pub const ALL: [LabelProp; 8] = [
        LabelProp::Title,
        LabelProp::Legend,
        LabelProp::Description,
        LabelProp::Prepend,
        LabelProp::Append,
        LabelProp::Placeholder,
        LabelProp::Helpvalue,
        LabelProp::Inlinetitle,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LabelProp::Title => "title",
            LabelProp::Legend => "legend",
            LabelProp::Description => "description",
            LabelProp::Prepend => "prepend",
            LabelProp::Append => "append",
            LabelProp::Placeholder => "placeholder",
            LabelProp::Helpvalue => "helpvalue",
            LabelProp::Inlinetitle => "inlinetitle",
        }
    }
}

/// Entry of a `form` list: `"foo.bar"` shorthand, `"*"`, or a full element
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum LayoutItem {
    Key(String),
    Element(Box<LayoutElement>),
}

impl LayoutItem {
    /// Wildcard that expands to one element per schema property
    pub const WILDCARD: &'static str = "*";

    pub fn is_wildcard(&self) -> bool {
        matches!(self, LayoutItem::Key(key) if key == Self::WILDCARD)
    }

    /// Expand the string shorthand into a full element
    pub fn into_element(self) -> LayoutElement {
        match self {
            LayoutItem::Key(key) => LayoutElement::for_key(key),
            LayoutItem::Element(element) => *element,
        }
    }

    /// Key of the element this item describes, if any
    pub fn key(&self) -> Option<&str> {
        match self {
            LayoutItem::Key(key) => Some(key),
            LayoutItem::Element(element) => element.key.as_deref(),
        }
    }
}

impl From<LayoutElement> for LayoutItem {
    fn from(element: LayoutElement) -> Self {
        LayoutItem::Element(Box::new(element))
    }
}

/// Option as written in a layout: `{value, title}` or a bare value
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum OptionItem {
    Pair {
        #[serde(default)]
        value: Value,
        title: String,
    },
    Bare(Value),
}

impl OptionItem {
    /// Materialize into a value/title pair
    pub fn to_field_option(&self) -> FieldOption {
        match self {
            OptionItem::Pair { value, title } => FieldOption {
                value: if value.is_null() { Value::String(String::new()) } else { value.clone() },
                title: title.clone(),
            },
            OptionItem::Bare(value) => FieldOption {
                value: value.clone(),
                title: value_to_key(value),
            },
        }
    }
}

/// Materialized enumeration choice
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct FieldOption {
    pub value: Value,
    pub title: String,
}

/// Value-to-title mapping for enumerations
///
/// The map form keeps enum order; the list form imposes its own order.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum TitleMap {
    Map(Map<String, Value>),
    List(Vec<OptionItem>),
}

impl TitleMap {
    /// Title registered for a value, if any
    pub fn title_for(&self, value: &Value) -> Option<String> {
        let wanted = value_to_key(value);
        match self {
            TitleMap::Map(map) => map.get(&wanted).map(value_to_key),
            TitleMap::List(items) => items
                .iter()
                .map(OptionItem::to_field_option)
                .find(|option| value_to_key(&option.value) == wanted)
                .map(|option| option.title),
        }
    }

    /// Options in the order imposed by a list-form title map
    pub fn ordered_options(&self) -> Option<Vec<FieldOption>> {
        match self {
            TitleMap::Map(_) => None,
            TitleMap::List(items) => Some(items.iter().map(OptionItem::to_field_option).collect()),
        }
    }
}

/// String form of a scalar used as a map key or an HTML attribute
pub fn value_to_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_layout_items_parse_shorthand_and_elements() {
        let items: Vec<LayoutItem> = serde_json::from_value(json!([
            "*",
            "name",
            {"key": "age", "type": "number", "valueInLegend": true, "datepicker": {"x": 1}}
        ]))
        .unwrap();
        assert!(items[0].is_wildcard());
        assert_eq!(items[1].key(), Some("name"));
        let element = items[2].clone().into_element();
        assert_eq!(element.widget.as_deref(), Some("number"));
        assert!(element.value_in_legend);
        assert_eq!(element.extra.get("datepicker"), Some(&json!({"x": 1})));
    }

    #[test]
    fn test_title_map_lookup() {
        let map: TitleMap = serde_json::from_value(json!({"a": "Alpha", "1": "One"})).unwrap();
        assert_eq!(map.title_for(&json!("a")), Some("Alpha".to_string()));
        assert_eq!(map.title_for(&json!(1)), Some("One".to_string()));
        assert_eq!(map.title_for(&json!("z")), None);
        assert!(map.ordered_options().is_none());
    }

    #[test]
    fn test_option_items_materialize() {
        let options: Vec<OptionItem> =
            serde_json::from_value(json!(["x", {"value": 2, "title": "Two"}, {"title": "Blank"}]))
                .unwrap();
        let materialized: Vec<FieldOption> = options.iter().map(OptionItem::to_field_option).collect();
        assert_eq!(materialized[0], FieldOption { value: json!("x"), title: "x".into() });
        assert_eq!(materialized[1].title, "Two");
        assert_eq!(materialized[2].value, json!(""));
    }
}
