//! Form descriptor: the document a form session is initialized from
//!
//! `{schema, form, value?, params?, prefix?, tpldata?, ...}` as sent by the
//! host page. Unknown top-level fields are kept as extension data.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::layout::{LayoutElement, LayoutItem};
use crate::errors::FormError;

/// Complete form definition
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FormDescriptor {
    /// JSON Schema (v3 or v4 dialect) describing the value object
    #[serde(default)]
    pub schema: Value,

    /// Layout; defaults to every property plus a submit button
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form: Option<Vec<LayoutItem>>,

    /// Previously submitted values, same shape as the schema's value space
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,

    #[serde(default)]
    pub params: FormParams,

    /// Prefix for generated element ids
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,

    /// Extra data made available to value templates
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub tpldata: Map<String, Value>,

    /// Keys left out of wildcard and object expansion
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub non_default_form_items: Vec<String>,

    /// Run the validator on submit
    #[serde(default = "default_validate")]
    pub validate: bool,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Presentation parameters shared by every field
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FormParams {
    /// Class added to every field control
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_html_class: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_validate() -> bool {
    true
}

impl Default for FormDescriptor {
    fn default() -> Self {
        Self {
            schema: Value::Object(Map::new()),
            form: None,
            value: None,
            params: FormParams::default(),
            prefix: None,
            tpldata: Map::new(),
            non_default_form_items: Vec::new(),
            validate: true,
            extra: Map::new(),
        }
    }
}

impl FormDescriptor {
    /// Create a descriptor for a schema with the default layout
    pub fn new(schema: Value) -> Self {
        Self {
            schema,
            ..Self::default()
        }
    }

    /// Parse a descriptor from JSON text
    pub fn from_json(json: &str) -> Result<Self, FormError> {
        serde_json::from_str(json).map_err(|e| FormError::Descriptor(e.to_string()))
    }

    /// Parse a descriptor from an already decoded JSON value
    pub fn from_value(value: Value) -> Result<Self, FormError> {
        serde_json::from_value(value).map_err(|e| FormError::Descriptor(e.to_string()))
    }

    /// Set the layout
    pub fn with_form(mut self, form: Vec<LayoutItem>) -> Self {
        self.form = Some(form);
        self
    }

    /// Set previously submitted values
    pub fn with_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }

    /// Set the id prefix
    pub fn with_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Layout to build, falling back to the default one
    pub fn layout(&self) -> Vec<LayoutItem> {
        match &self.form {
            Some(form) => form.clone(),
            None => default_layout(),
        }
    }
}

/// Every schema property followed by a submit button
pub fn default_layout() -> Vec<LayoutItem> {
    let submit = LayoutElement {
        widget: Some("submit".to_string()),
        title: Some("Submit".to_string()),
        ..LayoutElement::default()
    };
    let actions = LayoutElement::container("actions", vec![submit.into()]);
    vec![LayoutItem::Key(LayoutItem::WILDCARD.to_string()), actions.into()]
}
