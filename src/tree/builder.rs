//! Tree construction
//!
//! Walks the layout alongside the schema and creates one node per layout
//! element, recursing into object properties and explicit `items`. Array
//! item templates are built lazily by [`FormTree::child_template`].

use std::rc::Rc;

use serde_json::Value;

use super::{next_prefix, FormTree, NodeId, TreeNode};
use crate::errors::FormError;
use crate::extract::CheckboxMode;
use crate::models::{value_to_key, FieldOption, FormDescriptor, LayoutElement, OptionItem};
use crate::schema::{
    infer_widget, is_required_field, normalize_schema, properties, resolve_refs, schema_node_for_key, schema_type,
    wrap_legacy_schema,
};
use crate::widgets::WidgetRegistry;

impl FormTree {
    /// Build the tree for a descriptor and compute its initial values
    pub fn build(descriptor: &FormDescriptor, registry: Rc<WidgetRegistry>) -> Result<Self, FormError> {
        let mut schema = wrap_legacy_schema(descriptor.schema.clone());
        normalize_schema(&mut schema)?;
        resolve_refs(&mut schema);

        let prefix = descriptor.prefix.clone().unwrap_or_else(next_prefix);
        let mut tree = FormTree::empty(schema, prefix, registry);
        tree.tpldata = descriptor.tpldata.clone();
        tree.non_default_items = descriptor.non_default_form_items.clone();
        tree.field_html_class = descriptor.params.field_html_class.clone();

        let root_layout = LayoutElement {
            widget: Some("root".to_string()),
            ..LayoutElement::default()
        };
        let root = tree.alloc(TreeNode::new(Rc::new(root_layout), None, "root".to_string()));
        tree.set_root(root);

        for item in descriptor.layout() {
            if item.is_wildcard() {
                for name in tree.property_names(None) {
                    let child = tree.build_from_layout(LayoutElement::for_key(name))?;
                    tree.append_child(root, child)?;
                }
            } else {
                let child = tree.build_from_layout(item.into_element())?;
                tree.append_child(root, child)?;
            }
        }

        log::debug!("Built form tree '{}' with {} top-level nodes", tree.prefix, tree.node(root)?.children.len());
        tree.compute_initial_values(root, descriptor.value.as_ref(), false, 0)?;
        Ok(tree)
    }

    /// Property names of the root schema (or of the object at `parent_key`),
    /// minus the keys excluded from default expansion
    fn property_names(&self, parent_key: Option<&str>) -> Vec<String> {
        let object = match parent_key {
            None => Some(self.schema.as_ref()),
            Some(key) => schema_node_for_key(&self.schema, key).ok().flatten(),
        };
        let props = match object.and_then(properties) {
            Some(props) => props,
            None => return Vec::new(),
        };
        props
            .keys()
            .map(|name| match parent_key {
                Some(parent) => format!("{}.{}", parent, name),
                None => name.clone(),
            })
            .filter(|key| !self.non_default_items.contains(key))
            .collect()
    }

    /// Create the node (and its static subtree) for one layout element
    pub(crate) fn build_from_layout(&mut self, mut element: LayoutElement) -> Result<NodeId, FormError> {
        let mut schema_node: Option<Value> = None;

        if let Some(key) = element.key.clone() {
            let node = schema_node_for_key(&self.schema, &key)?
                .cloned()
                .ok_or_else(|| {
                    FormError::SchemaLayoutMismatch(format!(
                        "layout key '{}' has no matching schema definition",
                        key
                    ))
                })?;

            if element.name.is_none() {
                element.name = Some(key.clone());
            }
            if element.title.is_none() {
                element.title = node.get("title").and_then(Value::as_str).map(String::from);
            }
            if element.description.is_none() {
                element.description = node.get("description").and_then(Value::as_str).map(String::from);
            }
            if element.read_only.is_none() {
                element.read_only = node.get("readOnly").and_then(Value::as_bool);
            }
            if element.required.is_none() {
                element.required = Some(is_required_field(&self.schema, &key)?);
            }
            if element.widget.is_none() {
                element.widget = Some(infer_widget(&node));
            }
            schema_node = Some(node);
        } else if element.widget.is_none() {
            element.widget = Some("section".to_string());
        }

        let widget = element.widget.clone().unwrap_or_else(|| "section".to_string());
        let (is_input, is_array) = {
            let view = self.registry.view(&widget)?;
            (view.input, view.array)
        };

        match (&element.key, &schema_node) {
            (Some(key), Some(node)) => {
                let ty = schema_type(node);
                if is_array && ty != Some("array") {
                    return Err(FormError::SchemaLayoutMismatch(format!(
                        "'{}' uses array widget '{}' but its schema type is {}",
                        key,
                        widget,
                        ty.unwrap_or("undefined")
                    )));
                }
                if !is_input && !is_array && ty != Some("object") {
                    return Err(FormError::SchemaLayoutMismatch(format!(
                        "'{}' uses container widget '{}' but its schema type is {}",
                        key,
                        widget,
                        ty.unwrap_or("undefined")
                    )));
                }
            }
            (None, _) if is_input => {
                return Err(FormError::SchemaLayoutMismatch(format!(
                    "input widget '{}' needs a key",
                    widget
                )));
            }
            _ => {}
        }

        let options = materialize_options(&element, schema_node.as_ref(), &widget);
        if let Some(key) = element.key.as_deref() {
            self.record_hints(key, &element, schema_node.as_ref(), &widget);
        }

        let explicit_items = if is_array { None } else { element.items.clone() };
        let key = element.key.clone();
        let layout = Rc::new(element);
        if let Some(key) = &key {
            self.layouts.entry(key.clone()).or_insert_with(|| Rc::clone(&layout));
        }

        let mut node = TreeNode::new(layout, schema_node.map(Rc::new), widget);
        node.input = is_input;
        node.array = is_array;
        node.option_source = Rc::new(options);
        let object_schema = node.schema_type() == Some("object");
        let id = self.alloc(node);

        if let Some(items) = explicit_items {
            for item in items {
                let child = self.build_from_layout(item.into_element())?;
                self.append_child(id, child)?;
            }
        } else if object_schema && !is_input && !is_array {
            for child_key in self.property_names(key.as_deref()) {
                let child = self.build_from_layout(LayoutElement::for_key(child_key))?;
                self.append_child(id, child)?;
            }
        }

        Ok(id)
    }

    /// Pristine item template of an array node, built on first use
    pub fn child_template(&mut self, array: NodeId) -> Result<NodeId, FormError> {
        let (existing, layout) = {
            let node = self.node(array)?;
            (node.child_template, Rc::clone(&node.layout))
        };
        if let Some(template) = existing {
            return Ok(template);
        }

        let item_element = match layout.items.as_deref() {
            Some([single]) => single.clone().into_element(),
            Some(items) if !items.is_empty() => LayoutElement::container("section", items.to_vec()),
            _ => match &layout.key {
                Some(key) => LayoutElement::for_key(format!("{}[]", key)),
                None => {
                    return Err(FormError::SchemaLayoutMismatch(
                        "array widget without key needs item layout".to_string(),
                    ))
                }
            },
        };

        let template = self.build_from_layout(item_element)?;
        self.node_mut(array)?.child_template = Some(template);
        Ok(template)
    }

    fn record_hints(&mut self, key: &str, element: &LayoutElement, schema: Option<&Value>, widget: &str) {
        if element.allow_empty {
            self.hints.entry(key).allow_empty = true;
        }
        match widget {
            "checkboxes" => {
                let has_enum = schema
                    .and_then(|node| node.get("items"))
                    .and_then(|items| items.get("enum"))
                    .is_some();
                let mode = if element.options.is_none() && has_enum {
                    CheckboxMode::Selected
                } else {
                    CheckboxMode::Value
                };
                self.hints.entry(key).checkboxes = Some(mode);
            }
            "tagsinput" => self.hints.entry(key).tags = true,
            _ => {}
        }
    }
}

/// Value/title pairs from explicit options, else from the schema enum
fn materialize_options(element: &LayoutElement, schema: Option<&Value>, widget: &str) -> Vec<FieldOption> {
    if let Some(options) = &element.options {
        return options.iter().map(OptionItem::to_field_option).collect();
    }

    let enum_source = schema.and_then(|node| {
        if widget == "checkboxes" {
            node.get("items").and_then(|items| items.get("enum"))
        } else {
            node.get("enum")
        }
    });
    let choices = match enum_source.and_then(Value::as_array) {
        Some(choices) => choices,
        None => return Vec::new(),
    };

    // Checkbox groups map positions back onto the enum, so they keep enum order
    if widget != "checkboxes" {
        if let Some(ordered) = element.title_map.as_ref().and_then(|map| map.ordered_options()) {
            return ordered;
        }
    }

    choices
        .iter()
        .map(|choice| FieldOption {
            value: choice.clone(),
            title: element
                .title_map
                .as_ref()
                .and_then(|map| map.title_for(choice))
                .unwrap_or_else(|| value_to_key(choice)),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry() -> Rc<WidgetRegistry> {
        Rc::new(WidgetRegistry::with_builtins().unwrap())
    }

    fn build(descriptor: Value) -> Result<FormTree, FormError> {
        FormTree::build(&FormDescriptor::from_value(descriptor).unwrap(), registry())
    }

    #[test]
    fn test_wildcard_expands_in_property_order() {
        let tree = build(json!({
            "schema": {"properties": {
                "zeta": {"type": "string"},
                "alpha": {"type": "integer"},
                "secret": {"type": "string"}
            }},
            "form": ["*"],
            "nonDefaultFormItems": ["secret"]
        }))
        .unwrap();
        let keys: Vec<String> = tree
            .children(tree.root())
            .unwrap()
            .into_iter()
            .filter_map(|id| tree.node(id).unwrap().key.clone())
            .collect();
        assert_eq!(keys, vec!["zeta", "alpha"]);
    }

    #[test]
    fn test_schema_merge_and_inference() {
        let tree = build(json!({
            "schema": {
                "required": ["name"],
                "properties": {
                    "name": {"type": "string", "title": "Name", "readonly": true},
                    "kind": {"type": "string", "enum": ["a", "b"]}
                }
            },
            "form": ["name", {"key": "kind", "titleMap": {"a": "Alpha"}}]
        }))
        .unwrap();
        let children = tree.children(tree.root()).unwrap();
        let name = tree.node(children[0]).unwrap();
        assert_eq!(name.widget, "text");
        assert_eq!(name.labels.title.as_deref(), Some("Name"));
        assert!(name.required);
        assert!(name.read_only);

        let kind = tree.node(children[1]).unwrap();
        assert_eq!(kind.widget, "select");
        assert_eq!(kind.options[0], FieldOption { value: json!("a"), title: "Alpha".into() });
        assert_eq!(kind.options[1].title, "b");
    }

    #[test]
    fn test_missing_schema_node_is_fatal() {
        let err = build(json!({"schema": {"properties": {}}, "form": ["ghost"]})).unwrap_err();
        assert!(matches!(err, FormError::SchemaLayoutMismatch(msg) if msg.contains("ghost")));
    }

    #[test]
    fn test_container_on_scalar_is_fatal() {
        let err = build(json!({
            "schema": {"properties": {"name": {"type": "string"}}},
            "form": [{"key": "name", "type": "fieldset"}]
        }))
        .unwrap_err();
        assert!(matches!(err, FormError::SchemaLayoutMismatch(_)));
    }

    #[test]
    fn test_keyless_input_is_fatal() {
        let err = build(json!({"schema": {"properties": {}}, "form": [{"type": "text"}]})).unwrap_err();
        assert!(matches!(err, FormError::SchemaLayoutMismatch(_)));
    }

    #[test]
    fn test_unknown_widget_is_fatal() {
        let err = build(json!({
            "schema": {"properties": {"name": {"type": "string"}}},
            "form": [{"key": "name", "type": "wysiwyg"}]
        }))
        .unwrap_err();
        assert_eq!(err, FormError::UnknownWidget("wysiwyg".into()));
    }

    #[test]
    fn test_object_properties_become_children() {
        let tree = build(json!({
            "schema": {"properties": {"person": {"type": "object", "properties": {
                "first": {"type": "string"},
                "last": {"type": "string"}
            }}}}
        }))
        .unwrap();
        let person = tree.find_by_key("person").unwrap();
        let node = tree.node(person).unwrap();
        assert_eq!(node.widget, "fieldset");
        let keys: Vec<String> = node
            .children
            .iter()
            .filter_map(|id| tree.node(*id).unwrap().key.clone())
            .collect();
        assert_eq!(keys, vec!["person.first", "person.last"]);
    }

    #[test]
    fn test_checkbox_hints_recorded() {
        let tree = build(json!({
            "schema": {"properties": {"tags": {"type": "array", "items": {"type": "string", "enum": ["x", "y"]}}}},
            "form": [{"key": "tags", "type": "checkboxes"}]
        }))
        .unwrap();
        assert_eq!(tree.hints().get("tags").unwrap().checkboxes, Some(CheckboxMode::Selected));
        let tags = tree.find_by_key("tags").unwrap();
        assert_eq!(tree.node(tags).unwrap().options.len(), 2);
    }
}
