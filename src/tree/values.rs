//! Initial value computation and value read-back
//!
//! `compute_initial_values` runs parent first: a node's array path, id and
//! labels must be final before its children derive theirs.

use serde_json::Value;

use super::{FormTree, NodeId};
use crate::errors::FormError;
use crate::extract::{extract_values, CheckboxMode, FlatInput, RawInput};
use crate::models::{value_to_key, FieldOption, LabelProp};
use crate::resolve::{resolve_array_scoped_default, truncate_to_max_length, ValueResolver};
use crate::template::{slugify, truthy};
use crate::utils::path::{apply_array_path, get_by_path, is_set, truncate_to_array_depth};
use crate::widgets::InputShape;

impl FormTree {
    /// Compute ids, labels and values for `id` and its subtree
    ///
    /// `values` is a previous submission; when present, schema defaults are
    /// not consulted for inputs. `top_default_level` is the number of array
    /// levels whose defaults are ignored (see [`resolve_array_scoped_default`]).
    pub fn compute_initial_values(
        &mut self,
        id: NodeId,
        values: Option<&Value>,
        ignore_default: bool,
        top_default_level: usize,
    ) -> Result<(), FormError> {
        let array_path = self.array_path_for(id)?;
        let (layout, child_pos, is_input, is_array) = {
            let node = self.node(id)?;
            (node.layout.clone(), node.child_pos, node.input, node.array)
        };

        // Identity
        let identity = match layout.key.as_deref() {
            Some(key) => {
                let concrete = apply_array_path(key, &array_path);
                let dom_id = match layout.id.as_deref() {
                    Some(template) => apply_array_path(template, &array_path),
                    None => format!("{}-elt-{}", self.prefix, concrete.replace('.', "---")),
                };
                let name = apply_array_path(layout.name.as_deref().unwrap_or(key), &array_path);
                Some((dom_id, slugify(&concrete), name, concrete))
            }
            None => None,
        };
        let has_id = self.node(id)?.id.is_some();
        let counter_id = match (&identity, &layout.id) {
            (None, Some(template)) => Some(apply_array_path(template, &array_path)),
            (None, None) if !has_id => Some(self.next_counter_id()),
            _ => None,
        };
        {
            let node = self.node_mut(id)?;
            node.array_path = array_path.clone();
            if let Some((dom_id, keydash, name, concrete)) = identity {
                node.id = Some(dom_id);
                node.keydash = Some(keydash);
                node.name = Some(name);
                node.key = Some(concrete);
            }
            if counter_id.is_some() {
                node.id = counter_id;
            }
        }

        // Labels and options
        let idx = array_path.last().map(|last| last + 1).unwrap_or(child_pos + 1);
        self.expand_labels(id, idx, values)?;

        // Value
        if is_input {
            self.compute_input_value(id, values, ignore_default, top_default_level, idx)?;
        } else if is_array {
            let count = self.initial_item_count(id, values, ignore_default, top_default_level)?;
            let stale = self.children(id)?;
            for child in stale {
                self.remove_child(id, child)?;
            }
            let template = self.child_template(id)?;
            for _ in 0..count {
                let item = self.clone_subtree(template)?;
                self.append_child(id, item)?;
            }
        }

        for child in self.children(id)? {
            self.compute_initial_values(child, values, ignore_default, top_default_level)?;
        }

        if layout.value_in_legend {
            self.attach_legend_child(id)?;
        }
        Ok(())
    }

    fn resolver<'a>(&'a self, values: Option<&'a Value>) -> ValueResolver<'a> {
        ValueResolver::new(&self.schema, &self.layouts, &self.tpldata).with_previous(values)
    }

    /// Template-expand label properties and option titles
    pub(crate) fn expand_labels(&mut self, id: NodeId, idx: usize, values: Option<&Value>) -> Result<(), FormError> {
        let (layout, array_path, option_source, own_value, legend_child) = {
            let node = self.node(id)?;
            (
                node.layout.clone(),
                node.array_path.clone(),
                node.option_source.clone(),
                node.value.clone(),
                node.legend_child,
            )
        };
        let legend_value = legend_child
            .filter(|child| *child == id || self.is_descendant(*child, id))
            .and_then(|child| self.get(child))
            .and_then(|child| child.value.clone());
        let context_value = own_value
            .filter(|value| !value.is_null())
            .or(legend_value)
            .unwrap_or(Value::Null);

        let mut labels = Vec::with_capacity(LabelProp::ALL.len());
        let mut options = Vec::with_capacity(option_source.len());
        {
            let resolver = self.resolver(values);
            for prop in LabelProp::ALL {
                let expanded = match layout.label(prop) {
                    Some(template) => Some(resolver.expand_label(template, idx, context_value.clone(), &array_path)?),
                    None => None,
                };
                labels.push((prop, expanded));
            }
            for option in option_source.iter() {
                options.push(FieldOption {
                    value: option.value.clone(),
                    title: resolver.expand_label(&option.title, idx, context_value.clone(), &array_path)?,
                });
            }
        }

        let node = self.node_mut(id)?;
        for (prop, expanded) in labels {
            node.labels.set(prop, expanded);
        }
        node.options = options;
        Ok(())
    }

    fn compute_input_value(
        &mut self,
        id: NodeId,
        values: Option<&Value>,
        ignore_default: bool,
        top_default_level: usize,
        idx: usize,
    ) -> Result<(), FormError> {
        let (layout, key, array_path, schema) = {
            let node = self.node(id)?;
            (node.layout.clone(), node.key.clone(), node.array_path.clone(), node.schema.clone())
        };
        let key = match key {
            Some(key) => key,
            None => return Ok(()),
        };

        let mut value = None;
        let mut from_default = false;

        // A layout `value` is stamped only; titleMap and `maxLength` apply to schema defaults
        if !ignore_default {
            if let Some(explicit) = layout.value.as_ref().filter(|v| !v.is_null()) {
                value = Some(self.resolver(values).stamp(explicit.clone(), idx, &array_path, 0)?);
            }
        }

        match values {
            Some(previous) => {
                let found = get_by_path(previous, &key, false)?;
                if is_set(found) {
                    value = found.cloned();
                }
            }
            None => {
                if !ignore_default && value.is_none() && layout.value.is_none() {
                    if let Some(default) = resolve_array_scoped_default(&self.schema, &key, top_default_level)? {
                        let stamped = self.resolver(None).stamp(default, idx, &array_path, 0)?;
                        value = Some(truncate_to_max_length(stamped, schema.as_deref()));
                        from_default = true;
                    }
                }
            }
        }

        let node = self.node_mut(id)?;
        node.value = value;
        node.default_value = from_default;
        Ok(())
    }

    /// Number of items an array node starts with
    fn initial_item_count(
        &mut self,
        id: NodeId,
        values: Option<&Value>,
        ignore_default: bool,
        top_default_level: usize,
    ) -> Result<usize, FormError> {
        let keys = self.array_value_keys(id)?;
        let min_items = self
            .node(id)?
            .schema
            .as_deref()
            .and_then(|schema| schema.get("minItems"))
            .and_then(Value::as_u64)
            .map(|min| min as usize);

        if let Some(previous) = values {
            let mut count = None;
            for key in &keys {
                if let Some(Value::Array(items)) = get_by_path(previous, key, false)? {
                    count = Some(count.unwrap_or(0).max(items.len()));
                }
            }
            if let Some(count) = count {
                return Ok(count);
            }
        } else if !ignore_default {
            let mut count = None;
            for key in &keys {
                if let Some(Value::Array(items)) = resolve_array_scoped_default(&self.schema, key, top_default_level)? {
                    count = Some(count.unwrap_or(0).max(items.len()));
                }
            }
            if let Some(count) = count {
                return Ok(count);
            }
        }

        match (values, min_items) {
            (Some(_), Some(min)) => Ok(min),
            _ => Ok(1),
        }
    }

    /// Concrete value keys holding this array's items
    ///
    /// A keyed array uses its own key. A keyless one collects the keys of its
    /// item template's descendants, cut at this array's depth.
    fn array_value_keys(&mut self, id: NodeId) -> Result<Vec<String>, FormError> {
        let (key, depth) = {
            let node = self.node(id)?;
            (node.key.clone(), node.array_path.len())
        };
        if let Some(key) = key {
            return Ok(vec![key]);
        }

        let template = self.child_template(id)?;
        let array_path = self.node(id)?.array_path.clone();
        let mut generic = Vec::new();
        self.collect_template_keys(template, &mut generic);

        let mut keys: Vec<String> = Vec::new();
        for key in generic {
            if !key.contains("[]") {
                continue;
            }
            let concrete = apply_array_path(&truncate_to_array_depth(&key, depth), &array_path);
            if !keys.contains(&concrete) {
                keys.push(concrete);
            }
        }
        Ok(keys)
    }

    fn collect_template_keys(&self, id: NodeId, out: &mut Vec<String>) {
        if let Some(node) = self.get(id) {
            if let Some(key) = node.generic_key() {
                out.push(key.to_string());
            }
            for child in &node.children {
                self.collect_template_keys(*child, out);
            }
        }
    }

    /// Record `id` as the legend source of its enclosing array item and
    /// re-expand that item's legend
    pub(crate) fn attach_legend_child(&mut self, id: NodeId) -> Result<(), FormError> {
        let mut current = Some(id);
        while let Some(candidate) = current {
            let (parent, has_legend, array_path, child_pos) = {
                let node = self.node(candidate)?;
                (node.parent, node.layout.legend.is_some(), node.array_path.clone(), node.child_pos)
            };
            let parent_is_array = parent
                .and_then(|parent| self.get(parent))
                .map(|parent| parent.array)
                .unwrap_or(false);
            if parent_is_array {
                self.node_mut(candidate)?.legend_child = Some(id);
                if has_legend {
                    let idx = array_path.last().map(|last| last + 1).unwrap_or(child_pos + 1);
                    return self.expand_labels(candidate, idx, None);
                }
            }
            current = parent;
        }
        Ok(())
    }

    /// Values currently held by the subtree at `id`
    ///
    /// With `update_array_path`, the result is keyed as if the subtree sat at
    /// that array path instead.
    pub fn get_form_values(&self, id: NodeId, update_array_path: Option<&[usize]>) -> Result<Value, FormError> {
        let inputs = self.collect_inputs(id)?;
        Ok(extract_values(&inputs, &self.schema, &self.hints, update_array_path))
    }

    /// Flat inputs the rendered controls of the subtree would submit
    pub fn collect_inputs(&self, id: NodeId) -> Result<Vec<FlatInput>, FormError> {
        self.node(id)?;
        let mut inputs = Vec::new();
        self.collect_into(id, &mut inputs);
        Ok(inputs)
    }

    fn collect_into(&self, id: NodeId, inputs: &mut Vec<FlatInput>) {
        let node = match self.get(id) {
            Some(node) => node,
            None => return,
        };
        if node.input {
            if let Some(name) = node.name.as_deref() {
                let shape = self
                    .registry
                    .get(&node.widget)
                    .map(|view| view.shape)
                    .unwrap_or(InputShape::Scalar);
                let mode = node
                    .generic_key()
                    .and_then(|key| self.hints.get(key))
                    .and_then(|hint| hint.checkboxes);
                push_inputs(inputs, name, node.value.as_ref(), &node.options, shape, mode);
            }
        }
        for child in &node.children {
            self.collect_into(*child, inputs);
        }
    }
}

fn push_inputs(
    inputs: &mut Vec<FlatInput>,
    name: &str,
    value: Option<&Value>,
    options: &[FieldOption],
    shape: InputShape,
    mode: Option<CheckboxMode>,
) {
    match shape {
        InputShape::None => {}
        InputShape::Scalar => {
            let text = value.map(value_to_key).unwrap_or_default();
            inputs.push(FlatInput::text(name, text));
        }
        InputShape::Checkbox => {
            let checked = value.map(truthy).unwrap_or(false);
            inputs.push(if checked {
                FlatInput::text(name, "1")
            } else {
                FlatInput::flag(name, false)
            });
        }
        InputShape::CheckboxGroup => {
            let selected: Vec<Value> = match value {
                Some(Value::Array(items)) => items.clone(),
                Some(other) if !other.is_null() => vec![other.clone()],
                _ => Vec::new(),
            };
            for (index, option) in options.iter().enumerate() {
                let option_name = format!("{}[{}]", name, index);
                let checked = selected.iter().any(|v| value_to_key(v) == value_to_key(&option.value));
                let raw = match (checked, mode) {
                    (false, _) => RawInput::Flag(false),
                    (true, Some(CheckboxMode::Selected)) => RawInput::Text("1".to_string()),
                    (true, _) => RawInput::Text(value_to_key(&option.value)),
                };
                inputs.push(FlatInput {
                    name: option_name,
                    value: raw,
                });
            }
        }
        InputShape::Tags => {
            let items = match value {
                Some(Value::Array(items)) => items.clone(),
                _ => Vec::new(),
            };
            inputs.push(FlatInput::list(name, items));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::models::FormDescriptor;
    use crate::widgets::WidgetRegistry;
    use serde_json::json;

    fn build(descriptor: Value) -> FormTree {
        let registry = Rc::new(WidgetRegistry::with_builtins().unwrap());
        FormTree::build(&FormDescriptor::from_value(descriptor).unwrap(), registry).unwrap()
    }

    #[test]
    fn test_fresh_array_gets_one_item() {
        let tree = build(json!({
            "schema": {"properties": {"tags": {"type": "array", "items": {"type": "string"}}}}
        }));
        let tags = tree.find_by_key("tags").unwrap();
        let items = tree.children(tags).unwrap();
        assert_eq!(items.len(), 1);
        let item = tree.node(items[0]).unwrap();
        assert_eq!(item.key.as_deref(), Some("tags[0]"));
        assert_eq!(item.array_path, vec![0]);
    }

    #[test]
    fn test_layout_value_skips_max_length() {
        let tree = build(json!({
            "schema": {"properties": {"code": {"type": "string", "maxLength": 3, "default": "zzzzz"}}},
            "form": [{"key": "code", "value": "abcdef"}]
        }));
        let code = tree.node(tree.find_by_key("code").unwrap()).unwrap();
        assert_eq!(code.value, Some(json!("abcdef")));
        assert!(!code.default_value);
    }

    #[test]
    fn test_previous_values_drive_item_count() {
        let tree = build(json!({
            "schema": {"properties": {"tags": {"type": "array", "minItems": 2, "items": {"type": "string"}}}},
            "value": {"tags": ["a", "b", "c"]}
        }));
        let tags = tree.find_by_key("tags").unwrap();
        assert_eq!(tree.children(tags).unwrap().len(), 3);
        assert_eq!(tree.get_form_values(tree.root(), None).unwrap(), json!({"tags": ["a", "b", "c"]}));
    }

    #[test]
    fn test_empty_previous_array_means_no_items() {
        let tree = build(json!({
            "schema": {"properties": {"tags": {"type": "array", "minItems": 2, "items": {"type": "string"}}}},
            "value": {"tags": []}
        }));
        let tags = tree.find_by_key("tags").unwrap();
        assert!(tree.children(tags).unwrap().is_empty());
    }

    #[test]
    fn test_absent_previous_array_uses_min_items() {
        let tree = build(json!({
            "schema": {"properties": {
                "name": {"type": "string"},
                "tags": {"type": "array", "minItems": 2, "items": {"type": "string"}}
            }},
            "value": {"name": "x"}
        }));
        let tags = tree.find_by_key("tags").unwrap();
        assert_eq!(tree.children(tags).unwrap().len(), 2);
    }

    #[test]
    fn test_array_default_drives_count_and_values() {
        let tree = build(json!({
            "schema": {"properties": {"friends": {
                "type": "array",
                "default": [{"name": "Ann"}, {"name": "Bob"}],
                "items": {"type": "object", "properties": {"name": {"type": "string"}}}
            }}}
        }));
        let friends = tree.find_by_key("friends").unwrap();
        assert_eq!(tree.children(friends).unwrap().len(), 2);
        let bob = tree.find_by_key("friends[1].name").unwrap();
        let node = tree.node(bob).unwrap();
        assert_eq!(node.value, Some(json!("Bob")));
        assert!(node.default_value);
        assert_eq!(node.name.as_deref(), Some("friends[1].name"));
    }

    #[test]
    fn test_previous_value_suppresses_defaults() {
        let tree = build(json!({
            "schema": {"properties": {
                "a": {"type": "string", "default": "A"},
                "b": {"type": "string", "default": "B"}
            }},
            "value": {"a": "kept"}
        }));
        let a = tree.node(tree.find_by_key("a").unwrap()).unwrap();
        let b = tree.node(tree.find_by_key("b").unwrap()).unwrap();
        assert_eq!(a.value, Some(json!("kept")));
        assert_eq!(b.value, None);
    }

    #[test]
    fn test_ids_and_labels_follow_array_path() {
        let tree = build(json!({
            "schema": {"properties": {"friends": {
                "type": "array",
                "items": {"type": "object", "properties": {"name": {"type": "string"}}}
            }}},
            "form": [{"key": "friends", "items": [{"key": "friends[]", "legend": "Friend {{idx}}"}]}],
            "prefix": "f",
            "value": {"friends": [{"name": "a"}, {"name": "b"}]}
        }));
        let second = tree.find_by_key("friends[1]").unwrap();
        let node = tree.node(second).unwrap();
        assert_eq!(node.id.as_deref(), Some("f-elt-friends[1]"));
        assert_eq!(node.labels.legend.as_deref(), Some("Friend 2"));
        let name = tree.node(tree.find_by_key("friends[1].name").unwrap()).unwrap();
        assert_eq!(name.id.as_deref(), Some("f-elt-friends[1]---name"));
    }

    #[test]
    fn test_value_in_legend_feeds_item_legend() {
        let tree = build(json!({
            "schema": {"properties": {"friends": {
                "type": "array",
                "items": {"type": "object", "properties": {"name": {"type": "string"}}}
            }}},
            "form": [{"key": "friends", "items": [{
                "key": "friends[]",
                "type": "fieldset",
                "legend": "{{idx}}. {{value}}",
                "items": [{"key": "friends[].name", "valueInLegend": true}]
            }]}],
            "value": {"friends": [{"name": "Ann"}]}
        }));
        let item = tree.node(tree.find_by_key("friends[0]").unwrap()).unwrap();
        assert_eq!(item.labels.legend.as_deref(), Some("1. Ann"));
        assert!(item.legend_child.is_some());
    }

    #[test]
    fn test_collect_inputs_shapes() {
        let tree = build(json!({
            "schema": {"properties": {
                "ok": {"type": "boolean"},
                "colors": {"type": "array", "items": {"type": "string", "enum": ["r", "g", "b"]}}
            }},
            "form": ["ok", {"key": "colors", "type": "checkboxes"}],
            "value": {"ok": false, "colors": ["g"]}
        }));
        let inputs = tree.collect_inputs(tree.root()).unwrap();
        assert_eq!(inputs[0], FlatInput::flag("ok", false));
        assert_eq!(inputs[1], FlatInput::flag("colors[0]", false));
        assert_eq!(inputs[2], FlatInput::text("colors[1]", "1"));
        assert_eq!(
            tree.get_form_values(tree.root(), None).unwrap(),
            json!({"ok": false, "colors": ["g"]})
        );
    }
}
