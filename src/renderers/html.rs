//! HTML markup generation
//!
//! Renders a node and its subtree through the widget templates. Strings in
//! the template context are interpolated, booleans drive sections.

use serde_json::{Map, Value};

use crate::errors::FormError;
use crate::models::value_to_key;
use crate::template::{render_markup, truthy};
use crate::tree::{FormTree, NodeId, TreeNode};
use crate::widgets::WidgetView;

/// Render the whole form
pub fn render_form(tree: &FormTree) -> Result<String, FormError> {
    render_node(tree, tree.root())
}

/// Render one node and its subtree
pub fn render_node(tree: &FormTree, id: NodeId) -> Result<String, FormError> {
    let node = tree.node(id)?;
    let view = tree.registry().view(&node.widget)?;

    let mut children = String::new();
    for pos in 0..node.children.len() {
        if view.array {
            children.push_str(&render_array_item(tree, id, pos)?);
        } else {
            children.push_str(&render_node(tree, node.children[pos])?);
        }
    }

    let mut context = node_context(tree, node, view)?;
    context.insert("children".to_string(), Value::String(children));
    if let Some(hooks) = &view.hooks {
        hooks.on_before_render(&mut context, node);
    }

    let markup = render_markup(&view.template, &context)?;
    if view.field_template {
        context.insert("control".to_string(), Value::String(markup));
        render_markup(tree.registry().field(), &context)
    } else {
        Ok(markup)
    }
}

/// Render the item at `pos` of an array node, wrapper included
pub fn render_array_item(tree: &FormTree, array: NodeId, pos: usize) -> Result<String, FormError> {
    let array_node = tree.node(array)?;
    let view = tree.registry().view(&array_node.widget)?;
    let child = *array_node
        .children
        .get(pos)
        .ok_or_else(|| FormError::Render(format!("array {:?} has no item {}", array, pos)))?;
    let inner = render_node(tree, child)?;

    let template = match &view.item_template {
        Some(template) => template,
        None => return Ok(inner),
    };
    let child_node = tree.node(child)?;
    let mut context = Map::new();
    put_str(&mut context, "id", child_node.id.as_deref().unwrap_or_default());
    put_str(&mut context, "idx", &pos.to_string());
    put_str(
        &mut context,
        "legend",
        child_node
            .labels
            .legend
            .as_deref()
            .or(child_node.labels.title.as_deref())
            .unwrap_or_default(),
    );
    context.insert("inner".to_string(), Value::String(inner));
    render_markup(template, &context)
}

/// DOM id of the outermost element rendered for a node
pub fn outer_dom_id(tree: &FormTree, id: NodeId) -> Result<String, FormError> {
    let node = tree.node(id)?;
    let dom_id = node
        .id
        .clone()
        .ok_or_else(|| FormError::Render(format!("node {:?} has no DOM id", id)))?;
    let field = tree
        .registry()
        .get(&node.widget)
        .map(|view| view.field_template)
        .unwrap_or(false);
    Ok(if field { format!("{}-field", dom_id) } else { dom_id })
}

/// DOM id of the wrapper around an array item
pub fn item_dom_id(tree: &FormTree, item: NodeId) -> Result<String, FormError> {
    let node = tree.node(item)?;
    node.id
        .as_ref()
        .map(|id| format!("{}-li", id))
        .ok_or_else(|| FormError::Render(format!("array item {:?} has no DOM id", item)))
}

fn node_context(tree: &FormTree, node: &TreeNode, view: &WidgetView) -> Result<Map<String, Value>, FormError> {
    let layout = &node.layout;
    let mut context = Map::new();

    put_str(&mut context, "id", node.id.as_deref().unwrap_or_default());
    put_str(&mut context, "name", node.name.as_deref().unwrap_or_default());
    put_str(&mut context, "keydash", node.keydash.as_deref().unwrap_or_default());
    put_str(&mut context, "widget", &node.widget);
    put_str(&mut context, "input_type", view.input_type.as_deref().unwrap_or("text"));
    put_str(
        &mut context,
        "value",
        &node.value.as_ref().map(display_value).unwrap_or_default(),
    );

    let field_class = layout
        .field_html_class
        .as_deref()
        .or(tree.field_html_class.as_deref())
        .unwrap_or_default();
    put_str(&mut context, "field_html_class", field_class);
    put_optional(&mut context, "html_class", layout.html_class.as_deref());

    let labels = &node.labels;
    put_optional(&mut context, "title", labels.title.as_deref());
    put_optional(&mut context, "legend", labels.legend.as_deref().or(labels.title.as_deref()));
    put_optional(&mut context, "description", labels.description.as_deref());
    put_optional(&mut context, "prepend", labels.prepend.as_deref());
    put_optional(&mut context, "append", labels.append.as_deref());
    put_optional(&mut context, "placeholder", labels.placeholder.as_deref());
    put_optional(&mut context, "helpvalue", labels.helpvalue.as_deref());
    put_str(
        &mut context,
        "inlinetitle",
        labels.inlinetitle.as_deref().or(labels.title.as_deref()).unwrap_or_default(),
    );

    let show_title = labels.title.is_some() && !layout.notitle && node.widget != "checkbox";
    put_flag(&mut context, "show_title", show_title);
    put_flag(&mut context, "required", node.required);
    put_flag(&mut context, "read_only", node.read_only);
    put_flag(&mut context, "disabled", layout.disabled.unwrap_or(false));
    put_flag(&mut context, "checked", node.value.as_ref().map(truthy).unwrap_or(false));
    put_optional(&mut context, "error", node.error.as_deref());

    let max_length = node
        .schema
        .as_deref()
        .and_then(|schema| schema.get("maxLength"))
        .and_then(Value::as_u64);
    put_optional(&mut context, "max_length", max_length.map(|max| max.to_string()).as_deref());

    let selected: Vec<String> = match &node.value {
        Some(Value::Array(items)) => items.iter().map(value_to_key).collect(),
        Some(value) if !value.is_null() => vec![value_to_key(value)],
        _ => Vec::new(),
    };
    let options: Vec<Value> = node
        .options
        .iter()
        .enumerate()
        .map(|(index, option)| {
            let key = value_to_key(&option.value);
            let chosen = selected.contains(&key);
            let mut entry = Map::new();
            put_str(&mut entry, "value", &key);
            put_str(&mut entry, "title", &option.title);
            put_str(&mut entry, "index", &index.to_string());
            put_flag(&mut entry, "checked", chosen);
            put_flag(&mut entry, "selected", chosen);
            Value::Object(entry)
        })
        .collect();
    context.insert("options".to_string(), Value::Array(options));

    if node.array {
        let schema = node.schema.as_deref();
        let bound = |name: &str| {
            schema
                .and_then(|schema| schema.get(name))
                .and_then(Value::as_i64)
                .unwrap_or(-1)
        };
        put_str(&mut context, "min_items", &bound("minItems").to_string());
        put_str(&mut context, "max_items", &bound("maxItems").to_string());
        put_str(&mut context, "add_label", "Add");
        put_str(&mut context, "delete_label", "Remove");
    }

    if !layout.extra.is_empty() {
        context.insert("extra".to_string(), Value::Object(stringify_scalars(&layout.extra)));
    }

    Ok(context)
}

fn display_value(value: &Value) -> String {
    match value {
        Value::Array(items) if items.iter().all(|item| !item.is_object() && !item.is_array()) => {
            items.iter().map(value_to_key).collect::<Vec<_>>().join(",")
        }
        other => value_to_key(other),
    }
}

fn put_str(context: &mut Map<String, Value>, name: &str, value: &str) {
    context.insert(name.to_string(), Value::String(value.to_string()));
}

fn put_flag(context: &mut Map<String, Value>, name: &str, value: bool) {
    context.insert(name.to_string(), Value::Bool(value));
}

/// Insert a string plus its `has_<name>` flag
fn put_optional(context: &mut Map<String, Value>, name: &str, value: Option<&str>) {
    put_flag(context, &format!("has_{}", name), value.is_some());
    if let Some(value) = value {
        put_str(context, name, value);
    }
}

/// Numbers and nulls become strings so templates can interpolate them
fn stringify_scalars(map: &Map<String, Value>) -> Map<String, Value> {
    map.iter()
        .map(|(key, value)| {
            let converted = match value {
                Value::Object(inner) => Value::Object(stringify_scalars(inner)),
                Value::Array(items) => Value::Array(
                    items
                        .iter()
                        .map(|item| match item {
                            Value::Object(inner) => Value::Object(stringify_scalars(inner)),
                            other => Value::String(value_to_key(other)),
                        })
                        .collect(),
                ),
                Value::Bool(flag) => Value::Bool(*flag),
                other => Value::String(value_to_key(other)),
            };
            (key.clone(), converted)
        })
        .collect()
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
    fn test_render_text_field() {
        let tree = build(json!({
            "schema": {"required": ["name"], "properties": {"name": {"type": "string", "title": "Your <name>"}}},
            "form": ["name"],
            "value": {"name": "Ada & co"},
            "prefix": "p"
        }));
        let html = render_form(&tree).unwrap();
        assert!(html.contains("id=\"p-elt-name-field\""));
        assert!(html.contains("name=\"name\""));
        assert!(html.contains("value=\"Ada &amp; co\""));
        assert!(html.contains("Your &lt;name&gt;"));
        assert!(html.contains("jsonform-required"));
    }

    #[test]
    fn test_render_array_items_wrapped() {
        let tree = build(json!({
            "schema": {"properties": {"tags": {"type": "array", "items": {"type": "string"}}}},
            "form": ["tags"],
            "value": {"tags": ["a", "b"]},
            "prefix": "p"
        }));
        let html = render_form(&tree).unwrap();
        assert!(html.contains("id=\"p-elt-tags-items\""));
        assert!(html.contains("id=\"p-elt-tags[0]-li\""));
        assert!(html.contains("id=\"p-elt-tags[1]-li\""));
        assert!(html.contains("name=\"tags[1]\""));
    }

    #[test]
    fn test_render_select_marks_selection() {
        let tree = build(json!({
            "schema": {"properties": {"size": {"type": "string", "enum": ["s", "m", "l"]}}},
            "form": ["size"],
            "value": {"size": "m"}
        }));
        let html = render_form(&tree).unwrap();
        assert!(html.contains("<option value=\"m\" selected=\"selected\">m</option>"));
        assert!(html.contains("<option value=\"s\">s</option>"));
    }

    #[test]
    fn test_error_rendered() {
        let mut tree = build(json!({
            "schema": {"properties": {"name": {"type": "string"}}},
            "form": ["name"]
        }));
        let id = tree.find_by_key("name").unwrap();
        tree.node_mut(id).unwrap().error = Some("too short".into());
        let html = render_node(&tree, id).unwrap();
        assert!(html.contains("has-error"));
        assert!(html.contains("too short"));
    }
}
