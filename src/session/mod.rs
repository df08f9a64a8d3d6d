//! Form session
//!
//! Owns one form tree and drives its lifecycle: build, render, value
//! changes, array mutations, validation and submission. Everything that
//! changes the document after the first render comes back as a
//! [`FormUpdate`] for the host to apply.

use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::FormError;
use crate::extract::{extract_values, FlatInput};
use crate::models::FormDescriptor;
use crate::renderers::{
    apply_patches, item_dom_id, outer_dom_id, render_array_item, render_form, render_node, Presenter, RenderPatch,
};
use crate::tree::{ArrayBoundaries, FormTree, NodeId, TreeNode};
use crate::utils::path::get_by_path;
use crate::widgets::{WidgetHooks, WidgetRegistry, WidgetSpec};

/// One validation failure, keyed by the concrete key of the offending field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    #[serde(default)]
    pub key: String,
    pub message: String,
}

/// What a validator reports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    #[serde(default)]
    pub errors: Vec<ValidationError>,
}

impl ValidationReport {
    pub fn valid() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }

    pub fn invalid(errors: Vec<ValidationError>) -> Self {
        Self { valid: false, errors }
    }
}

/// Pluggable schema validator, called with the schema as the host wrote it
pub trait Validator {
    fn validate(&self, schema: &Value, values: &Value) -> ValidationReport;
}

impl<F> Validator for F
where
    F: Fn(&Value, &Value) -> ValidationReport,
{
    fn validate(&self, schema: &Value, values: &Value) -> ValidationReport {
        self(schema, values)
    }
}

/// Result of [`FormSession::validate`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationOutcome {
    pub errors: Vec<ValidationError>,
    pub values: Value,
}

/// How a submission ended
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// Every check passed; carries the submitted values
    Submitted(Value),
    /// A node still waits on an asynchronous precondition
    Pending(NodeId),
    /// A widget's submit hook said no
    VetoedByWidget(NodeId),
    Invalid(Vec<ValidationError>),
    /// The host's `on_submit_valid` callback said no
    VetoedByHost,
}

impl SubmitOutcome {
    pub fn is_submitted(&self) -> bool {
        matches!(self, SubmitOutcome::Submitted(_))
    }
}

/// Document changes produced by one session operation
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FormUpdate {
    pub patches: Vec<RenderPatch>,
    /// Nodes whose markup the patches contain, subtrees included
    #[serde(skip)]
    pub rendered: Vec<NodeId>,
}

impl FormUpdate {
    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    fn extend(&mut self, other: FormUpdate) {
        self.patches.extend(other.patches);
        self.rendered.extend(other.rendered);
    }
}

pub type SubmitCallback = Box<dyn FnMut(&[ValidationError], &Value)>;
pub type SubmitValidCallback = Box<dyn FnMut(&Value) -> bool>;
pub type ErrorDisplay = Box<dyn FnMut(&[ValidationError])>;

/// A live form: descriptor, widget registry and the tree built from them
pub struct FormSession {
    descriptor: FormDescriptor,
    registry: Rc<WidgetRegistry>,
    tree: FormTree,
    validator: Option<Box<dyn Validator>>,
    on_submit: Option<SubmitCallback>,
    on_submit_valid: Option<SubmitValidCallback>,
    error_display: Option<ErrorDisplay>,
    pending_update: FormUpdate,
}

impl std::fmt::Debug for FormSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormSession")
            .field("tree", &self.tree)
            .field("registry", &self.registry)
            .field("has_validator", &self.validator.is_some())
            .finish()
    }
}

impl FormSession {
    /// Build a session with the built-in widgets
    pub fn initialize(descriptor: FormDescriptor) -> Result<Self, FormError> {
        Self::with_registry(descriptor, WidgetRegistry::with_builtins()?)
    }

    /// Build a session with a custom widget registry
    pub fn with_registry(descriptor: FormDescriptor, registry: WidgetRegistry) -> Result<Self, FormError> {
        let registry = Rc::new(registry);
        let tree = FormTree::build(&descriptor, Rc::clone(&registry))?;
        log::info!("Initialized form session '{}'", tree.prefix());
        Ok(Self {
            descriptor,
            registry,
            tree,
            validator: None,
            on_submit: None,
            on_submit_valid: None,
            error_display: None,
            pending_update: FormUpdate::default(),
        })
    }

    /// Register a widget kind and rebuild the tree, keeping current values
    pub fn register_widget(&mut self, spec: WidgetSpec) -> Result<(), FormError> {
        let values = self.get_values()?;
        Rc::make_mut(&mut self.registry).register(spec)?;
        let mut descriptor = self.descriptor.clone();
        descriptor.value = Some(values);
        descriptor.prefix = Some(self.tree.prefix().to_string());
        self.tree = FormTree::build(&descriptor, Rc::clone(&self.registry))?;
        Ok(())
    }

    pub fn tree(&self) -> &FormTree {
        &self.tree
    }

    pub fn descriptor(&self) -> &FormDescriptor {
        &self.descriptor
    }

    pub fn set_validator<V: Validator + 'static>(&mut self, validator: V) {
        self.validator = Some(Box::new(validator));
    }

    pub fn set_on_submit<F: FnMut(&[ValidationError], &Value) + 'static>(&mut self, callback: F) {
        self.on_submit = Some(Box::new(callback));
    }

    pub fn set_on_submit_valid<F: FnMut(&Value) -> bool + 'static>(&mut self, callback: F) {
        self.on_submit_valid = Some(Box::new(callback));
    }

    /// Replace the default error display (errors attached to matching nodes)
    pub fn set_error_display<F: FnMut(&[ValidationError]) + 'static>(&mut self, display: F) {
        self.error_display = Some(Box::new(display));
    }

    /// Markup for the whole form
    pub fn to_markup(&self) -> Result<String, FormError> {
        render_form(&self.tree)
    }

    /// Mount the form under `mount_point` and run `on_after_render` hooks
    pub fn render<P: Presenter>(&mut self, presenter: &mut P, mount_point: &P::Handle) -> Result<P::Handle, FormError> {
        let markup = self.to_markup()?;
        let handle = presenter.mount(&markup, mount_point, None)?;
        self.pending_update = FormUpdate::default();
        let ids = self.tree.node_ids();
        self.run_after_render(&ids);
        log::debug!("Rendered form '{}' ({} nodes)", self.tree.prefix(), ids.len());
        Ok(handle)
    }

    /// Apply an update below `root` and run `on_after_render` hooks for what it rendered
    pub fn apply<P: Presenter>(&self, presenter: &mut P, root: &P::Handle, update: &FormUpdate) -> Result<(), FormError> {
        apply_patches(presenter, root, &update.patches)?;
        self.run_after_render(&update.rendered);
        Ok(())
    }

    /// Take the update queued by the default error display
    pub fn take_pending_update(&mut self) -> FormUpdate {
        std::mem::take(&mut self.pending_update)
    }

    /// Current values, shaped like the schema
    pub fn get_values(&self) -> Result<Value, FormError> {
        self.tree.get_form_values(self.tree.root(), None)
    }

    /// Values reconstructed from inputs read off a rendered document
    pub fn get_values_from_inputs(&self, inputs: &[FlatInput]) -> Value {
        extract_values(inputs, self.tree.schema(), self.tree.hints(), None)
    }

    /// Bring the tree in line with inputs read off the rendered document
    ///
    /// Only inputs whose controls appear in `inputs` are touched. Changed
    /// inputs run their `on_change` hook and refresh the legends they feed.
    pub fn sync_inputs(&mut self, inputs: &[FlatInput]) -> Result<FormUpdate, FormError> {
        let values = self.get_values_from_inputs(inputs);
        let mut changed = Vec::new();
        for id in self.tree.node_ids() {
            let (name, key) = match self.tree.get(id) {
                Some(node) if node.input => match (&node.name, &node.key) {
                    (Some(name), Some(key)) => (name.clone(), key.clone()),
                    _ => continue,
                },
                _ => continue,
            };
            if !inputs.iter().any(|input| names_control(&input.name, &name)) {
                continue;
            }
            let current = get_by_path(&values, &key, false)?.filter(|value| !value.is_null()).cloned();
            let node = self.tree.node_mut(id)?;
            if node.value != current {
                node.value = current;
                node.default_value = false;
                changed.push(id);
            }
        }

        let mut update = FormUpdate::default();
        for id in changed {
            if let Some(hooks) = self.hooks_for(id) {
                hooks.on_change(self.tree.node(id)?);
            }
            update.extend(self.refresh_legends(id)?);
        }
        if !update.is_empty() {
            log::debug!("Input sync re-rendered {} element(s)", update.patches.len());
        }
        Ok(update)
    }

    pub fn for_each_node<F: FnMut(NodeId, &TreeNode)>(&self, callback: F) {
        self.tree.for_each_node(callback);
    }

    /// Find a node by concrete key, input name or DOM id
    pub fn find_node(&self, reference: &str) -> Option<NodeId> {
        self.tree
            .find_by_key(reference)
            .or_else(|| self.tree.find_by_name(reference))
            .or_else(|| self.tree.find_by_dom_id(reference))
    }

    /// Store a new value for the input named `name`
    ///
    /// Runs the widget's `on_change` hook and re-renders the array items
    /// whose legend shows this value.
    pub fn set_field_value(&mut self, name: &str, value: Value) -> Result<FormUpdate, FormError> {
        let id = self
            .tree
            .find_by_name(name)
            .ok_or_else(|| FormError::Render(format!("no input named '{}'", name)))?;
        {
            let node = self.tree.node_mut(id)?;
            node.value = if value.is_null() { None } else { Some(value) };
            node.default_value = false;
        }
        if let Some(hooks) = self.hooks_for(id) {
            hooks.on_change(self.tree.node(id)?);
        }
        self.refresh_legends(id)
    }

    fn refresh_legends(&mut self, source: NodeId) -> Result<FormUpdate, FormError> {
        let mut items = Vec::new();
        let tree = &self.tree;
        tree.for_each_node(|id, node| {
            if node.legend_child == Some(source)
                && node.layout.legend.is_some()
                && (id == source || tree.is_descendant(source, id))
            {
                items.push(id);
            }
        });

        let mut update = FormUpdate::default();
        for item in items {
            let (parent, array_path, child_pos) = {
                let node = self.tree.node(item)?;
                (node.parent, node.array_path.clone(), node.child_pos)
            };
            let idx = array_path.last().map(|last| last + 1).unwrap_or(child_pos + 1);
            self.tree.expand_labels(item, idx, None)?;
            if let Some(array) = parent {
                update.extend(self.item_update(array, child_pos)?);
            }
        }
        Ok(update)
    }

    /// Insert a blank item at `idx` of an array node
    pub fn insert_array_item(&mut self, array: NodeId, idx: usize) -> Result<FormUpdate, FormError> {
        let len = self.tree.children(array)?.len();
        let boundaries = self.tree.array_boundaries(array)?;
        if !boundaries.allows_insert(len) {
            return Err(FormError::ArrayLimit(format!(
                "{} already holds the maximum of {} items",
                self.describe(array),
                boundaries.max_items
            )));
        }

        let appended = self.tree.insert_array_item(array, idx)?;
        let idx = idx.min(len);

        let mut update = FormUpdate::default();
        for pos in idx..len {
            update.extend(self.item_update(array, pos)?);
        }
        let container_id = format!("{}-items", self.dom_id(array)?);
        update.patches.push(RenderPatch::Append {
            container_id,
            markup: render_array_item(&self.tree, array, len)?,
        });
        update.rendered.extend(self.subtree(appended));

        for id in self.subtree(appended) {
            if let Some(hooks) = self.hooks_for(id) {
                hooks.on_insert(self.tree.node(id)?);
            }
        }
        Ok(update)
    }

    /// Delete the item at `idx` of an array node
    pub fn delete_array_item(&mut self, array: NodeId, idx: usize) -> Result<FormUpdate, FormError> {
        let children = self.tree.children(array)?;
        let boundaries = self.tree.array_boundaries(array)?;
        if !boundaries.allows_delete(children.len()) {
            return Err(FormError::ArrayLimit(format!(
                "{} already holds the minimum of {} items",
                self.describe(array),
                boundaries.min_items
            )));
        }
        let last = match children.last() {
            Some(last) => item_dom_id(&self.tree, *last)?,
            None => return Err(FormError::ArrayLimit(format!("{} holds no items", self.describe(array)))),
        };

        self.tree.delete_array_item(array, idx)?;
        let new_len = children.len() - 1;

        let mut update = FormUpdate::default();
        for pos in idx..new_len {
            update.extend(self.item_update(array, pos)?);
        }
        update.patches.push(RenderPatch::Remove { dom_id: last });
        Ok(update)
    }

    /// Tightest `minItems`/`maxItems` applying to an array node
    pub fn array_boundaries(&mut self, array: NodeId) -> Result<ArrayBoundaries, FormError> {
        self.tree.array_boundaries(array)
    }

    /// Move the item at `from` to `to`
    pub fn move_array_item(&mut self, array: NodeId, from: usize, to: usize) -> Result<FormUpdate, FormError> {
        self.tree.move_array_item(array, from, to)?;
        let mut update = FormUpdate::default();
        for pos in from.min(to)..=from.max(to) {
            update.extend(self.item_update(array, pos)?);
        }
        Ok(update)
    }

    /// Run the validator (when enabled) and display the errors
    pub fn validate(&mut self, suppress_display: bool) -> Result<ValidationOutcome, FormError> {
        let values = self.get_values()?;
        let errors = match (&self.validator, self.descriptor.validate) {
            (Some(validator), true) => {
                let report = validator.validate(&self.descriptor.schema, &values);
                let mut errors: Vec<ValidationError> = report
                    .errors
                    .into_iter()
                    .map(|error| ValidationError {
                        key: normalize_error_key(&error.key),
                        message: error.message,
                    })
                    .collect();
                if !report.valid && errors.is_empty() {
                    errors.push(ValidationError {
                        key: String::new(),
                        message: "The form is invalid".to_string(),
                    });
                }
                errors
            }
            _ => Vec::new(),
        };

        if !suppress_display {
            self.display_errors(&errors)?;
        }
        Ok(ValidationOutcome { errors, values })
    }

    fn display_errors(&mut self, errors: &[ValidationError]) -> Result<(), FormError> {
        if let Some(display) = self.error_display.as_mut() {
            display(errors);
            return Ok(());
        }

        let mut changed = Vec::new();
        for id in self.tree.node_ids() {
            let node = self.tree.node(id)?;
            let message = node
                .key
                .as_deref()
                .and_then(|key| errors.iter().find(|error| error.key == key))
                .map(|error| error.message.clone());
            if node.error != message {
                self.tree.node_mut(id)?.error = message;
                changed.push(id);
            }
        }
        for error in errors {
            if !error.key.is_empty() && self.tree.find_by_key(&error.key).is_none() {
                log::debug!("No field for validation error on '{}': {}", error.key, error.message);
            }
        }

        for id in changed {
            let patch = RenderPatch::Replace {
                dom_id: outer_dom_id(&self.tree, id)?,
                markup: render_node(&self.tree, id)?,
            };
            self.pending_update.patches.push(patch);
            self.pending_update.rendered.extend(self.subtree(id));
        }
        Ok(())
    }

    /// Submit the form; `false` when anything blocked it
    pub fn submit(&mut self) -> Result<bool, FormError> {
        Ok(self.try_submit()?.is_submitted())
    }

    /// Run the submit pipeline, stopping at the first veto
    pub fn try_submit(&mut self) -> Result<SubmitOutcome, FormError> {
        let hooked: Vec<(NodeId, Rc<dyn WidgetHooks>)> = self
            .tree
            .node_ids()
            .into_iter()
            .filter_map(|id| self.hooks_for(id).map(|hooks| (id, hooks)))
            .collect();

        for (id, hooks) in &hooked {
            if hooks.is_pending(self.tree.node(*id)?) {
                log::info!("Submit blocked, {:?} is still pending", id);
                return Ok(SubmitOutcome::Pending(*id));
            }
        }
        for (id, hooks) in &hooked {
            if !hooks.on_submit(self.tree.node(*id)?) {
                log::info!("Submit vetoed by widget on {:?}", id);
                return Ok(SubmitOutcome::VetoedByWidget(*id));
            }
        }

        let ValidationOutcome { errors, values } = self.validate(false)?;
        if let Some(callback) = self.on_submit.as_mut() {
            callback(errors.as_slice(), &values);
        }
        if !errors.is_empty() {
            log::info!("Submit blocked by {} validation error(s)", errors.len());
            return Ok(SubmitOutcome::Invalid(errors));
        }
        if let Some(callback) = self.on_submit_valid.as_mut() {
            if !callback(&values) {
                return Ok(SubmitOutcome::VetoedByHost);
            }
        }
        Ok(SubmitOutcome::Submitted(values))
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn hooks_for(&self, id: NodeId) -> Option<Rc<dyn WidgetHooks>> {
        let node = self.tree.get(id)?;
        self.registry.get(&node.widget).and_then(|view| view.hooks.clone())
    }

    fn run_after_render(&self, ids: &[NodeId]) {
        for id in ids {
            if let (Some(hooks), Some(node)) = (self.hooks_for(*id), self.tree.get(*id)) {
                hooks.on_after_render(node);
            }
        }
    }

    fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut ids = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.tree.get(current) {
                ids.push(current);
                stack.extend(node.children.iter().rev());
            }
        }
        ids
    }

    fn item_update(&self, array: NodeId, pos: usize) -> Result<FormUpdate, FormError> {
        let item = *self
            .tree
            .node(array)?
            .children
            .get(pos)
            .ok_or_else(|| FormError::Render(format!("array {:?} has no item {}", array, pos)))?;
        Ok(FormUpdate {
            patches: vec![RenderPatch::Replace {
                dom_id: item_dom_id(&self.tree, item)?,
                markup: render_array_item(&self.tree, array, pos)?,
            }],
            rendered: self.subtree(item),
        })
    }

    fn dom_id(&self, id: NodeId) -> Result<String, FormError> {
        self.tree
            .node(id)?
            .id
            .clone()
            .ok_or_else(|| FormError::Render(format!("node {:?} has no DOM id", id)))
    }

    fn describe(&self, array: NodeId) -> String {
        self.tree
            .get(array)
            .and_then(|node| node.key.clone().or_else(|| node.id.clone()))
            .unwrap_or_else(|| format!("{:?}", array))
    }
}

/// `control` is the input `name` itself or one of its `name[i]` options
fn names_control(control: &str, name: &str) -> bool {
    match control.strip_prefix(name) {
        Some("") => true,
        Some(rest) => rest.starts_with('[') && rest.ends_with(']') && !rest[1..].contains('.'),
        None => false,
    }
}

/// Turn a JSON pointer (`#/friends/0/name`) into a concrete key (`friends[0].name`)
///
/// Keys already in dotted form pass through unchanged.
pub fn normalize_error_key(key: &str) -> String {
    let pointer = key.rsplit('#').next().unwrap_or(key);
    if !pointer.starts_with('/') {
        return key.to_string();
    }
    let mut out = String::new();
    for part in pointer.split('/').skip(1) {
        let part = part.replace("~1", "/").replace("~0", "~");
        if !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()) {
            out.push_str(&format!("[{}]", part));
        } else {
            if !out.is_empty() {
                out.push('.');
            }
            out.push_str(&part);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use serde_json::json;

    fn session(descriptor: Value) -> FormSession {
        FormSession::initialize(FormDescriptor::from_value(descriptor).unwrap()).unwrap()
    }

    fn friends() -> FormSession {
        session(json!({
            "schema": {"properties": {"friends": {
                "type": "array",
                "maxItems": 3,
                "items": {"type": "object", "properties": {"name": {"type": "string", "title": "Name"}}}
            }}},
            "form": [{"key": "friends", "items": [{"key": "friends[].name", "legend": "{{value}}"}]}],
            "value": {"friends": [{"name": "Ann"}, {"name": "Bob"}]},
            "prefix": "f"
        }))
    }

    #[test]
    fn test_normalize_error_key() {
        assert_eq!(normalize_error_key("#/friends/0/name"), "friends[0].name");
        assert_eq!(normalize_error_key("urn:x#/a/b"), "a.b");
        assert_eq!(normalize_error_key("a.b[1]"), "a.b[1]");
    }

    #[test]
    fn test_insert_patches_shift_then_append() {
        let mut form = friends();
        let array = form.find_node("friends").unwrap();
        let update = form.insert_array_item(array, 0).unwrap();
        assert_eq!(update.patches.len(), 3);
        assert!(matches!(&update.patches[0], RenderPatch::Replace { dom_id, .. } if dom_id == "f-elt-friends[0]---name-li"));
        assert!(matches!(&update.patches[2], RenderPatch::Append { container_id, .. } if container_id == "f-elt-friends-items"));
        let values = form.get_values().unwrap();
        assert_eq!(values["friends"][1]["name"], json!("Ann"));
        assert_eq!(values["friends"][2]["name"], json!("Bob"));
    }

    #[test]
    fn test_insert_past_max_items_rejected() {
        let mut form = friends();
        let array = form.find_node("friends").unwrap();
        form.insert_array_item(array, 2).unwrap();
        let err = form.insert_array_item(array, 3).unwrap_err();
        assert!(matches!(err, FormError::ArrayLimit(_)));
    }

    #[test]
    fn test_delete_removes_last_wrapper() {
        let mut form = friends();
        let array = form.find_node("friends").unwrap();
        let update = form.delete_array_item(array, 0).unwrap();
        assert_eq!(
            update.patches.last(),
            Some(&RenderPatch::Remove { dom_id: "f-elt-friends[1]---name-li".to_string() })
        );
        assert_eq!(form.get_values().unwrap(), json!({"friends": [{"name": "Bob"}]}));
    }

    #[test]
    fn test_submit_pipeline_order() {
        let mut form = session(json!({
            "schema": {"properties": {"name": {"type": "string"}}},
            "value": {"name": "x"}
        }));
        let log = Rc::new(RefCell::new(Vec::new()));

        let seen = Rc::clone(&log);
        form.set_validator(move |_schema: &Value, values: &Value| {
            seen.borrow_mut().push("validate".to_string());
            if values["name"] == json!("x") {
                ValidationReport::invalid(vec![ValidationError {
                    key: "#/name".into(),
                    message: "too short".into(),
                }])
            } else {
                ValidationReport::valid()
            }
        });
        let seen = Rc::clone(&log);
        form.set_on_submit(move |errors, _values| seen.borrow_mut().push(format!("submit {}", errors.len())));
        let seen = Rc::clone(&log);
        form.set_on_submit_valid(move |_values| {
            seen.borrow_mut().push("valid".to_string());
            true
        });

        let outcome = form.try_submit().unwrap();
        assert!(matches!(outcome, SubmitOutcome::Invalid(ref errors) if errors[0].key == "name"));
        assert_eq!(*log.borrow(), vec!["validate", "submit 1"]);
        let name = form.find_node("name").unwrap();
        assert_eq!(form.tree().node(name).unwrap().error.as_deref(), Some("too short"));
        assert_eq!(form.take_pending_update().patches.len(), 1);

        form.set_field_value("name", json!("longer")).unwrap();
        assert!(form.submit().unwrap());
        assert_eq!(*log.borrow(), vec!["validate", "submit 1", "validate", "submit 0", "valid"]);
        assert!(form.tree().node(name).unwrap().error.is_none());
    }

    #[test]
    fn test_validation_disabled_by_descriptor() {
        let mut form = session(json!({
            "schema": {"properties": {"name": {"type": "string"}}},
            "validate": false
        }));
        form.set_validator(|_: &Value, _: &Value| ValidationReport::invalid(Vec::new()));
        assert!(form.validate(true).unwrap().errors.is_empty());
    }
}
