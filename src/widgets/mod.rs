//! Widget registry
//!
//! A widget kind is a markup template plus capability flags and optional
//! lifecycle hooks. Kinds are looked up by name; hosts add their own with
//! [`WidgetRegistry::register`].

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use serde_json::{Map, Value};

use crate::errors::FormError;
use crate::template::compile_markup;
use crate::tree::TreeNode;

/// How the controls rendered by a widget serialize into flat inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputShape {
    /// Renders no value-bearing control
    None,
    /// One control whose value is a string
    Scalar,
    /// One checkbox: `"1"` when checked, `false` otherwise
    Checkbox,
    /// One checkbox per option, named `name[i]`
    CheckboxGroup,
    /// One control carrying a list of values
    Tags,
}

/// Lifecycle callbacks a widget may attach to its nodes
///
/// Every method has a no-op default.
pub trait WidgetHooks {
    /// Adjust the template context right before markup generation
    fn on_before_render(&self, _context: &mut Map<String, Value>, _node: &TreeNode) {}

    /// Called once the node's markup is attached to the presentation substrate
    fn on_after_render(&self, _node: &TreeNode) {}

    /// Called when the node was created by an array insertion
    fn on_insert(&self, _node: &TreeNode) {}

    /// Called after the node's value changed
    fn on_change(&self, _node: &TreeNode) {}

    /// Submit-time check; `false` vetoes the submission
    fn on_submit(&self, _node: &TreeNode) -> bool {
        true
    }

    /// `true` while an asynchronous precondition (an upload, say) is unfinished
    fn is_pending(&self, _node: &TreeNode) -> bool {
        false
    }
}

/// A registered, compiled widget kind
#[derive(Clone)]
pub struct WidgetView {
    pub kind: String,
    pub template: Rc<mustache::Template>,
    /// Wrapper rendered around each array item
    pub item_template: Option<Rc<mustache::Template>>,
    /// Holds a value
    pub input: bool,
    /// Manages a list of item subtrees
    pub array: bool,
    /// Wrapped in the shared field template (label, description, errors)
    pub field_template: bool,
    pub shape: InputShape,
    /// `type` attribute for text-like inputs
    pub input_type: Option<String>,
    pub hooks: Option<Rc<dyn WidgetHooks>>,
}

impl fmt::Debug for WidgetView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WidgetView")
            .field("kind", &self.kind)
            .field("input", &self.input)
            .field("array", &self.array)
            .field("field_template", &self.field_template)
            .field("shape", &self.shape)
            .field("input_type", &self.input_type)
            .field("hooks", &self.hooks.is_some())
            .finish()
    }
}

/// Uncompiled widget definition, built fluently then registered
pub struct WidgetSpec {
    kind: String,
    template: String,
    item_template: Option<String>,
    input: bool,
    array: bool,
    field_template: bool,
    shape: InputShape,
    input_type: Option<String>,
    hooks: Option<Rc<dyn WidgetHooks>>,
}

impl WidgetSpec {
    pub fn new<K: Into<String>, T: Into<String>>(kind: K, template: T) -> Self {
        Self {
            kind: kind.into(),
            template: template.into(),
            item_template: None,
            input: false,
            array: false,
            field_template: false,
            shape: InputShape::None,
            input_type: None,
            hooks: None,
        }
    }

    /// Value-holding control of the given shape
    pub fn input(mut self, shape: InputShape) -> Self {
        self.input = true;
        self.shape = shape;
        self
    }

    /// Array container with a per-item wrapper template
    pub fn array<T: Into<String>>(mut self, item_template: T) -> Self {
        self.array = true;
        self.item_template = Some(item_template.into());
        self
    }

    pub fn field_template(mut self) -> Self {
        self.field_template = true;
        self
    }

    pub fn input_type<T: Into<String>>(mut self, input_type: T) -> Self {
        self.input_type = Some(input_type.into());
        self
    }

    pub fn hooks(mut self, hooks: Rc<dyn WidgetHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    fn compile(self) -> Result<WidgetView, FormError> {
        let item_template = match &self.item_template {
            Some(source) => Some(Rc::new(compile_markup(source)?)),
            None => None,
        };
        Ok(WidgetView {
            template: Rc::new(compile_markup(&self.template)?),
            item_template,
            kind: self.kind,
            input: self.input,
            array: self.array,
            field_template: self.field_template,
            shape: self.shape,
            input_type: self.input_type,
            hooks: self.hooks,
        })
    }
}

const TEXT_LIKE: [&str; 11] = [
    "text",
    "password",
    "email",
    "url",
    "date",
    "datetime-local",
    "time",
    "number",
    "range",
    "color",
    "hidden",
];

/// Lookup table of widget kinds
#[derive(Clone)]
pub struct WidgetRegistry {
    views: HashMap<String, WidgetView>,
    field: Rc<mustache::Template>,
}

impl fmt::Debug for WidgetRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<&String> = self.views.keys().collect();
        kinds.sort();
        f.debug_struct("WidgetRegistry").field("kinds", &kinds).finish()
    }
}

impl WidgetRegistry {
    /// Registry holding every built-in widget kind
    pub fn with_builtins() -> Result<Self, FormError> {
        let mut registry = Self {
            views: HashMap::new(),
            field: Rc::new(compile_markup(include_str!("templates/field.mustache"))?),
        };

        let containers = [
            ("root", include_str!("templates/root.mustache")),
            ("fieldset", include_str!("templates/fieldset.mustache")),
            ("section", include_str!("templates/section.mustache")),
            ("actions", include_str!("templates/actions.mustache")),
            ("help", include_str!("templates/help.mustache")),
            ("submit", include_str!("templates/submit.mustache")),
            ("button", include_str!("templates/button.mustache")),
        ];
        for (kind, template) in containers {
            registry.register(WidgetSpec::new(kind, template))?;
        }

        registry.register(
            WidgetSpec::new("array", include_str!("templates/array.mustache"))
                .array(include_str!("templates/array_item.mustache"))
                .field_template(),
        )?;
        registry.register(
            WidgetSpec::new("tabarray", include_str!("templates/tabarray.mustache"))
                .array(include_str!("templates/tabarray_item.mustache"))
                .field_template(),
        )?;

        for kind in TEXT_LIKE {
            let mut spec = WidgetSpec::new(kind, include_str!("templates/text.mustache"))
                .input(InputShape::Scalar)
                .input_type(kind);
            if kind != "hidden" {
                spec = spec.field_template();
            }
            registry.register(spec)?;
        }

        let inputs = [
            ("textarea", include_str!("templates/textarea.mustache"), InputShape::Scalar),
            ("checkbox", include_str!("templates/checkbox.mustache"), InputShape::Checkbox),
            ("checkboxes", include_str!("templates/checkboxes.mustache"), InputShape::CheckboxGroup),
            ("radios", include_str!("templates/radios.mustache"), InputShape::Scalar),
            ("select", include_str!("templates/select.mustache"), InputShape::Scalar),
            ("tagsinput", include_str!("templates/tagsinput.mustache"), InputShape::Tags),
        ];
        for (kind, template, shape) in inputs {
            registry.register(WidgetSpec::new(kind, template).input(shape).field_template())?;
        }

        Ok(registry)
    }

    /// Compile and register a widget kind, replacing any kind of the same name
    pub fn register(&mut self, spec: WidgetSpec) -> Result<(), FormError> {
        let view = spec.compile()?;
        log::debug!("Registered widget '{}'", view.kind);
        self.views.insert(view.kind.clone(), view);
        Ok(())
    }

    pub fn get(&self, kind: &str) -> Option<&WidgetView> {
        self.views.get(kind)
    }

    /// Like [`get`](Self::get), failing with `UnknownWidget`
    pub fn view(&self, kind: &str) -> Result<&WidgetView, FormError> {
        self.views
            .get(kind)
            .ok_or_else(|| FormError::UnknownWidget(kind.to_string()))
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.views.contains_key(kind)
    }

    /// Shared wrapper around input controls
    pub fn field(&self) -> &mustache::Template {
        &self.field
    }

    pub fn is_input(&self, kind: &str) -> bool {
        self.get(kind).map(|view| view.input).unwrap_or(false)
    }

    pub fn is_array(&self, kind: &str) -> bool {
        self.get(kind).map(|view| view.array).unwrap_or(false)
    }
}
