//! The `JsonForm` class
//!
//! Wraps a [`FormSession`] for JavaScript. Once `render` mounted the form,
//! every mutation applies its patches to the page before returning them,
//! and every read or mutation first pulls what the user typed into the tree.

use js_sys::Function;
use serde::Serialize;
use serde_json::Value;
use wasm_bindgen::prelude::*;
use web_sys::Element;

use crate::api::dom::DomPresenter;
use crate::api::helpers::{describe_js_error, deserialize, form_error, serialize, validation_error};
use crate::extract::FlatInput;
use crate::models::FormDescriptor;
use crate::session::{FormSession, FormUpdate, ValidationError, ValidationReport, Validator};
use crate::tree::NodeId;
use crate::{wasm_error, wasm_info, wasm_log, wasm_warn};

/// Node snapshot handed to `nodes()`
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NodeSummary {
    node: usize,
    dom_id: Option<String>,
    key: Option<String>,
    name: Option<String>,
    widget: String,
    value: Option<Value>,
    error: Option<String>,
}

/// Validator backed by a JavaScript function `(schema, values) => {valid, errors}`
struct JsValidator(Function);

impl Validator for JsValidator {
    fn validate(&self, schema: &Value, values: &Value) -> ValidationReport {
        let run = || -> Result<ValidationReport, JsValue> {
            let schema = serialize(schema, "Failed to serialize schema")?;
            let values = serialize(values, "Failed to serialize values")?;
            let result = self.0.call2(&JsValue::NULL, &schema, &values)?;
            deserialize(result, "Invalid validator result")
        };
        run().unwrap_or_else(|err| {
            let message = describe_js_error(&err);
            wasm_error!("Validator failed: {}", message);
            ValidationReport::invalid(vec![ValidationError {
                key: String::new(),
                message,
            }])
        })
    }
}

#[wasm_bindgen]
pub struct JsonForm {
    session: FormSession,
    mounted: Option<(DomPresenter, Element)>,
}

#[wasm_bindgen]
impl JsonForm {
    /// Build a form from a descriptor `{schema, form, value, ...}`
    #[wasm_bindgen(constructor)]
    pub fn new(descriptor: JsValue) -> Result<JsonForm, JsValue> {
        let descriptor: FormDescriptor = deserialize(descriptor, "Invalid form descriptor")?;
        let session = FormSession::initialize(descriptor).map_err(|e| form_error("Failed to build form", e))?;
        wasm_info!("Form '{}' ready", session.tree().prefix());
        Ok(JsonForm { session, mounted: None })
    }

    /// Render the form into `element`
    pub fn render(&mut self, element: Element) -> Result<(), JsValue> {
        let mut presenter = DomPresenter::new().map_err(|e| form_error("render", e))?;
        self.session
            .render(&mut presenter, &element)
            .map_err(|e| form_error("render", e))?;
        self.mounted = Some((presenter, element));
        Ok(())
    }

    /// Markup of the whole form, for hosts that insert it themselves
    #[wasm_bindgen(js_name = toHtml)]
    pub fn to_html(&self) -> Result<String, JsValue> {
        self.session.to_markup().map_err(|e| form_error("toHtml", e))
    }

    #[wasm_bindgen(js_name = getValues)]
    pub fn get_values(&mut self) -> Result<JsValue, JsValue> {
        self.sync_from_page()?;
        let values = self.session.get_values().map_err(|e| form_error("getValues", e))?;
        serialize(&values, "Failed to serialize values")
    }

    /// Rebuild values from `[{name, value}]` pairs read off the page
    #[wasm_bindgen(js_name = getValuesFromInputs)]
    pub fn get_values_from_inputs(&self, inputs: JsValue) -> Result<JsValue, JsValue> {
        let inputs: Vec<FlatInput> = deserialize(inputs, "Invalid inputs")?;
        serialize(&self.session.get_values_from_inputs(&inputs), "Failed to serialize values")
    }

    #[wasm_bindgen(js_name = setFieldValue)]
    pub fn set_field_value(&mut self, name: &str, value: JsValue) -> Result<JsValue, JsValue> {
        let value: Value = deserialize(value, "Invalid field value")?;
        self.sync_from_page()?;
        let update = self
            .session
            .set_field_value(name, value)
            .map_err(|e| form_error("setFieldValue", e))?;
        self.apply(&update)?;
        serialize(&update.patches, "Failed to serialize patches")
    }

    #[wasm_bindgen(js_name = insertArrayItem)]
    pub fn insert_array_item(&mut self, array: &str, idx: usize) -> Result<JsValue, JsValue> {
        let id = self.array_node(array)?;
        self.sync_from_page()?;
        let update = self
            .session
            .insert_array_item(id, idx)
            .map_err(|e| form_error("insertArrayItem", e))?;
        self.apply(&update)?;
        serialize(&update.patches, "Failed to serialize patches")
    }

    #[wasm_bindgen(js_name = deleteArrayItem)]
    pub fn delete_array_item(&mut self, array: &str, idx: usize) -> Result<JsValue, JsValue> {
        let id = self.array_node(array)?;
        self.sync_from_page()?;
        let update = self
            .session
            .delete_array_item(id, idx)
            .map_err(|e| form_error("deleteArrayItem", e))?;
        self.apply(&update)?;
        serialize(&update.patches, "Failed to serialize patches")
    }

    #[wasm_bindgen(js_name = moveArrayItem)]
    pub fn move_array_item(&mut self, array: &str, from: usize, to: usize) -> Result<JsValue, JsValue> {
        let id = self.array_node(array)?;
        self.sync_from_page()?;
        let update = self
            .session
            .move_array_item(id, from, to)
            .map_err(|e| form_error("moveArrayItem", e))?;
        self.apply(&update)?;
        serialize(&update.patches, "Failed to serialize patches")
    }

    /// Validate; returns `{errors, values}`
    pub fn validate(&mut self, suppress_display: bool) -> Result<JsValue, JsValue> {
        self.sync_from_page()?;
        let outcome = self
            .session
            .validate(suppress_display)
            .map_err(|e| form_error("validate", e))?;
        self.apply_pending()?;
        serialize(&outcome, "Failed to serialize validation outcome")
    }

    /// Run the submit pipeline; `false` when it was blocked
    pub fn submit(&mut self) -> Result<bool, JsValue> {
        self.sync_from_page()?;
        let outcome = self.session.try_submit().map_err(|e| form_error("submit", e))?;
        self.apply_pending()?;
        wasm_log!("Submit outcome: {:?}", outcome);
        Ok(outcome.is_submitted())
    }

    /// Pull the rendered controls' current values into the form
    #[wasm_bindgen(js_name = syncInputs)]
    pub fn sync_inputs(&mut self) -> Result<(), JsValue> {
        self.sync_from_page()
    }

    #[wasm_bindgen(js_name = setValidator)]
    pub fn set_validator(&mut self, validator: Function) {
        self.session.set_validator(JsValidator(validator));
    }

    /// `callback(errors, values)`, called on every submit after validation
    #[wasm_bindgen(js_name = setOnSubmit)]
    pub fn set_on_submit(&mut self, callback: Function) {
        self.session.set_on_submit(move |errors, values| {
            let args = serialize(&errors, "Failed to serialize errors")
                .and_then(|errors| Ok((errors, serialize(values, "Failed to serialize values")?)));
            match args {
                Ok((errors, values)) => {
                    if let Err(err) = callback.call2(&JsValue::NULL, &errors, &values) {
                        wasm_error!("onSubmit failed: {}", describe_js_error(&err));
                    }
                }
                Err(err) => wasm_error!("onSubmit skipped: {}", describe_js_error(&err)),
            }
        });
    }

    /// `callback(values)`; returning `false` cancels the submission
    #[wasm_bindgen(js_name = setOnSubmitValid)]
    pub fn set_on_submit_valid(&mut self, callback: Function) {
        self.session.set_on_submit_valid(move |values| {
            let result = serialize(values, "Failed to serialize values")
                .and_then(|values| callback.call1(&JsValue::NULL, &values));
            match result {
                Ok(returned) => returned.as_bool() != Some(false),
                Err(err) => {
                    wasm_error!("onSubmitValid failed: {}", describe_js_error(&err));
                    false
                }
            }
        });
    }

    /// `callback(errors)` replaces the built-in error display
    #[wasm_bindgen(js_name = setErrorDisplay)]
    pub fn set_error_display(&mut self, callback: Function) {
        self.session.set_error_display(move |errors| {
            let result = serialize(&errors, "Failed to serialize errors")
                .and_then(|errors| callback.call1(&JsValue::NULL, &errors));
            if let Err(err) = result {
                wasm_error!("Error display failed: {}", describe_js_error(&err));
            }
        });
    }

    /// Snapshot of every node, in document order
    pub fn nodes(&self) -> Result<JsValue, JsValue> {
        let mut summaries = Vec::new();
        self.session.for_each_node(|id, node| {
            summaries.push(NodeSummary {
                node: id.0,
                dom_id: node.id.clone(),
                key: node.key.clone(),
                name: node.name.clone(),
                widget: node.widget.clone(),
                value: node.value.clone(),
                error: node.error.clone(),
            });
        });
        serialize(&summaries, "Failed to serialize nodes")
    }
}

impl JsonForm {
    fn array_node(&self, reference: &str) -> Result<NodeId, JsValue> {
        let id = self
            .session
            .find_node(reference)
            .ok_or_else(|| validation_error(format!("No array node '{}'", reference)))?;
        match self.session.tree().get(id) {
            Some(node) if node.array => Ok(id),
            _ => Err(validation_error(format!("'{}' is not an array", reference))),
        }
    }

    fn sync_from_page(&mut self) -> Result<(), JsValue> {
        let inputs = match &self.mounted {
            Some((presenter, root)) => presenter
                .collect_inputs(root)
                .map_err(|e| form_error("Failed to read the page", e))?,
            None => return Ok(()),
        };
        let update = self
            .session
            .sync_inputs(&inputs)
            .map_err(|e| form_error("Failed to read the page", e))?;
        self.apply(&update)
    }

    fn apply(&mut self, update: &FormUpdate) -> Result<(), JsValue> {
        match &mut self.mounted {
            Some((presenter, root)) => self
                .session
                .apply(presenter, root, update)
                .map_err(|e| form_error("Failed to update the page", e)),
            None => {
                if !update.is_empty() {
                    wasm_warn!("Form not rendered, {} patch(es) left to the host", update.patches.len());
                }
                Ok(())
            }
        }
    }

    fn apply_pending(&mut self) -> Result<(), JsValue> {
        let update = self.session.take_pending_update();
        self.apply(&update)
    }
}
