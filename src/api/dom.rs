//! Browser presentation substrate
//!
//! Implements [`Presenter`] on top of `web-sys` elements.

use wasm_bindgen::{JsCast, JsValue};
use web_sys::{Document, Element, HtmlInputElement, HtmlOptionElement, HtmlSelectElement, HtmlTextAreaElement};

use crate::api::helpers::describe_js_error;
use crate::errors::FormError;
use crate::extract::{FlatInput, RawInput};
use crate::renderers::Presenter;

/// Presenter writing into the page's DOM
#[derive(Debug, Clone)]
pub struct DomPresenter {
    document: Document,
}

impl DomPresenter {
    /// Presenter for the current window's document
    pub fn new() -> Result<Self, FormError> {
        let document = web_sys::window()
            .and_then(|window| window.document())
            .ok_or_else(|| FormError::Render("no document available".to_string()))?;
        Ok(Self { document })
    }

    /// Element with the given id anywhere in the document
    pub fn element_by_id(&self, id: &str) -> Option<Element> {
        self.document.get_element_by_id(id)
    }

    /// Current `(name, raw value)` of every named control below `root`
    ///
    /// Unchecked checkboxes report `false`. A radio group with nothing
    /// checked reports an empty string. File inputs are left out.
    pub fn collect_inputs(&self, root: &Element) -> Result<Vec<FlatInput>, FormError> {
        let controls = root
            .query_selector_all("input[name], select[name], textarea[name]")
            .map_err(|e| js_error("collect inputs", e))?;
        let mut inputs = Vec::new();
        let mut radio_groups: Vec<(String, bool)> = Vec::new();

        for index in 0..controls.length() {
            let control = match controls.item(index) {
                Some(control) => control,
                None => continue,
            };
            if let Some(input) = control.dyn_ref::<HtmlInputElement>() {
                let name = input.name();
                match input.type_().as_str() {
                    "file" | "submit" | "button" | "reset" | "image" => {}
                    "checkbox" => inputs.push(if input.checked() {
                        FlatInput::text(name, input.value())
                    } else {
                        FlatInput::flag(name, false)
                    }),
                    "radio" => {
                        let checked = input.checked();
                        if checked {
                            inputs.push(FlatInput::text(name.clone(), input.value()));
                        }
                        match radio_groups.iter_mut().find(|(group, _)| *group == name) {
                            Some((_, any)) => *any |= checked,
                            None => radio_groups.push((name, checked)),
                        }
                    }
                    _ => inputs.push(FlatInput::text(name, input.value())),
                }
            } else if let Some(select) = control.dyn_ref::<HtmlSelectElement>() {
                if select.multiple() {
                    let selected = select.selected_options();
                    let items = (0..selected.length())
                        .filter_map(|pos| selected.item(pos))
                        .filter_map(|option| option.dyn_into::<HtmlOptionElement>().ok())
                        .map(|option| serde_json::Value::String(option.value()))
                        .collect();
                    inputs.push(FlatInput {
                        name: select.name(),
                        value: RawInput::List(items),
                    });
                } else {
                    inputs.push(FlatInput::text(select.name(), select.value()));
                }
            } else if let Some(area) = control.dyn_ref::<HtmlTextAreaElement>() {
                inputs.push(FlatInput::text(area.name(), area.value()));
            }
        }

        for (name, any) in radio_groups {
            if !any {
                inputs.push(FlatInput::text(name, ""));
            }
        }
        Ok(inputs)
    }
}

fn js_error(context: &str, value: JsValue) -> FormError {
    FormError::Render(format!("{}: {}", context, describe_js_error(&value)))
}

impl Presenter for DomPresenter {
    type Handle = Element;

    fn mount(&mut self, markup: &str, parent: &Element, index: Option<usize>) -> Result<Element, FormError> {
        let children = parent.children();
        let anchor = index.and_then(|index| children.item(index as u32));
        let first = match &anchor {
            Some(anchor) => {
                let position = index.unwrap_or(0) as u32;
                anchor
                    .insert_adjacent_html("beforebegin", markup)
                    .map_err(|e| js_error("mount", e))?;
                position
            }
            None => {
                let position = children.length();
                parent
                    .insert_adjacent_html("beforeend", markup)
                    .map_err(|e| js_error("mount", e))?;
                position
            }
        };
        // Markup without elements leaves nothing to hand back but the parent
        Ok(parent.children().item(first).unwrap_or_else(|| parent.clone()))
    }

    fn query(&self, root: &Element, selector: &str) -> Option<Element> {
        root.query_selector(selector).ok().flatten()
    }

    fn replace(&mut self, target: &Element, markup: &str) -> Result<(), FormError> {
        target.set_outer_html(markup);
        Ok(())
    }

    fn remove(&mut self, target: &Element) -> Result<(), FormError> {
        target.remove();
        Ok(())
    }
}
