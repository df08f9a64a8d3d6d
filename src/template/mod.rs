//! Template expansion
//!
//! Two independent engines: [`value`] stamps labels and default values
//! (no escaping), [`markup`] renders widget HTML through Mustache (escaping).

pub mod markup;
pub mod value;

pub use markup::{compile_markup, escape_selector, render_markup, slugify};
pub use value::{expand, render_value_template, rewrite_value_markers, truthy, GetValueFn, TemplateContext};
