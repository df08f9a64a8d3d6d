//! JSON Form WASM Module
//!
//! Builds HTML forms from a JSON Schema plus a layout description, keeps
//! a tree of form nodes synchronized with the rendered controls, and reads
//! schema-shaped values back out of them.

pub mod errors;
pub mod utils;
pub mod models;
pub mod template;
pub mod schema;
pub mod widgets;
pub mod tree;
pub mod resolve;
pub mod extract;
pub mod renderers;
pub mod session;
pub mod api;

// Re-export commonly used types
pub use errors::{FormError, PathError};
pub use extract::{extract_values, ExtractionHints, FlatInput, RawInput};
pub use models::{FormDescriptor, LayoutElement, LayoutItem};
pub use renderers::{Presenter, RenderPatch};
pub use session::{
    FormSession, FormUpdate, SubmitOutcome, ValidationError, ValidationOutcome, ValidationReport, Validator,
};
pub use tree::{ArrayBoundaries, FormTree, NodeId, TreeNode};
pub use widgets::{InputShape, WidgetHooks, WidgetRegistry, WidgetSpec};
pub use api::JsonForm;

use wasm_bindgen::prelude::*;

// This is like the `main` function, but for WASM modules.
#[wasm_bindgen(start)]
pub fn main() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();

    #[cfg(feature = "console_log")]
    {
        if console_log::init_with_level(log::Level::Debug).is_err() {
            crate::wasm_warn!("Logger already initialized");
        }
    }

    log::info!("JSON Form WASM module initialized");
}
