//! Renderers module for the form engine
//!
//! This module turns a form tree into markup and describes incremental
//! document updates after array mutations and value changes.

pub mod html;
pub mod presenter;

// Re-export commonly used types
pub use html::{item_dom_id, outer_dom_id, render_array_item, render_form, render_node};
pub use presenter::{apply_patches, id_selector, Presenter, RenderPatch};
