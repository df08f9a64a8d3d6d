//! Models module for the form engine
//!
//! This module contains the serde data models read from the host page:
//! the form descriptor and the layout elements it lists.

pub mod descriptor;
pub mod layout;
pub mod serde_helpers;

// Re-export commonly used types
pub use descriptor::{default_layout, FormDescriptor, FormParams};
pub use layout::{value_to_key, FieldOption, LabelProp, LayoutElement, LayoutItem, OptionItem, TitleMap};
