//! Utility modules for the form engine
//!
//! This module contains helpers shared by the tree builder, the value
//! resolver and the value extractor.

pub mod path;

// Re-export commonly used helpers
pub use path::{apply_array_path, get_by_path, is_set, parse_path, schema_path_for, set_by_path, Segment};
