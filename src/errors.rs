//! Error types for the form engine
//!
//! Build-time problems (a layout that does not match its schema, a malformed
//! path) are fatal and surface as `FormError`. Problems caused by user input
//! are recovered where they happen and only logged.

use thiserror::Error;

use crate::tree::NodeId;

/// Top-level form engine error
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormError {
    /// The layout and the schema do not describe the same form
    #[error("Schema/layout mismatch: {0}")]
    SchemaLayoutMismatch(String),

    /// A layout element names a widget kind nobody registered
    #[error("Unknown widget type '{0}'")]
    UnknownWidget(String),

    /// Malformed dotted/bracketed path
    #[error("Invalid path: {0}")]
    Path(#[from] PathError),

    /// Value or markup template failure
    #[error("Template error: {0}")]
    Template(String),

    /// The form descriptor could not be read
    #[error("Invalid form descriptor: {0}")]
    Descriptor(String),

    /// A node id that is not (or no longer) part of the tree
    #[error("Unknown node {0:?}")]
    UnknownNode(NodeId),

    /// Array mutation rejected by minItems/maxItems
    #[error("Array limit reached: {0}")]
    ArrayLimit(String),

    /// Presentation substrate failure
    #[error("Render error: {0}")]
    Render(String),
}

/// Path parsing errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// A segment matches neither a plain identifier nor `[digits]`
    #[error("malformed segment '{segment}' in path '{path}'")]
    Malformed { path: String, segment: String },

    /// Empty path where a key was required
    #[error("empty path")]
    Empty,
}

impl From<mustache::Error> for FormError {
    fn from(err: mustache::Error) -> Self {
        FormError::Template(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_error_converts_into_form_error() {
        let err: FormError = PathError::Empty.into();
        assert_eq!(err, FormError::Path(PathError::Empty));
        assert_eq!(err.to_string(), "Invalid path: empty path");
    }

    #[test]
    fn test_malformed_message_names_segment() {
        let err = PathError::Malformed {
            path: "a.b[x]".to_string(),
            segment: "b[x]".to_string(),
        };
        assert!(err.to_string().contains("'b[x]'"));
    }
}
