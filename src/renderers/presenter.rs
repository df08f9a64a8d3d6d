//! Presentation substrate seam
//!
//! The engine never touches a document directly. It hands markup to a
//! [`Presenter`] and describes incremental updates as [`RenderPatch`]es,
//! which a host can apply itself or pass to [`apply_patches`].

use serde::Serialize;

use crate::errors::FormError;
use crate::template::escape_selector;

/// Minimal document operations the engine needs
pub trait Presenter {
    /// Reference to a mounted element
    type Handle: Clone;

    /// Parse `markup` and insert it under `parent`, before the child at
    /// `index` or at the end. Returns the first inserted element.
    fn mount(&mut self, markup: &str, parent: &Self::Handle, index: Option<usize>)
        -> Result<Self::Handle, FormError>;

    /// First element below `root` matching a CSS selector
    fn query(&self, root: &Self::Handle, selector: &str) -> Option<Self::Handle>;

    /// Swap `target` for the element(s) parsed from `markup`
    fn replace(&mut self, target: &Self::Handle, markup: &str) -> Result<(), FormError>;

    fn remove(&mut self, target: &Self::Handle) -> Result<(), FormError>;
}

/// One incremental document update
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum RenderPatch {
    /// Re-render the element with this id
    #[serde(rename_all = "camelCase")]
    Replace { dom_id: String, markup: String },
    /// Add markup at the end of a container
    #[serde(rename_all = "camelCase")]
    Append { container_id: String, markup: String },
    #[serde(rename_all = "camelCase")]
    Remove { dom_id: String },
}

/// CSS selector for an element id
pub fn id_selector(dom_id: &str) -> String {
    format!("#{}", escape_selector(dom_id))
}

/// Apply patches in order below `root`
///
/// A patch whose target is not in the document is skipped with a warning;
/// the next full render brings the document back in line.
pub fn apply_patches<P: Presenter>(
    presenter: &mut P,
    root: &P::Handle,
    patches: &[RenderPatch],
) -> Result<(), FormError> {
    for patch in patches {
        match patch {
            RenderPatch::Replace { dom_id, markup } => match presenter.query(root, &id_selector(dom_id)) {
                Some(target) => presenter.replace(&target, markup)?,
                None => log::warn!("Replace target '{}' not found", dom_id),
            },
            RenderPatch::Append { container_id, markup } => {
                match presenter.query(root, &id_selector(container_id)) {
                    Some(container) => {
                        presenter.mount(markup, &container, None)?;
                    }
                    None => log::warn!("Append container '{}' not found", container_id),
                }
            }
            RenderPatch::Remove { dom_id } => match presenter.query(root, &id_selector(dom_id)) {
                Some(target) => presenter.remove(&target)?,
                None => log::warn!("Remove target '{}' not found", dom_id),
            },
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Records the operations it receives; every selector resolves
    #[derive(Default)]
    struct Recorder {
        ops: Vec<String>,
    }

    impl Presenter for Recorder {
        type Handle = String;

        fn mount(&mut self, markup: &str, parent: &String, _index: Option<usize>) -> Result<String, FormError> {
            self.ops.push(format!("mount {} {}", parent, markup));
            Ok(parent.clone())
        }

        fn query(&self, _root: &String, selector: &str) -> Option<String> {
            Some(selector.to_string())
        }

        fn replace(&mut self, target: &String, markup: &str) -> Result<(), FormError> {
            self.ops.push(format!("replace {} {}", target, markup));
            Ok(())
        }

        fn remove(&mut self, target: &String) -> Result<(), FormError> {
            self.ops.push(format!("remove {}", target));
            Ok(())
        }
    }

    #[test]
    fn test_patches_applied_in_order() {
        let mut recorder = Recorder::default();
        let patches = vec![
            RenderPatch::Replace { dom_id: "a[0]-li".into(), markup: "<li/>".into() },
            RenderPatch::Append { container_id: "a-items".into(), markup: "<li/>".into() },
            RenderPatch::Remove { dom_id: "b".into() },
        ];
        apply_patches(&mut recorder, &"root".to_string(), &patches).unwrap();
        assert_eq!(
            recorder.ops,
            vec![
                "replace #a\\[0\\]-li <li/>".to_string(),
                "mount #a-items <li/>".to_string(),
                "remove #b".to_string(),
            ]
        );
    }

    #[test]
    fn test_patch_serialization() {
        let patch = RenderPatch::Append { container_id: "x-items".into(), markup: "<li/>".into() };
        assert_eq!(
            serde_json::to_value(&patch).unwrap(),
            json!({"op": "append", "containerId": "x-items", "markup": "<li/>"})
        );
    }
}
