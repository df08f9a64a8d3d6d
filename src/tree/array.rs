//! Array item mutation
//!
//! Items are never physically reordered. Inserting, deleting and moving
//! shift values between existing slots, so every slot keeps its node (and
//! the DOM element rendered for it); only the last slot is appended or
//! dropped.

use serde::Serialize;
use serde_json::Value;

use super::{FormTree, NodeId};
use crate::errors::FormError;
use crate::utils::path::{generic_key, strip_last_array_level};

/// Item count limits of an array node; `-1` means unconstrained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrayBoundaries {
    pub min_items: i64,
    pub max_items: i64,
}

impl ArrayBoundaries {
    pub const UNCONSTRAINED: ArrayBoundaries = ArrayBoundaries {
        min_items: -1,
        max_items: -1,
    };

    /// Tighten with another contributor: max of minimums, min of maximums
    pub fn combine(self, other: ArrayBoundaries) -> ArrayBoundaries {
        ArrayBoundaries {
            min_items: match (self.min_items, other.min_items) {
                (-1, other) => other,
                (own, -1) => own,
                (own, other) => own.max(other),
            },
            max_items: match (self.max_items, other.max_items) {
                (-1, other) => other,
                (own, -1) => own,
                (own, other) => own.min(other),
            },
        }
    }

    pub fn allows_insert(&self, current: usize) -> bool {
        self.max_items < 0 || (current as i64) < self.max_items
    }

    pub fn allows_delete(&self, current: usize) -> bool {
        self.min_items < 0 || (current as i64) > self.min_items
    }
}

impl FormTree {
    fn expect_array(&self, array: NodeId) -> Result<Vec<NodeId>, FormError> {
        let node = self.node(array)?;
        if !node.array {
            return Err(FormError::UnknownNode(array));
        }
        Ok(node.children.clone())
    }

    /// Insert a blank item at `idx` (clamped to the end); returns the appended node
    pub fn insert_array_item(&mut self, array: NodeId, idx: usize) -> Result<NodeId, FormError> {
        self.expect_array(array)?;
        let template = self.child_template(array)?;
        let appended = self.clone_subtree(template)?;
        self.append_child(array, appended)?;
        self.reset_values(appended)?;

        let children = self.children(array)?;
        let last = children.len() - 1;
        let idx = idx.min(last);
        for pos in (idx..last).rev() {
            self.move_values_to(children[pos], children[pos + 1])?;
        }

        let slot = children[idx];
        self.reset_values(slot)?;
        let top = self.node(slot)?.array_path.len();
        self.compute_initial_values(slot, None, false, top)?;
        log::debug!("Inserted array item {} into {:?}", idx, array);
        Ok(appended)
    }

    /// Delete the item at `idx`; later items shift down one slot
    pub fn delete_array_item(&mut self, array: NodeId, idx: usize) -> Result<(), FormError> {
        let children = self.expect_array(array)?;
        if idx >= children.len() {
            return Err(FormError::ArrayLimit(format!(
                "no item {} to delete, array holds {}",
                idx,
                children.len()
            )));
        }
        for pos in idx..children.len() - 1 {
            self.move_values_to(children[pos + 1], children[pos])?;
        }
        let last = children[children.len() - 1];
        self.remove_child(array, last)?;
        log::debug!("Deleted array item {} from {:?}", idx, array);
        Ok(())
    }

    /// Move the item at `from` to `to`, shifting the items in between
    pub fn move_array_item(&mut self, array: NodeId, from: usize, to: usize) -> Result<(), FormError> {
        let children = self.expect_array(array)?;
        if from >= children.len() || to >= children.len() {
            return Err(FormError::ArrayLimit(format!(
                "cannot move item {} to {}, array holds {}",
                from,
                to,
                children.len()
            )));
        }
        if from < to {
            for pos in from..to {
                self.switch_values_with(children[pos], children[pos + 1])?;
            }
        } else {
            for pos in (to..from).rev() {
                self.switch_values_with(children[pos], children[pos + 1])?;
            }
        }
        Ok(())
    }

    /// Replace the values of `target` with those of `source`
    pub fn move_values_to(&mut self, source: NodeId, target: NodeId) -> Result<(), FormError> {
        let target_path = self.node(target)?.array_path.clone();
        let values = self.get_form_values(source, Some(&target_path))?;
        self.reset_values(target)?;
        self.compute_initial_values(target, Some(&values), true, 0)
    }

    /// Exchange the values of two subtrees
    pub fn switch_values_with(&mut self, first: NodeId, second: NodeId) -> Result<(), FormError> {
        let first_path = self.node(first)?.array_path.clone();
        let second_path = self.node(second)?.array_path.clone();
        let first_values = self.get_form_values(first, Some(&second_path))?;
        let second_values = self.get_form_values(second, Some(&first_path))?;

        self.reset_values(first)?;
        self.compute_initial_values(first, Some(&second_values), true, 0)?;
        self.reset_values(second)?;
        self.compute_initial_values(second, Some(&first_values), true, 0)
    }

    /// Tightest `minItems`/`maxItems` the schema declares for this array
    pub fn array_boundaries(&mut self, array: NodeId) -> Result<ArrayBoundaries, FormError> {
        if !self.node(array)?.array {
            return Ok(ArrayBoundaries::UNCONSTRAINED);
        }
        if let Some(key) = self.node(array)?.generic_key() {
            return Ok(self.schema_boundaries(&generic_key(key)));
        }
        let template = self.child_template(array)?;
        Ok(self.template_boundaries(template))
    }

    fn template_boundaries(&self, id: NodeId) -> ArrayBoundaries {
        let node = match self.get(id) {
            Some(node) => node,
            None => return ArrayBoundaries::UNCONSTRAINED,
        };
        if node.array {
            // A nested array level has limits of its own
            return ArrayBoundaries::UNCONSTRAINED;
        }
        match node.generic_key() {
            Some(key) => self.schema_boundaries(&strip_last_array_level(&generic_key(key))),
            None => node
                .children
                .iter()
                .map(|child| self.template_boundaries(*child))
                .fold(ArrayBoundaries::UNCONSTRAINED, ArrayBoundaries::combine),
        }
    }

    fn schema_boundaries(&self, key: &str) -> ArrayBoundaries {
        let node = match crate::schema::schema_node_for_key(&self.schema, key) {
            Ok(Some(node)) => node,
            _ => return ArrayBoundaries::UNCONSTRAINED,
        };
        let bound = |primary: &str, fallback: &str| {
            node.get(primary)
                .or_else(|| node.get(fallback))
                .and_then(Value::as_i64)
                .filter(|limit| *limit > 0)
                .unwrap_or(-1)
        };
        ArrayBoundaries {
            min_items: bound("minItems", "minLength"),
            max_items: bound("maxItems", "maxLength"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::models::FormDescriptor;
    use crate::widgets::WidgetRegistry;
    use serde_json::json;

    fn build(descriptor: Value) -> FormTree {
        let registry = Rc::new(WidgetRegistry::with_builtins().unwrap());
        FormTree::build(&FormDescriptor::from_value(descriptor).unwrap(), registry).unwrap()
    }

    fn letters() -> FormTree {
        build(json!({
            "schema": {"properties": {"letters": {"type": "array", "items": {"type": "string", "default": "new"}}}},
            "value": {"letters": ["A", "B", "C"]}
        }))
    }

    fn values(tree: &FormTree) -> Value {
        tree.get_form_values(tree.root(), None).unwrap()
    }

    #[test]
    fn test_combine_boundaries() {
        let a = ArrayBoundaries { min_items: 2, max_items: -1 };
        let b = ArrayBoundaries { min_items: 3, max_items: 5 };
        assert_eq!(a.combine(b), ArrayBoundaries { min_items: 3, max_items: 5 });
        assert_eq!(ArrayBoundaries::UNCONSTRAINED.combine(a), a);
    }

    #[test]
    fn test_insert_shifts_values_down() {
        let mut tree = letters();
        let array = tree.find_by_key("letters").unwrap();
        tree.insert_array_item(array, 1).unwrap();
        assert_eq!(values(&tree), json!({"letters": ["A", "new", "B", "C"]}));
    }

    #[test]
    fn test_delete_shifts_values_up() {
        let mut tree = letters();
        let array = tree.find_by_key("letters").unwrap();
        let before = tree.children(array).unwrap();
        tree.delete_array_item(array, 1).unwrap();
        assert_eq!(values(&tree), json!({"letters": ["A", "C"]}));
        assert_eq!(tree.children(array).unwrap(), before[..2].to_vec());
    }

    #[test]
    fn test_move_item() {
        let mut tree = letters();
        let array = tree.find_by_key("letters").unwrap();
        tree.move_array_item(array, 0, 2).unwrap();
        assert_eq!(values(&tree), json!({"letters": ["B", "C", "A"]}));
        tree.move_array_item(array, 2, 0).unwrap();
        assert_eq!(values(&tree), json!({"letters": ["A", "B", "C"]}));
    }

    #[test]
    fn test_keyed_array_boundaries() {
        let mut tree = build(json!({
            "schema": {"properties": {"list": {"type": "array", "minItems": 1, "maxItems": 4, "items": {"type": "string"}}}}
        }));
        let array = tree.find_by_key("list").unwrap();
        assert_eq!(
            tree.array_boundaries(array).unwrap(),
            ArrayBoundaries { min_items: 1, max_items: 4 }
        );
    }
}
