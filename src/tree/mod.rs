//! Form tree
//!
//! Nodes live in an arena owned by [`FormTree`] and refer to each other by
//! [`NodeId`]. Children are owned through the parent's `children` list; the
//! `parent` link is a plain index and never followed by clone or reset.
//! Layout elements and schema nodes are shared (`Rc`) between every node
//! spawned from the same array item template and never written to after the
//! build.
//!
//! - [`builder`] turns a descriptor into nodes
//! - [`values`] computes initial values and reads values back out
//! - [`array`] inserts, deletes and reorders array items

pub mod array;
pub mod builder;
pub mod values;

use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Serialize;
use serde_json::{Map, Value};

use crate::errors::FormError;
use crate::extract::ExtractionHints;
use crate::models::{FieldOption, LabelProp, LayoutElement};
use crate::widgets::WidgetRegistry;

pub use array::ArrayBoundaries;

static FORM_COUNTER: AtomicUsize = AtomicUsize::new(1);

/// Default id prefix for a new form: `jsonform-1`, `jsonform-2`, ...
pub fn next_prefix() -> String {
    format!("jsonform-{}", FORM_COUNTER.fetch_add(1, Ordering::Relaxed))
}

/// Index of a node in its tree's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(pub usize);

/// Templated string properties, expanded per node instance
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Labels {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub legend: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prepend: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub append: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub helpvalue: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inlinetitle: Option<String>,
}

impl Labels {
    pub fn get(&self, prop: LabelProp) -> Option<&str> {
        self.slot(prop).as_deref()
    }

    pub fn set(&mut self, prop: LabelProp, value: Option<String>) {
        *self.slot_mut(prop) = value;
    }

    fn slot(&self, prop: LabelProp) -> &Option<String> {
        match prop {
            LabelProp::Title => &self.title,
            LabelProp::Legend => &self.legend,
            LabelProp::Description => &self.description,
            LabelProp::Prepend => &self.prepend,
            LabelProp::Append => &self.append,
            LabelProp::Placeholder => &self.placeholder,
            LabelProp::Helpvalue => &self.helpvalue,
            LabelProp::Inlinetitle => &self.inlinetitle,
        }
    }

    fn slot_mut(&mut self, prop: LabelProp) -> &mut Option<String> {
        match prop {
            LabelProp::Title => &mut self.title,
            LabelProp::Legend => &mut self.legend,
            LabelProp::Description => &mut self.description,
            LabelProp::Prepend => &mut self.prepend,
            LabelProp::Append => &mut self.append,
            LabelProp::Placeholder => &mut self.placeholder,
            LabelProp::Helpvalue => &mut self.helpvalue,
            LabelProp::Inlinetitle => &mut self.inlinetitle,
        }
    }
}

/// One node of the form tree
#[derive(Debug, Clone)]
pub struct TreeNode {
    /// DOM id of the rendered instance
    pub id: Option<String>,
    /// Concrete key (`friends[1].name`), array path applied
    pub key: Option<String>,
    /// Key normalized for use in class names
    pub keydash: Option<String>,
    /// Input name, array path applied
    pub name: Option<String>,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub child_pos: usize,
    pub array_path: Vec<usize>,
    /// Merged layout element (schema title, name, required folded in)
    pub layout: Rc<LayoutElement>,
    pub schema: Option<Rc<Value>>,
    pub widget: String,
    /// Holds a value
    pub input: bool,
    /// Manages array items
    pub array: bool,
    pub value: Option<Value>,
    /// `value` came from a schema default
    pub default_value: bool,
    /// Pristine item template; shared by every clone of this node
    pub child_template: Option<NodeId>,
    /// Descendant whose value feeds this node's legend
    pub legend_child: Option<NodeId>,
    /// Options as declared, titles not yet expanded
    pub option_source: Rc<Vec<FieldOption>>,
    /// Options with expanded titles
    pub options: Vec<FieldOption>,
    pub labels: Labels,
    pub required: bool,
    pub read_only: bool,
    /// Validation error attached by the default error display
    pub error: Option<String>,
}

impl TreeNode {
    pub fn new(layout: Rc<LayoutElement>, schema: Option<Rc<Value>>, widget: String) -> Self {
        Self {
            id: None,
            key: None,
            keydash: None,
            name: None,
            parent: None,
            children: Vec::new(),
            child_pos: 0,
            array_path: Vec::new(),
            required: layout.required.unwrap_or(false),
            read_only: layout.read_only.unwrap_or(false),
            layout,
            schema,
            widget,
            input: false,
            array: false,
            value: None,
            default_value: false,
            child_template: None,
            legend_child: None,
            option_source: Rc::new(Vec::new()),
            options: Vec::new(),
            labels: Labels::default(),
            error: None,
        }
    }

    /// Generic key from the layout element (`friends[].name`)
    pub fn generic_key(&self) -> Option<&str> {
        self.layout.key.as_deref()
    }

    /// Schema `type` of the bound schema node
    pub fn schema_type(&self) -> Option<&str> {
        self.schema.as_deref().and_then(crate::schema::schema_type)
    }

    /// Shallow copy for a new instance: structure and bindings kept, per-instance state dropped
    fn pristine_copy(&self) -> Self {
        Self {
            id: None,
            key: None,
            keydash: None,
            name: None,
            parent: None,
            children: Vec::new(),
            child_pos: 0,
            array_path: Vec::new(),
            layout: Rc::clone(&self.layout),
            schema: self.schema.clone(),
            widget: self.widget.clone(),
            input: self.input,
            array: self.array,
            value: None,
            default_value: false,
            child_template: self.child_template,
            legend_child: None,
            option_source: Rc::clone(&self.option_source),
            options: Vec::new(),
            labels: Labels::default(),
            required: self.required,
            read_only: self.read_only,
            error: None,
        }
    }
}

/// Arena-backed form tree plus everything needed to (re)compute it
pub struct FormTree {
    nodes: Vec<Option<TreeNode>>,
    /// Vacated arena slots, reused by `alloc`
    free: Vec<usize>,
    root: NodeId,
    /// Normalized, `$ref`-resolved schema
    pub(crate) schema: Rc<Value>,
    /// First layout element registered per generic key
    pub(crate) layouts: HashMap<String, Rc<LayoutElement>>,
    pub(crate) tpldata: Map<String, Value>,
    pub(crate) prefix: String,
    pub(crate) registry: Rc<WidgetRegistry>,
    pub(crate) hints: ExtractionHints,
    pub(crate) non_default_items: Vec<String>,
    pub(crate) field_html_class: Option<String>,
    id_counter: usize,
}

impl std::fmt::Debug for FormTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormTree")
            .field("prefix", &self.prefix)
            .field("root", &self.root)
            .field("nodes", &self.nodes.iter().filter(|n| n.is_some()).count())
            .finish()
    }
}

impl FormTree {
    pub(crate) fn empty(schema: Value, prefix: String, registry: Rc<WidgetRegistry>) -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
            root: NodeId(0),
            schema: Rc::new(schema),
            layouts: HashMap::new(),
            tpldata: Map::new(),
            prefix,
            registry,
            hints: ExtractionHints::default(),
            non_default_items: Vec::new(),
            field_html_class: None,
            id_counter: 0,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn schema(&self) -> &Value {
        &self.schema
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn registry(&self) -> &WidgetRegistry {
        &self.registry
    }

    pub fn hints(&self) -> &ExtractionHints {
        &self.hints
    }

    pub fn get(&self, id: NodeId) -> Option<&TreeNode> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    pub fn node(&self, id: NodeId) -> Result<&TreeNode, FormError> {
        self.get(id).ok_or(FormError::UnknownNode(id))
    }

    pub fn node_mut(&mut self, id: NodeId) -> Result<&mut TreeNode, FormError> {
        self.nodes
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or(FormError::UnknownNode(id))
    }

    pub fn children(&self, id: NodeId) -> Result<Vec<NodeId>, FormError> {
        Ok(self.node(id)?.children.clone())
    }

    pub(crate) fn alloc(&mut self, node: TreeNode) -> NodeId {
        if let Some(slot) = self.free.pop() {
            self.nodes[slot] = Some(node);
            return NodeId(slot);
        }
        self.nodes.push(Some(node));
        NodeId(self.nodes.len() - 1)
    }

    /// Arena slots in use or waiting for reuse
    pub fn slot_count(&self) -> usize {
        self.nodes.len()
    }

    /// Nodes currently allocated, attached or not
    pub fn live_count(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    pub(crate) fn set_root(&mut self, root: NodeId) {
        self.root = root;
    }

    pub(crate) fn next_counter_id(&mut self) -> String {
        self.id_counter += 1;
        format!("{}-elt-counter-{}", self.prefix, self.id_counter)
    }

    /// Attach `child` as the last child of `parent`
    pub(crate) fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), FormError> {
        let pos = self.node(parent)?.children.len();
        {
            let node = self.node_mut(child)?;
            node.parent = Some(parent);
            node.child_pos = pos;
        }
        self.node_mut(parent)?.children.push(child);
        Ok(())
    }

    /// Detach and free `child` and its subtree
    pub(crate) fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), FormError> {
        let children = {
            let node = self.node_mut(parent)?;
            node.children.retain(|c| *c != child);
            node.children.clone()
        };
        for (pos, id) in children.into_iter().enumerate() {
            self.node_mut(id)?.child_pos = pos;
        }
        self.free_subtree(child);
        Ok(())
    }

    /// Free a node and its children; shared child templates are kept
    fn free_subtree(&mut self, id: NodeId) {
        let taken = self.nodes.get_mut(id.0).and_then(Option::take);
        if let Some(node) = taken {
            self.free.push(id.0);
            for child in node.children {
                self.free_subtree(child);
            }
        }
    }

    /// Deep copy of a subtree, unattached, per-instance state dropped
    pub(crate) fn clone_subtree(&mut self, src: NodeId) -> Result<NodeId, FormError> {
        // Nested arrays get their item template on the source, so every copy shares it
        if self.node(src)?.array && self.node(src)?.child_template.is_none() {
            self.child_template(src)?;
        }
        let (copy, children) = {
            let node = self.node(src)?;
            (node.pristine_copy(), node.children.clone())
        };
        let id = self.alloc(copy);
        for child in children {
            let cloned = self.clone_subtree(child)?;
            self.append_child(id, cloned)?;
        }
        Ok(id)
    }

    /// Clear values below `id` and drop nested array items
    pub(crate) fn reset_values(&mut self, id: NodeId) -> Result<(), FormError> {
        let array_path = self.array_path_for(id)?;
        let (is_array, children) = {
            let node = self.node_mut(id)?;
            node.value = None;
            node.default_value = false;
            node.error = None;
            node.legend_child = None;
            node.array_path = array_path;
            (node.array, node.children.clone())
        };
        if is_array {
            for child in children {
                self.free_subtree(child);
            }
            self.node_mut(id)?.children.clear();
        } else {
            for child in children {
                self.reset_values(child)?;
            }
        }
        Ok(())
    }

    /// Parent's array path, plus this node's position if the parent is an array
    pub(crate) fn array_path_for(&self, id: NodeId) -> Result<Vec<usize>, FormError> {
        let node = self.node(id)?;
        match node.parent.and_then(|parent| self.get(parent)) {
            Some(parent) => {
                let mut path = parent.array_path.clone();
                if parent.array {
                    path.push(node.child_pos);
                }
                Ok(path)
            }
            None => Ok(Vec::new()),
        }
    }

    /// Visit every attached node, parents before children
    pub fn for_each_node<F: FnMut(NodeId, &TreeNode)>(&self, mut callback: F) {
        self.walk(self.root, &mut callback);
    }

    fn walk<F: FnMut(NodeId, &TreeNode)>(&self, id: NodeId, callback: &mut F) {
        if let Some(node) = self.get(id) {
            callback(id, node);
            for child in &node.children {
                self.walk(*child, callback);
            }
        }
    }

    /// Attached node ids in document order
    pub fn node_ids(&self) -> Vec<NodeId> {
        let mut ids = Vec::new();
        self.for_each_node(|id, _| ids.push(id));
        ids
    }

    /// Attached node whose concrete key matches
    pub fn find_by_key(&self, key: &str) -> Option<NodeId> {
        self.find(|node| node.key.as_deref() == Some(key))
    }

    /// Attached input node whose name matches
    pub fn find_by_name(&self, name: &str) -> Option<NodeId> {
        self.find(|node| node.input && node.name.as_deref() == Some(name))
    }

    /// Attached node whose DOM id matches
    pub fn find_by_dom_id(&self, dom_id: &str) -> Option<NodeId> {
        self.find(|node| node.id.as_deref() == Some(dom_id))
    }

    fn find<P: Fn(&TreeNode) -> bool>(&self, predicate: P) -> Option<NodeId> {
        let mut found = None;
        self.for_each_node(|id, node| {
            if found.is_none() && predicate(node) {
                found = Some(id);
            }
        });
        found
    }

    /// `id` sits strictly below `ancestor`
    pub fn is_descendant(&self, id: NodeId, ancestor: NodeId) -> bool {
        let mut current = self.get(id).and_then(|node| node.parent);
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.get(parent).and_then(|node| node.parent);
        }
        false
    }

    /// Nearest ancestor (self excluded) that manages array items
    pub fn array_ancestor(&self, id: NodeId) -> Option<NodeId> {
        let mut current = self.get(id)?.parent;
        while let Some(parent) = current {
            let node = self.get(parent)?;
            if node.array {
                return Some(parent);
            }
            current = node.parent;
        }
        None
    }
}
