//! Configuration tree
//!
//! An arena of named nodes addressed by `NodeId`. Each node carries an
//! ordered value mapping, ordered children, a non-owning parent link and a
//! tri-state multiplex flag. Trees are built by the loader, combined by the
//! merge engine and pruned by the filter engine; enumeration never mutates
//! them.

mod merge;

pub use merge::Control;

use serde_yaml::Value;

/// Index of a node inside its [`Tree`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

/// Tri-state multiplex flag.
///
/// `Unset` is the default and is distinct from `Disabled`: a later document
/// can use `Disabled` to cancel an earlier `Enabled`, while `Unset` leaves
/// whatever was merged before untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Multiplex {
    #[default]
    Unset,
    Enabled,
    Disabled,
}

/// One key/value pair of a node, with optional source-locator provenance
/// (populated only in debug mode).
#[derive(Debug, Clone, PartialEq)]
pub struct ValueEntry {
    pub key: String,
    pub value: Value,
    pub origin: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Node {
    name: String,
    values: Vec<ValueEntry>,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
    multiplex: Multiplex,
    controls: Vec<Control>,
}

/// A configuration tree.
///
/// Nodes live in an arena; detached nodes stay in the arena but are
/// unreachable from the root. Sibling names are unique (the merge engine
/// resolves collisions by name, never by duplicating), and the root is named
/// `""`.
#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl Tree {
    /// Create a tree holding only an empty-named root.
    pub fn new() -> Self {
        let root = Node {
            name: String::new(),
            ..Node::default()
        };
        Self {
            nodes: vec![root],
            root: NodeId(0),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub(crate) fn set_root(&mut self, id: NodeId) {
        self.root = id;
    }

    fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0 as usize]
    }

    /// Allocate an orphan node. The caller attaches it (or makes it root).
    pub fn alloc(&mut self, name: impl Into<String>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            name: name.into(),
            ..Node::default()
        });
        id
    }

    pub fn name(&self, id: NodeId) -> &str {
        &self.node(id).name
    }

    pub(crate) fn rename(&mut self, id: NodeId, name: impl Into<String>) {
        self.node_mut(id).name = name.into();
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    pub fn is_leaf(&self, id: NodeId) -> bool {
        self.node(id).children.is_empty()
    }

    pub fn multiplex(&self, id: NodeId) -> Multiplex {
        self.node(id).multiplex
    }

    pub fn set_multiplex(&mut self, id: NodeId, flag: Multiplex) {
        self.node_mut(id).multiplex = flag;
    }

    pub fn values(&self, id: NodeId) -> &[ValueEntry] {
        &self.node(id).values
    }

    pub fn get_value(&self, id: NodeId, key: &str) -> Option<&Value> {
        self.node(id)
            .values
            .iter()
            .find(|e| e.key == key)
            .map(|e| &e.value)
    }

    /// Insert or overwrite a value. Overwriting keeps the key's original
    /// position so insertion order stays visible.
    pub fn set_value(
        &mut self,
        id: NodeId,
        key: impl Into<String>,
        value: Value,
        origin: Option<String>,
    ) {
        let key = key.into();
        let node = self.node_mut(id);
        if let Some(entry) = node.values.iter_mut().find(|e| e.key == key) {
            entry.value = value;
            entry.origin = origin;
        } else {
            node.values.push(ValueEntry { key, value, origin });
        }
    }

    /// Delete a value by key. Returns whether the key existed.
    pub fn remove_value(&mut self, id: NodeId, key: &str) -> bool {
        let node = self.node_mut(id);
        let before = node.values.len();
        node.values.retain(|e| e.key != key);
        node.values.len() != before
    }

    pub(crate) fn push_control(&mut self, id: NodeId, control: Control) {
        self.node_mut(id).controls.push(control);
    }

    pub(crate) fn controls(&self, id: NodeId) -> &[Control] {
        &self.node(id).controls
    }

    pub(crate) fn take_controls(&mut self, id: NodeId) -> Vec<Control> {
        std::mem::take(&mut self.node_mut(id).controls)
    }

    pub(crate) fn extend_controls(&mut self, id: NodeId, controls: Vec<Control>) {
        self.node_mut(id).controls.extend(controls);
    }

    pub fn child_by_name(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.node(parent)
            .children
            .iter()
            .copied()
            .find(|&c| self.node(c).name == name)
    }

    /// Attach an orphan node as the last child of `parent`.
    pub fn attach(&mut self, parent: NodeId, child: NodeId) {
        self.node_mut(child).parent = Some(parent);
        self.node_mut(parent).children.push(child);
    }

    /// Attach `child`, merging it into an existing same-named sibling
    /// instead of creating a duplicate.
    pub fn attach_or_merge(&mut self, parent: NodeId, child: NodeId) {
        let name = self.node(child).name.clone();
        match self.child_by_name(parent, &name) {
            Some(existing) if existing != child => {
                let sub = self.extract_subtree(child);
                self.merge_from(existing, &sub, sub.root());
            }
            _ => self.attach(parent, child),
        }
    }

    /// Remove a node (and its whole subtree) from its parent's children.
    /// The nodes stay in the arena but become unreachable.
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.node(id).parent {
            self.node_mut(parent).children.retain(|&c| c != id);
        }
        self.node_mut(id).parent = None;
    }

    /// Slash-joined name chain from the root. The root's path is `""`, its
    /// children live at `/<name>`.
    pub fn path(&self, id: NodeId) -> String {
        match self.node(id).parent {
            Some(parent) => format!("{}/{}", self.path(parent), self.node(id).name),
            None => self.node(id).name.clone(),
        }
    }

    /// Preorder over all descendants of `id` (not including `id` itself).
    pub fn preorder(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.node(id).children.iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.node(next).children.iter().rev().copied());
        }
        out
    }

    /// Look a node up by path without creating anything.
    pub fn find_node(&self, path: &str) -> Option<NodeId> {
        let mut cur = self.root;
        for seg in path.split('/').filter(|s| !s.is_empty()) {
            cur = self.child_by_name(cur, seg)?;
        }
        Some(cur)
    }

    /// Look a node up by path, creating missing nodes along the way.
    /// Infallible: path segments are slash-separated, empty segments are
    /// ignored, so `""`, `"/"` and `"//"` all address the root.
    pub fn ensure_node(&mut self, path: &str) -> NodeId {
        let mut cur = self.root;
        for seg in path.split('/').filter(|s| !s.is_empty()) {
            cur = match self.child_by_name(cur, seg) {
                Some(child) => child,
                None => {
                    let child = self.alloc(seg);
                    self.attach(cur, child);
                    child
                }
            };
        }
        cur
    }

    /// Look a node up by path, creating missing intermediate nodes when
    /// `create` is set.
    pub fn get_node(&mut self, path: &str, create: bool) -> Option<NodeId> {
        if create {
            Some(self.ensure_node(path))
        } else {
            self.find_node(path)
        }
    }

    /// A tree is empty when it holds nothing but a bare root.
    pub fn is_empty(&self) -> bool {
        self.node(self.root).children.is_empty() && self.node(self.root).values.is_empty()
    }

    /// Insert a new root above the current one.
    pub fn wrap_root(&mut self, name: impl Into<String>) {
        let old = self.root;
        let new = self.alloc(name);
        self.attach(new, old);
        self.root = new;
    }

    /// Deep-copy the subtree rooted at `id` into a fresh tree.
    pub(crate) fn extract_subtree(&self, id: NodeId) -> Tree {
        let mut tree = Tree::new();
        let root = tree.root();
        tree.rename(root, self.node(id).name.clone());
        self.copy_into(id, &mut tree, root);
        tree
    }

    fn copy_into(&self, src: NodeId, dst_tree: &mut Tree, dst: NodeId) {
        let node = self.node(src);
        dst_tree.node_mut(dst).values = node.values.clone();
        dst_tree.node_mut(dst).multiplex = node.multiplex;
        dst_tree.node_mut(dst).controls = node.controls.clone();
        for &child in &node.children {
            let copy = dst_tree.alloc(self.node(child).name.clone());
            dst_tree.attach(dst, copy);
            self.copy_into(child, dst_tree, copy);
        }
    }
}
