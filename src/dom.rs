use std::collections::HashMap;
use std::fmt;

use crate::html;
use crate::tree::Listener;
use crate::{Error, Result, Tree};

mod attributes;
mod events;
mod query;
mod tree_mutation;

/// Handle to a node of a [`Dom`]. Handles are never reused, even after the
/// node is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub(crate) enum NodeType {
    Document,
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) node_type: NodeType,
    pub(crate) alive: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct Element {
    pub(crate) tag_name: String,
    pub(crate) attrs: HashMap<String, String>,
}

/// In-memory element tree: an arena of nodes addressed by [`NodeId`].
///
/// Ids are never reused. Removing a subtree drops its content and listeners,
/// but each destroyed node keeps an empty slot in the arena, so a `Dom` that
/// keeps replacing content grows by one small slot per node ever created.
pub struct Dom {
    pub(crate) nodes: Vec<Node>,
    pub(crate) root: NodeId,
    pub(crate) listeners: HashMap<NodeId, HashMap<String, Vec<Listener<Dom>>>>,
}

impl Default for Dom {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Dom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dom")
            .field("nodes", &self.nodes.len())
            .field("listeners", &self.listeners.len())
            .field("html", &self.inner_html(self.root).unwrap_or_default())
            .finish()
    }
}

impl Dom {
    pub fn new() -> Self {
        let root = Node {
            parent: None,
            children: Vec::new(),
            node_type: NodeType::Document,
            alive: true,
        };
        Self {
            nodes: vec![root],
            root: NodeId(0),
            listeners: HashMap::new(),
        }
    }

    /// Parses `html` into the document of a fresh tree.
    pub fn parse(html: &str) -> Result<Self> {
        let mut dom = Self::new();
        let root = dom.root;
        html::parse_into(&mut dom, root, html)?;
        Ok(dom)
    }

    pub fn document(&self) -> NodeId {
        self.root
    }

    fn create_node(&mut self, parent: Option<NodeId>, node_type: NodeType) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            parent,
            children: Vec::new(),
            node_type,
            alive: true,
        });
        if let Some(parent_id) = parent {
            self.nodes[parent_id.0].children.push(id);
        }
        id
    }

    /// Creates a detached element; attach it with [`Dom::append_child`].
    pub fn create_element(&mut self, tag_name: &str) -> NodeId {
        self.create_element_with_attrs(None, tag_name, HashMap::new())
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.create_node(None, NodeType::Text(text.to_string()))
    }

    pub(crate) fn create_element_with_attrs(
        &mut self,
        parent: Option<NodeId>,
        tag_name: &str,
        attrs: HashMap<String, String>,
    ) -> NodeId {
        let element = Element {
            tag_name: tag_name.to_ascii_lowercase(),
            attrs,
        };
        self.create_node(parent, NodeType::Element(element))
    }

    pub(crate) fn append_text(&mut self, parent: NodeId, text: String) -> NodeId {
        self.create_node(Some(parent), NodeType::Text(text))
    }

    fn node(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(node_id.0).filter(|node| node.alive)
    }

    pub(crate) fn live_node(&self, node_id: NodeId) -> Result<&Node> {
        self.node(node_id)
            .ok_or_else(|| Error::NodeNotFound(node_id.to_string()))
    }

    pub(crate) fn element(&self, node_id: NodeId) -> Option<&Element> {
        match &self.node(node_id)?.node_type {
            NodeType::Element(element) => Some(element),
            _ => None,
        }
    }

    pub(crate) fn element_mut(&mut self, node_id: NodeId) -> Result<&mut Element> {
        match self.nodes.get_mut(node_id.0) {
            Some(Node {
                alive: true,
                node_type: NodeType::Element(element),
                ..
            }) => Ok(element),
            _ => Err(Error::NodeNotFound(format!("{node_id} is not a live element"))),
        }
    }

    pub fn is_alive(&self, node_id: NodeId) -> bool {
        self.node(node_id).is_some()
    }

    /// Whether the node can be reached from the document.
    pub fn is_connected(&self, node_id: NodeId) -> bool {
        let mut cursor = Some(node_id);
        while let Some(node) = cursor {
            if node == self.root {
                return true;
            }
            cursor = self.parent(node);
        }
        false
    }

    pub fn parent(&self, node_id: NodeId) -> Option<NodeId> {
        self.node(node_id)?.parent
    }

    pub fn children(&self, node_id: NodeId) -> &[NodeId] {
        self.node(node_id)
            .map(|node| node.children.as_slice())
            .unwrap_or_default()
    }

    pub fn tag_name(&self, node_id: NodeId) -> Option<&str> {
        self.element(node_id).map(|element| element.tag_name.as_str())
    }

    pub fn text_content(&self, node_id: NodeId) -> String {
        let mut out = String::new();
        let mut stack = vec![node_id];
        while let Some(current) = stack.pop() {
            let Some(node) = self.node(current) else {
                continue;
            };
            match &node.node_type {
                NodeType::Text(text) => out.push_str(text),
                NodeType::Document | NodeType::Element(_) => {
                    stack.extend(node.children.iter().rev().copied());
                }
            }
        }
        out
    }

    pub fn set_text_content(&mut self, node_id: NodeId, value: &str) -> Result<()> {
        self.clear_children(node_id)?;
        if !value.is_empty() {
            self.append_text(node_id, value.to_string());
        }
        Ok(())
    }

    pub fn inner_html(&self, node_id: NodeId) -> Result<String> {
        let node = self.live_node(node_id)?;
        let mut out = String::new();
        for child in &node.children {
            html::serialize_node(self, *child, &mut out);
        }
        Ok(out)
    }

    pub fn outer_html(&self, node_id: NodeId) -> Result<String> {
        if self.element(node_id).is_none() {
            return Err(Error::NodeNotFound(format!("{node_id} is not a live element")));
        }
        let mut out = String::new();
        html::serialize_node(self, node_id, &mut out);
        Ok(out)
    }

    /// Replaces the children of `node_id` with the parsed `html`. The old
    /// children are destroyed.
    pub fn set_inner_html(&mut self, node_id: NodeId, html: &str) -> Result<Vec<NodeId>> {
        self.clear_children(node_id)?;
        html::parse_into(self, node_id, html)
    }

    /// Appends the parsed `html` to `parent` and returns the inserted
    /// top-level nodes.
    pub fn append_html(&mut self, parent: NodeId, html: &str) -> Result<Vec<NodeId>> {
        html::parse_into(self, parent, html)
    }
}

impl Tree for Dom {
    type Node = NodeId;

    fn is_alive(&self, node: NodeId) -> bool {
        Dom::is_alive(self, node)
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        Dom::parent(self, node)
    }

    fn children(&self, node: NodeId) -> &[NodeId] {
        Dom::children(self, node)
    }

    fn is_element(&self, node: NodeId) -> bool {
        self.element(node).is_some()
    }

    fn tag_name(&self, node: NodeId) -> Option<&str> {
        Dom::tag_name(self, node)
    }

    fn attr(&self, node: NodeId, name: &str) -> Option<&str> {
        Dom::attr(self, node, name)
    }

    fn data(&self, node: NodeId, key: &str) -> Option<String> {
        Dom::data(self, node, key)
    }

    fn set_data(&mut self, node: NodeId, key: &str, value: &str) -> Result<()> {
        Dom::set_data(self, node, key, value)
    }

    fn on(&mut self, node: NodeId, event_type: &str, listener: Listener<Self>) -> Result<()> {
        self.add_listener(node, event_type, listener)
    }
}
