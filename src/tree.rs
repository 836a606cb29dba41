use std::cell::Cell;
use std::fmt;
use std::hash::Hash;
use std::rc::Rc;

use crate::matching;
use crate::{Result, Selector};

/// Callback attached to an element with [`Tree::on`].
pub type Listener<T> = Rc<dyn Fn(&mut T, &Event<<T as Tree>::Node>) -> Result<()>>;

/// What a tree has to offer for behaviors to be bound to its elements.
///
/// Node handles must stay stable across queries: the binder keys its binding
/// records on them.
pub trait Tree: Sized {
    type Node: Copy + Eq + Hash + fmt::Debug;

    /// False once the node has been destroyed. Handles of dead nodes are never
    /// handed out again.
    fn is_alive(&self, node: Self::Node) -> bool;

    fn parent(&self, node: Self::Node) -> Option<Self::Node>;

    /// Child nodes (elements and non-elements) in document order.
    fn children(&self, node: Self::Node) -> &[Self::Node];

    fn is_element(&self, node: Self::Node) -> bool;

    /// Lowercase tag name, `None` for non-element nodes.
    fn tag_name(&self, node: Self::Node) -> Option<&str>;

    fn attr(&self, node: Self::Node, name: &str) -> Option<&str>;

    fn data(&self, node: Self::Node, key: &str) -> Option<String>;

    fn set_data(&mut self, node: Self::Node, key: &str, value: &str) -> Result<()>;

    fn on(&mut self, node: Self::Node, event_type: &str, listener: Listener<Self>) -> Result<()>;

    /// Elements in the subtree rooted at `root`, `root` included, that match
    /// `selector`, in document order.
    fn select(&self, root: Self::Node, selector: &Selector) -> Vec<Self::Node> {
        matching::select(self, root, selector)
    }

    fn matches(&self, node: Self::Node, selector: &Selector) -> bool {
        matching::matches(self, node, selector)
    }
}

/// An event travelling from its target up through the target's ancestors.
#[derive(Debug)]
pub struct Event<N> {
    event_type: String,
    target: N,
    current_target: N,
    propagation_stopped: Cell<bool>,
}

impl<N: Copy> Event<N> {
    pub fn new(event_type: &str, target: N) -> Self {
        Self {
            event_type: event_type.to_string(),
            target,
            current_target: target,
            propagation_stopped: Cell::new(false),
        }
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn target(&self) -> N {
        self.target
    }

    /// The node whose listener is currently running.
    pub fn current_target(&self) -> N {
        self.current_target
    }

    pub fn stop_propagation(&self) {
        self.propagation_stopped.set(true);
    }

    pub fn is_propagation_stopped(&self) -> bool {
        self.propagation_stopped.get()
    }

    pub(crate) fn set_current_target(&mut self, node: N) {
        self.current_target = node;
    }
}
