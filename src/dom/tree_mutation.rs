use super::*;

impl Dom {
    fn can_have_children(&self, node_id: NodeId) -> bool {
        matches!(
            self.node(node_id).map(|node| &node.node_type),
            Some(NodeType::Document | NodeType::Element(_))
        )
    }

    fn check_insertion(&self, parent: NodeId, child: NodeId) -> Result<()> {
        self.live_node(parent)?;
        let node = self.live_node(child)?;
        if !self.can_have_children(parent) {
            return Err(Error::TreeMutation(format!("{parent} cannot have children")));
        }
        if matches!(node.node_type, NodeType::Document) {
            return Err(Error::TreeMutation("the document cannot be inserted".into()));
        }
        let mut cursor = Some(parent);
        while let Some(current) = cursor {
            if current == child {
                return Err(Error::TreeMutation(format!(
                    "inserting {child} into {parent} would create a cycle"
                )));
            }
            cursor = self.parent(current);
        }
        Ok(())
    }

    fn detach(&mut self, node_id: NodeId) {
        if let Some(parent) = self.nodes[node_id.0].parent.take() {
            self.nodes[parent.0].children.retain(|child| *child != node_id);
        }
    }

    /// Moves `child` (with its subtree) to the end of `parent`'s children.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        self.check_insertion(parent, child)?;
        self.detach(child);
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
        Ok(())
    }

    pub fn insert_before(&mut self, parent: NodeId, child: NodeId, reference: NodeId) -> Result<()> {
        self.check_insertion(parent, child)?;
        if child == reference {
            return Ok(());
        }
        if self.parent(reference) != Some(parent) {
            return Err(Error::TreeMutation(format!(
                "{reference} is not a child of {parent}"
            )));
        }
        self.detach(child);
        let index = self.nodes[parent.0]
            .children
            .iter()
            .position(|id| *id == reference)
            .ok_or_else(|| Error::TreeMutation(format!("{reference} is not a child of {parent}")))?;
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.insert(index, child);
        Ok(())
    }

    /// Detaches `node_id` and destroys it together with its whole subtree.
    /// Destroyed handles stay dead forever.
    pub fn remove(&mut self, node_id: NodeId) -> Result<()> {
        self.live_node(node_id)?;
        if node_id == self.root {
            return Err(Error::TreeMutation("the document cannot be removed".into()));
        }
        self.detach(node_id);
        self.destroy_subtree(node_id);
        Ok(())
    }

    pub(crate) fn clear_children(&mut self, node_id: NodeId) -> Result<()> {
        self.live_node(node_id)?;
        let children = std::mem::take(&mut self.nodes[node_id.0].children);
        for child in children {
            self.nodes[child.0].parent = None;
            self.destroy_subtree(child);
        }
        Ok(())
    }

    /// Marks the subtree dead and drops its payload. The arena slots stay
    /// behind as empty tombstones so that ids are never reused.
    fn destroy_subtree(&mut self, node_id: NodeId) {
        let mut stack = vec![node_id];
        while let Some(current) = stack.pop() {
            let node = &mut self.nodes[current.0];
            node.alive = false;
            node.parent = None;
            node.node_type = NodeType::Text(String::new());
            stack.extend(std::mem::take(&mut node.children));
            self.listeners.remove(&current);
        }
    }
}
