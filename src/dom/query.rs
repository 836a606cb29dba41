use super::*;
use crate::Selector;

impl Dom {
    pub fn query_selector(&self, selector: &str) -> Result<Option<NodeId>> {
        Ok(self.query_selector_all(selector)?.into_iter().next())
    }

    pub fn query_selector_all(&self, selector: &str) -> Result<Vec<NodeId>> {
        self.query_selector_all_from(self.root, selector)
    }

    /// Matching descendants of `root` in document order. `root` itself is not
    /// a candidate.
    pub fn query_selector_all_from(&self, root: NodeId, selector: &str) -> Result<Vec<NodeId>> {
        self.live_node(root)?;
        let selector = Selector::parse(selector)?;
        Ok(self
            .select(root, &selector)
            .into_iter()
            .filter(|node| *node != root)
            .collect())
    }

    pub fn matches_selector(&self, node_id: NodeId, selector: &str) -> Result<bool> {
        let selector = Selector::parse(selector)?;
        Ok(self.matches(node_id, &selector))
    }

    /// Nearest inclusive ancestor matching `selector`.
    pub fn closest(&self, node_id: NodeId, selector: &str) -> Result<Option<NodeId>> {
        let selector = Selector::parse(selector)?;
        let mut cursor = Some(node_id);
        while let Some(current) = cursor {
            if self.matches(current, &selector) {
                return Ok(Some(current));
            }
            cursor = self.parent(current);
        }
        Ok(None)
    }

    /// First connected element whose `id` attribute equals `id`.
    pub fn by_id(&self, id: &str) -> Option<NodeId> {
        let mut stack = vec![self.root];
        while let Some(current) = stack.pop() {
            if self.attr(current, "id") == Some(id) {
                return Some(current);
            }
            stack.extend(self.children(current).iter().rev().copied());
        }
        None
    }
}
