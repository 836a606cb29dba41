use super::*;
use crate::tree::Event;

impl Dom {
    pub fn add_listener(
        &mut self,
        node_id: NodeId,
        event_type: &str,
        listener: Listener<Dom>,
    ) -> Result<()> {
        self.live_node(node_id)?;
        self.listeners
            .entry(node_id)
            .or_default()
            .entry(event_type.to_string())
            .or_default()
            .push(listener);
        Ok(())
    }

    pub fn listener_count(&self, node_id: NodeId, event_type: &str) -> usize {
        self.listeners
            .get(&node_id)
            .and_then(|events| events.get(event_type))
            .map_or(0, Vec::len)
    }

    /// Runs the listeners of `target`, then of each ancestor up to the
    /// document, until one of them stops propagation. The first listener
    /// error aborts the dispatch.
    pub fn dispatch(&mut self, target: NodeId, event_type: &str) -> Result<()> {
        self.live_node(target)?;

        let mut path = Vec::new();
        let mut cursor = Some(target);
        while let Some(node) = cursor {
            path.push(node);
            cursor = self.parent(node);
        }

        let mut event = Event::new(event_type, target);
        for node in path {
            // Listeners may add or remove listeners; run the ones registered
            // when this node was reached.
            let listeners = self
                .listeners
                .get(&node)
                .and_then(|events| events.get(event_type))
                .cloned()
                .unwrap_or_default();
            event.set_current_target(node);
            for listener in listeners {
                listener(self, &event)?;
            }
            if event.is_propagation_stopped() {
                break;
            }
        }
        Ok(())
    }
}
