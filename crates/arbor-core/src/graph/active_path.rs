//! Focused node tracking.

use super::index::GraphIndex;
use super::state::{Effect, GraphState, SaveMode};
use serde::{Deserialize, Serialize};

/// Root-to-active ancestor chain, used for highlighting and scoping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivePath {
    pub node_ids: Vec<String>,
    pub edge_ids: Vec<String>,
}

impl ActivePath {
    pub fn contains_node(&self, node_id: &str) -> bool {
        self.node_ids.iter().any(|id| id == node_id)
    }

    pub fn contains_edge(&self, edge_id: &str) -> bool {
        self.edge_ids.iter().any(|id| id == edge_id)
    }
}

impl GraphState {
    /// Focuses `node_id`, or clears focus with `None`.
    ///
    /// An id that is not in the graph leaves the state untouched.
    pub fn set_active(&mut self, node_id: Option<&str>) -> Vec<Effect> {
        match node_id {
            None => {
                self.active_node_id = None;
                self.active_path = ActivePath::default();
            }
            Some(id) if self.contains(id) => {
                self.active_node_id = Some(id.to_string());
                self.refresh_active_path();
            }
            Some(id) => {
                tracing::warn!(node_id = id, "[ActivePath] Cannot activate unknown node");
                return Vec::new();
            }
        }
        vec![Effect::Persist(SaveMode::Debounced)]
    }

    /// Recomputes the derived path from `active_node_id`, clearing a
    /// dangling active id.
    pub fn refresh_active_path(&mut self) {
        let Some(active) = self.active_node_id.clone() else {
            self.active_path = ActivePath::default();
            return;
        };
        if !self.contains(&active) {
            self.active_node_id = None;
            self.active_path = ActivePath::default();
            return;
        }

        let index = GraphIndex::build(&self.edges);
        let (node_ids, edge_ids) = index.ancestry(&active);
        self.active_path = ActivePath {
            node_ids: node_ids.into_iter().map(str::to_string).collect(),
            edge_ids: edge_ids.into_iter().map(str::to_string).collect(),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::model::{Edge, Node, Position};

    fn chain() -> GraphState {
        let mut state = GraphState::new();
        state.nodes.push(Node::new("a", "A", Position::default()));
        state.nodes.push(Node::new("b", "B", Position::default()));
        state.edges = vec![Edge::connecting("root", "a"), Edge::connecting("a", "b")];
        state
    }

    #[test]
    fn test_set_active_computes_path() {
        let mut state = chain();
        let effects = state.set_active(Some("b"));
        assert_eq!(effects, vec![Effect::Persist(SaveMode::Debounced)]);
        assert_eq!(state.active_node_id.as_deref(), Some("b"));
        assert_eq!(state.active_path.node_ids, vec!["root", "a", "b"]);
        assert_eq!(state.active_path.edge_ids, vec!["e-root-a", "e-a-b"]);
        assert!(state.active_path.contains_edge("e-a-b"));
    }

    #[test]
    fn test_set_active_none_clears() {
        let mut state = chain();
        state.set_active(Some("b"));
        let effects = state.set_active(None);
        assert_eq!(effects.len(), 1);
        assert!(state.active_node_id.is_none());
        assert_eq!(state.active_path, ActivePath::default());
    }

    #[test]
    fn test_set_active_unknown_is_noop() {
        let mut state = chain();
        state.set_active(Some("a"));
        assert!(state.set_active(Some("ghost")).is_empty());
        assert_eq!(state.active_node_id.as_deref(), Some("a"));
    }

    #[test]
    fn test_refresh_clears_dangling_active() {
        let mut state = chain();
        state.active_node_id = Some("ghost".to_string());
        state.refresh_active_path();
        assert!(state.active_node_id.is_none());
    }
}
