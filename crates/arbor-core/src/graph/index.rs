//! Path resolution over the edge list.
//!
//! [`GraphIndex`] is built once per query from the edge list and answers
//! parent/children lookups without rescanning edges per hop.

use super::message::Message;
use super::model::{Edge, Node};
use std::collections::{HashMap, HashSet, VecDeque};

/// Parent and children lookups derived from an edge list.
#[derive(Debug, Default)]
pub struct GraphIndex<'a> {
    /// target → (source, edge id)
    parents: HashMap<&'a str, (&'a str, &'a str)>,
    /// source → targets, in edge order
    children: HashMap<&'a str, Vec<&'a str>>,
    /// Nodes that have more than one incoming edge.
    conflicts: Vec<&'a str>,
}

impl<'a> GraphIndex<'a> {
    /// Builds the index in one pass over `edges`.
    ///
    /// When a node has several incoming edges the tree invariant is broken.
    /// The last edge encountered wins and the node is recorded in
    /// [`GraphIndex::conflicts`].
    pub fn build(edges: &'a [Edge]) -> Self {
        let mut index = GraphIndex::default();
        for edge in edges {
            let previous = index
                .parents
                .insert(edge.target.as_str(), (edge.source.as_str(), edge.id.as_str()));
            if previous.is_some() && !index.conflicts.contains(&edge.target.as_str()) {
                index.conflicts.push(edge.target.as_str());
            }
            index
                .children
                .entry(edge.source.as_str())
                .or_default()
                .push(edge.target.as_str());
        }
        if !index.conflicts.is_empty() {
            tracing::warn!(
                conflicts = ?index.conflicts,
                "[GraphIndex] Nodes with multiple incoming edges; last edge wins"
            );
        }
        index
    }

    /// Returns the parent node id and the connecting edge id.
    pub fn parent(&self, node_id: &str) -> Option<(&'a str, &'a str)> {
        self.parents.get(node_id).copied()
    }

    pub fn children(&self, node_id: &str) -> &[&'a str] {
        self.children
            .get(node_id)
            .map(|c| c.as_slice())
            .unwrap_or(&[])
    }

    pub fn conflicts(&self) -> &[&'a str] {
        &self.conflicts
    }

    /// Walks parent links from `target_id` back to the first node without an
    /// incoming edge. Returns node ids and edge ids, both root-first.
    ///
    /// Malformed data containing a cycle stops the walk at the first repeat.
    pub fn ancestry(&self, target_id: &'a str) -> (Vec<&'a str>, Vec<&'a str>) {
        let mut node_ids = VecDeque::from([target_id]);
        let mut edge_ids = VecDeque::new();
        let mut visited = HashSet::from([target_id]);
        let mut current = target_id;

        while let Some((source, edge_id)) = self.parent(current) {
            if !visited.insert(source) {
                tracing::warn!(node_id = source, "[GraphIndex] Cycle detected in ancestry walk");
                break;
            }
            node_ids.push_front(source);
            edge_ids.push_front(edge_id);
            current = source;
        }

        (node_ids.into(), edge_ids.into())
    }

    /// Collects every strict descendant of `node_id` breadth-first.
    pub fn descendants(&self, node_id: &str) -> Vec<String> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut result = Vec::new();
        let mut queue: VecDeque<&str> = self.children(node_id).iter().copied().collect();

        while let Some(current) = queue.pop_front() {
            if current == node_id || !seen.insert(current) {
                continue;
            }
            result.push(current.to_string());
            queue.extend(self.children(current).iter().copied());
        }

        result
    }
}

fn contains_node(nodes: &[Node], node_id: &str) -> bool {
    nodes.iter().any(|n| n.id == node_id)
}

/// Root-first node ids from the root to `target_id` inclusive.
///
/// Unknown targets yield an empty path.
pub fn path_node_ids(nodes: &[Node], edges: &[Edge], target_id: &str) -> Vec<String> {
    if !contains_node(nodes, target_id) {
        return Vec::new();
    }
    let index = GraphIndex::build(edges);
    let (node_ids, _) = index.ancestry(target_id);
    node_ids.into_iter().map(str::to_string).collect()
}

/// Edge ids connecting consecutive nodes of [`path_node_ids`].
pub fn path_edge_ids(nodes: &[Node], edges: &[Edge], target_id: &str) -> Vec<String> {
    if !contains_node(nodes, target_id) {
        return Vec::new();
    }
    let index = GraphIndex::build(edges);
    let (_, edge_ids) = index.ancestry(target_id);
    edge_ids.into_iter().map(str::to_string).collect()
}

/// Every message of every node along the path, in ancestor order.
pub fn path_messages(nodes: &[Node], edges: &[Edge], target_id: &str) -> Vec<Message> {
    let by_id: HashMap<&str, &Node> = nodes.iter().map(|n| (n.id.as_str(), n)).collect();
    path_node_ids(nodes, edges, target_id)
        .iter()
        .filter_map(|id| by_id.get(id.as_str()))
        .flat_map(|node| node.data.chat_history.iter().cloned())
        .collect()
}

/// Messages a model sees for `target_id`: the path from its nearest branch
/// ancestor (inclusive) down, or from the root when there is none.
pub fn conversation_context(nodes: &[Node], edges: &[Edge], target_id: &str) -> Vec<Message> {
    let by_id: HashMap<&str, &Node> = nodes.iter().map(|n| (n.id.as_str(), n)).collect();
    let path: Vec<&Node> = path_node_ids(nodes, edges, target_id)
        .iter()
        .filter_map(|id| by_id.get(id.as_str()).copied())
        .collect();
    let start = path.iter().rposition(|n| n.is_branch()).unwrap_or(0);
    path[start..]
        .iter()
        .flat_map(|node| node.data.chat_history.iter().cloned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::model::{Node, Position};

    fn node(id: &str, messages: &[&str]) -> Node {
        let mut node = Node::new(id, id, Position::default());
        node.data.chat_history = messages.iter().map(|m| Message::user(*m)).collect();
        node
    }

    fn chain() -> (Vec<Node>, Vec<Edge>) {
        let nodes = vec![node("root", &["m1"]), node("a", &["m2", "m3"]), node("b", &["m4"])];
        let edges = vec![Edge::connecting("root", "a"), Edge::connecting("a", "b")];
        (nodes, edges)
    }

    #[test]
    fn test_path_node_ids_root_first() {
        let (nodes, edges) = chain();
        assert_eq!(path_node_ids(&nodes, &edges, "b"), vec!["root", "a", "b"]);
        assert_eq!(path_node_ids(&nodes, &edges, "root"), vec!["root"]);
    }

    #[test]
    fn test_path_edge_ids_in_order() {
        let (nodes, edges) = chain();
        assert_eq!(
            path_edge_ids(&nodes, &edges, "b"),
            vec!["e-root-a".to_string(), "e-a-b".to_string()]
        );
    }

    #[test]
    fn test_path_messages_concatenated() {
        let (nodes, edges) = chain();
        let contents: Vec<String> = path_messages(&nodes, &edges, "b")
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(contents, vec!["m1", "m2", "m3", "m4"]);
    }

    #[test]
    fn test_unknown_target_is_empty() {
        let (nodes, edges) = chain();
        assert!(path_node_ids(&nodes, &edges, "ghost").is_empty());
        assert!(path_edge_ids(&nodes, &edges, "ghost").is_empty());
        assert!(path_messages(&nodes, &edges, "ghost").is_empty());
    }

    #[test]
    fn test_orphan_path_stops_at_itself() {
        let (mut nodes, edges) = chain();
        nodes.push(node("orphan", &[]));
        assert_eq!(path_node_ids(&nodes, &edges, "orphan"), vec!["orphan"]);
    }

    #[test]
    fn test_duplicate_incoming_edge_last_wins() {
        let edges = vec![
            Edge::connecting("root", "a"),
            Edge::connecting("root", "b"),
            Edge::connecting("a", "c"),
            Edge::connecting("b", "c"),
        ];
        let index = GraphIndex::build(&edges);
        assert_eq!(index.conflicts(), &["c"]);
        assert_eq!(index.parent("c"), Some(("b", "e-b-c")));
        let (node_ids, _) = index.ancestry("c");
        assert_eq!(node_ids, vec!["root", "b", "c"]);
    }

    #[test]
    fn test_cycle_terminates() {
        let edges = vec![Edge::connecting("a", "b"), Edge::connecting("b", "a")];
        let index = GraphIndex::build(&edges);
        let (node_ids, edge_ids) = index.ancestry("a");
        assert_eq!(node_ids, vec!["b", "a"]);
        assert_eq!(edge_ids.len(), 1);
    }

    #[test]
    fn test_descendants_breadth_first() {
        let edges = vec![
            Edge::connecting("root", "a"),
            Edge::connecting("a", "b"),
            Edge::connecting("a", "c"),
            Edge::connecting("b", "d"),
            Edge::connecting("root", "x"),
        ];
        let index = GraphIndex::build(&edges);
        assert_eq!(index.descendants("a"), vec!["b", "c", "d"]);
        assert!(index.descendants("d").is_empty());
        assert!(index.descendants("ghost").is_empty());
    }

    #[test]
    fn test_conversation_context_stops_at_nearest_branch() {
        let (mut nodes, mut edges) = chain();
        nodes.push(node("c", &["m5"]));
        edges.push(Edge::connecting("b", "c"));
        assert_eq!(
            conversation_context(&nodes, &edges, "c").len(),
            path_messages(&nodes, &edges, "c").len()
        );

        nodes[2].data.branched_from = Some("a".to_string());
        let contents: Vec<String> = conversation_context(&nodes, &edges, "c")
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(contents, vec!["m4", "m5"]);
        assert!(conversation_context(&nodes, &edges, "ghost").is_empty());
    }
}
