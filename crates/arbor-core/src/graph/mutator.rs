//! Structural edits on the conversation tree.
//!
//! Every operation here keeps three invariants: `root` is always present,
//! every removed node takes its whole subtree and all incident edges with
//! it, and the active node (if any) still exists afterwards.

use super::documents::inherited_documents;
use super::index::{GraphIndex, path_messages};
use super::model::{DEFAULT_NODE_LABEL, Edge, Node, NodeKind, ROOT_NODE_ID};
use super::state::{EdgeChange, Effect, GraphState, NodeChange, SaveMode};
use std::collections::HashSet;

impl GraphState {
    /// Applies a batch of UI node deltas.
    ///
    /// Removal of `root` is dropped. Any other removal cascades to the
    /// node's descendants.
    pub fn apply_node_changes(&mut self, changes: Vec<NodeChange>) -> Vec<Effect> {
        let mut removals: Vec<String> = Vec::new();
        let mut updates: Vec<NodeChange> = Vec::new();

        for change in changes {
            match change {
                NodeChange::Remove { id } if id == ROOT_NODE_ID => {
                    tracing::debug!("[GraphMutator] Dropped removal of root node");
                }
                NodeChange::Remove { id } => removals.push(id),
                other => updates.push(other),
            }
        }

        let mut effects = Vec::new();
        let mut changed = false;

        if !removals.is_empty() {
            let doomed = self.collect_subtrees(&removals);
            changed |= !doomed.is_empty();
            effects.extend(self.remove_nodes(&doomed));
        }

        for update in updates {
            changed |= self.apply_node_update(update);
        }

        changed |= self.ensure_root();
        self.refresh_active_path();

        if changed {
            effects.push(Effect::Persist(SaveMode::Debounced));
        }
        effects
    }

    /// Applies a batch of UI edge deltas.
    pub fn apply_edge_changes(&mut self, changes: Vec<EdgeChange>) -> Vec<Effect> {
        let mut changed = false;
        for change in changes {
            match change {
                EdgeChange::Add(edge) => {
                    if self.edges.iter().any(|e| e.id == edge.id) {
                        tracing::debug!(edge_id = %edge.id, "[GraphMutator] Ignored duplicate edge");
                        continue;
                    }
                    self.edges.push(edge);
                    changed = true;
                }
                EdgeChange::Remove { id } => {
                    let before = self.edges.len();
                    self.edges.retain(|e| e.id != id);
                    changed |= self.edges.len() != before;
                }
                EdgeChange::Replace(edge) => {
                    if let Some(existing) = self.edges.iter_mut().find(|e| e.id == edge.id) {
                        *existing = edge;
                        changed = true;
                    }
                }
            }
        }

        if !changed {
            return Vec::new();
        }
        self.refresh_active_path();
        vec![Effect::Persist(SaveMode::Debounced)]
    }

    /// Creates a child of `source_id` and the edge leading to it.
    ///
    /// Returns `None` when the source does not exist. Branches also carry
    /// the document attachments found along the source's ancestor path.
    pub fn create_node_and_edge(
        &mut self,
        source_id: &str,
        label: &str,
        kind: NodeKind,
    ) -> (Option<String>, Vec<Effect>) {
        let Some(source) = self.node(source_id) else {
            tracing::warn!(source_id, "[GraphMutator] Cannot create node: source not found");
            return (None, Vec::new());
        };

        let (dx, dy) = kind.layout_offset();
        let position = source.position.offset(dx, dy);
        let node_id = self.allocate_node_id();

        let mut node = Node::new(node_id.clone(), label, position);
        if kind == NodeKind::Branch {
            node.data.branched_from = Some(source_id.to_string());
        }
        self.nodes.push(node);
        self.edges.push(Edge::connecting(source_id, &node_id));

        let mut effects = Vec::new();
        if kind == NodeKind::Branch {
            let ancestry = path_messages(&self.nodes, &self.edges, source_id);
            let documents = inherited_documents(&ancestry);
            tracing::info!(
                source_id,
                node_id = %node_id,
                documents = documents.len(),
                "[GraphMutator] Created branch"
            );
            effects.push(Effect::SeedBranchThread {
                source_id: source_id.to_string(),
                node_id: node_id.clone(),
                documents,
            });
        } else {
            tracing::info!(source_id, node_id = %node_id, "[GraphMutator] Created response node");
        }
        effects.push(Effect::Persist(SaveMode::Immediate));

        (Some(node_id), effects)
    }

    /// Removes every descendant of `node_id` and clears its own history.
    pub fn reset_node(&mut self, node_id: &str) -> Vec<Effect> {
        if !self.contains(node_id) {
            return Vec::new();
        }

        let descendants: HashSet<String> = GraphIndex::build(&self.edges)
            .descendants(node_id)
            .into_iter()
            .collect();
        let mut effects = self.remove_nodes(&descendants);

        if let Some(node) = self.node_mut(node_id) {
            node.data.chat_history.clear();
            node.data.label = DEFAULT_NODE_LABEL.to_string();
        }
        effects.push(Effect::ReleaseThread {
            node_id: node_id.to_string(),
        });

        tracing::info!(
            node_id,
            removed = descendants.len(),
            "[GraphMutator] Reset node"
        );

        self.refresh_active_path();
        effects.push(Effect::Persist(SaveMode::Debounced));
        effects
    }

    /// Removes `node_id` and its whole subtree. A no-op for `root`.
    pub fn delete_node_and_descendants(&mut self, node_id: &str) -> Vec<Effect> {
        if node_id == ROOT_NODE_ID || !self.contains(node_id) {
            return Vec::new();
        }

        let doomed = self.collect_subtrees(&[node_id.to_string()]);
        let mut effects = self.remove_nodes(&doomed);

        tracing::info!(node_id, removed = doomed.len(), "[GraphMutator] Deleted subtree");

        self.refresh_active_path();
        effects.push(Effect::Persist(SaveMode::Debounced));
        effects
    }

    /// `ids` plus all their descendants.
    fn collect_subtrees(&self, ids: &[String]) -> HashSet<String> {
        let index = GraphIndex::build(&self.edges);
        let mut doomed = HashSet::new();
        for id in ids {
            if !self.contains(id) || id == ROOT_NODE_ID {
                continue;
            }
            doomed.insert(id.clone());
            doomed.extend(
                index
                    .descendants(id)
                    .into_iter()
                    .filter(|d| d != ROOT_NODE_ID),
            );
        }
        doomed
    }

    /// Drops the given nodes and every incident edge.
    fn remove_nodes(&mut self, doomed: &HashSet<String>) -> Vec<Effect> {
        if doomed.is_empty() {
            return Vec::new();
        }

        let mut effects = Vec::new();
        self.nodes.retain(|node| {
            if doomed.contains(&node.id) {
                effects.push(Effect::ReleaseThread {
                    node_id: node.id.clone(),
                });
                false
            } else {
                true
            }
        });
        self.edges
            .retain(|edge| !doomed.contains(&edge.source) && !doomed.contains(&edge.target));

        if let Some(active) = &self.active_node_id
            && doomed.contains(active)
        {
            tracing::debug!(node_id = %active, "[GraphMutator] Active node removed; clearing");
            self.active_node_id = None;
        }

        effects
    }

    fn apply_node_update(&mut self, change: NodeChange) -> bool {
        match change {
            NodeChange::Add(node) => {
                if self.contains(&node.id) {
                    tracing::debug!(node_id = %node.id, "[GraphMutator] Ignored duplicate node");
                    return false;
                }
                self.nodes.push(node);
                true
            }
            NodeChange::Position { id, position } => match self.node_mut(&id) {
                Some(node) => {
                    node.position = position;
                    true
                }
                None => false,
            },
            NodeChange::Replace(node) => match self.node_mut(&node.id) {
                Some(existing) => {
                    *existing = node;
                    true
                }
                None => false,
            },
            NodeChange::Remove { .. } => false,
        }
    }

    /// Re-inserts the canonical root record at the front if it went missing.
    pub fn ensure_root(&mut self) -> bool {
        if self.contains(ROOT_NODE_ID) {
            return false;
        }
        tracing::warn!("[GraphMutator] Root node missing; re-inserting");
        self.nodes.insert(0, Node::root());
        true
    }

    fn allocate_node_id(&self) -> String {
        loop {
            let id = format!("node-{}", uuid::Uuid::new_v4());
            if !self.contains(&id) {
                return id;
            }
        }
    }
}
