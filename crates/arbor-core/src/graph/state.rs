//! Owned graph state and its command interface.
//!
//! Every operation is applied to a [`GraphState`] in place and reports the
//! side-actions it needs as [`Effect`]s. The caller executes the effects
//! (persisting, notifying the thread collaborator), which keeps the tree
//! algorithms free of I/O.

use super::active_path::ActivePath;
use super::message::{Attachment, Message};
use super::model::{Edge, Node, NodeKind, Position};
use serde::{Deserialize, Serialize};

/// How urgently a persist effect should reach durable storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveMode {
    /// Coalesced with other requests in the debounce window.
    Debounced,
    /// Written as part of the same logical unit as the mutation.
    Immediate,
}

/// A side-action requested by a state transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Persist(SaveMode),
    /// The node is gone; its conversation thread can be released.
    ReleaseThread { node_id: String },
    /// Seed a thread for a new branch with the documents it inherits.
    SeedBranchThread {
        source_id: String,
        node_id: String,
        documents: Vec<Attachment>,
    },
    /// Ask the summarizer for a new title. `fallback` is used on failure.
    RegenerateTitle {
        node_id: String,
        recent: Vec<Message>,
        fallback: String,
    },
}

/// A UI-originated node delta.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeChange {
    Add(Node),
    Remove { id: String },
    Position { id: String, position: Position },
    Replace(Node),
}

/// A UI-originated edge delta.
#[derive(Debug, Clone, PartialEq)]
pub enum EdgeChange {
    Add(Edge),
    Remove { id: String },
    Replace(Edge),
}

/// Every state transition the graph supports.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    ApplyNodeChanges(Vec<NodeChange>),
    ApplyEdgeChanges(Vec<EdgeChange>),
    CreateNode {
        source_id: String,
        label: String,
        kind: NodeKind,
    },
    ResetNode {
        node_id: String,
    },
    DeleteNode {
        node_id: String,
    },
    SetLabel {
        node_id: String,
        label: String,
    },
    AppendMessage {
        node_id: String,
        message: Message,
        is_partial: bool,
    },
    ReplaceLast {
        node_id: String,
        content: String,
        model_id: Option<String>,
    },
    DropLast {
        node_id: String,
    },
    SetActive {
        node_id: Option<String>,
    },
}

/// Result of applying a [`Command`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outcome {
    pub effects: Vec<Effect>,
    /// Id allocated by `CreateNode`; `None` when the source was unknown.
    pub created_node_id: Option<String>,
    /// `ReplaceLast` reports whether the guard let the write through.
    pub replaced: bool,
}

impl Outcome {
    fn effects(effects: Vec<Effect>) -> Self {
        Self {
            effects,
            ..Self::default()
        }
    }

    pub fn persists(&self) -> bool {
        self.effects.iter().any(|e| matches!(e, Effect::Persist(_)))
    }
}

/// The in-memory conversation graph of one workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphState {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub active_node_id: Option<String>,
    #[serde(skip)]
    pub active_path: ActivePath,
    /// Creation time (epoch ms) carried across saves.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
}

impl GraphState {
    /// A graph containing only the root node.
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::root()],
            edges: Vec::new(),
            active_node_id: None,
            active_path: ActivePath::default(),
            created_at: None,
        }
    }

    pub fn node(&self, node_id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == node_id)
    }

    pub(crate) fn node_mut(&mut self, node_id: &str) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.id == node_id)
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.node(node_id).is_some()
    }

    pub fn total_messages(&self) -> usize {
        self.nodes.iter().map(|n| n.data.chat_history.len()).sum()
    }

    pub fn total_attachments(&self) -> usize {
        self.nodes
            .iter()
            .flat_map(|n| n.data.chat_history.iter())
            .map(|m| m.attachments.len())
            .sum()
    }

    /// Applies a command and returns the effects the caller must execute.
    pub fn apply(&mut self, command: Command) -> Outcome {
        match command {
            Command::ApplyNodeChanges(changes) => {
                Outcome::effects(self.apply_node_changes(changes))
            }
            Command::ApplyEdgeChanges(changes) => {
                Outcome::effects(self.apply_edge_changes(changes))
            }
            Command::CreateNode {
                source_id,
                label,
                kind,
            } => {
                let (created_node_id, effects) =
                    self.create_node_and_edge(&source_id, &label, kind);
                Outcome {
                    effects,
                    created_node_id,
                    replaced: false,
                }
            }
            Command::ResetNode { node_id } => Outcome::effects(self.reset_node(&node_id)),
            Command::DeleteNode { node_id } => {
                Outcome::effects(self.delete_node_and_descendants(&node_id))
            }
            Command::SetLabel { node_id, label } => {
                Outcome::effects(self.set_label(&node_id, &label))
            }
            Command::AppendMessage {
                node_id,
                message,
                is_partial,
            } => Outcome::effects(self.append_message(&node_id, message, is_partial)),
            Command::ReplaceLast {
                node_id,
                content,
                model_id,
            } => Outcome {
                replaced: self.replace_last(&node_id, &content, model_id.as_deref()),
                ..Outcome::default()
            },
            Command::DropLast { node_id } => Outcome::effects(self.drop_last(&node_id)),
            Command::SetActive { node_id } => {
                Outcome::effects(self.set_active(node_id.as_deref()))
            }
        }
    }
}

impl Default for GraphState {
    fn default() -> Self {
        Self::new()
    }
}
