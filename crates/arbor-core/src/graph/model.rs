//! Graph domain model.
//!
//! Nodes and edges keep the edge-list shape the graph renderer expects. The
//! tree structure is implicit: every non-root node has exactly one incoming
//! edge, which all mutations in [`super::mutator`] preserve.

use super::message::Message;
use serde::{Deserialize, Serialize};

/// Id of the node every conversation tree hangs from.
pub const ROOT_NODE_ID: &str = "root";

/// Label of the canonical root record.
pub const ROOT_LABEL: &str = "Start";

/// Placeholder label for freshly created or reset nodes.
pub const DEFAULT_NODE_LABEL: &str = "New Chat";

/// 2D layout coordinate. Presentation only.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn offset(&self, dx: f64, dy: f64) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }
}

/// Payload carried by a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeData {
    pub label: String,
    #[serde(default)]
    pub chat_history: Vec<Message>,
    /// Source node of a branch. Conversation context stops here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branched_from: Option<String>,
}

/// A conversation turn-holder in the tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    /// Renderer node type, passed through untouched.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub position: Position,
    pub data: NodeData,
}

impl Node {
    /// Creates a node with an empty history.
    pub fn new(id: impl Into<String>, label: impl Into<String>, position: Position) -> Self {
        Self {
            id: id.into(),
            kind: None,
            position,
            data: NodeData {
                label: label.into(),
                chat_history: Vec::new(),
                branched_from: None,
            },
        }
    }

    /// The canonical root record, re-inserted whenever the root goes missing.
    pub fn root() -> Self {
        Self::new(ROOT_NODE_ID, ROOT_LABEL, Position::default())
    }

    pub fn is_root(&self) -> bool {
        self.id == ROOT_NODE_ID
    }

    pub fn history(&self) -> &[Message] {
        &self.data.chat_history
    }

    pub fn is_branch(&self) -> bool {
        self.data.branched_from.is_some()
    }
}

/// Parent → child relationship between two nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub target: String,
}

impl Edge {
    pub fn new(id: impl Into<String>, source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
        }
    }

    /// Creates an edge with the conventional `e-<source>-<target>` id.
    pub fn connecting(source: &str, target: &str) -> Self {
        Self::new(format!("e-{}-{}", source, target), source, target)
    }

    pub fn touches(&self, node_id: &str) -> bool {
        self.source == node_id || self.target == node_id
    }
}

/// How a new node relates to the conversation it grows from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// Linear continuation of the source conversation.
    Response,
    /// Alternate continuation that inherits shared documents only.
    Branch,
}

impl NodeKind {
    /// Layout offset of the new node relative to its source.
    pub fn layout_offset(&self) -> (f64, f64) {
        match self {
            NodeKind::Response => (0.0, 150.0),
            NodeKind::Branch => (300.0, 150.0),
        }
    }
}
