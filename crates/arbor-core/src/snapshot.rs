//! Persisted graph snapshot format.
//!
//! ## Version History
//! - **1.0.0**: nodes, edges and `activeNodeId` only
//! - **2.0.0**: added `timestamp`, `version` and derived `metadata`
//!
//! Loading never migrates: a snapshot written by another version is logged
//! and loaded as-is.

use crate::error::Result;
use crate::graph::{GraphState, Node, ROOT_NODE_ID};
use serde::{Deserialize, Serialize};

/// Version tag written into every snapshot.
pub const SNAPSHOT_VERSION: &str = "2.0.0";

/// Marker appended to message content cut by compaction.
pub const TRUNCATION_MARKER: &str = "\n\n[truncated]";

/// Counters derived from the graph when a snapshot is taken.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMetadata {
    pub total_messages: usize,
    pub total_attachments: usize,
    /// Epoch ms when the graph was first saved.
    pub created_at: i64,
    /// Epoch ms of this save.
    pub last_modified: i64,
    /// Serialized size of nodes and edges in bytes.
    pub data_size: usize,
}

/// The unit persisted and restored per workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphSnapshot {
    pub nodes: Vec<Node>,
    pub edges: Vec<crate::graph::Edge>,
    #[serde(default)]
    pub active_node_id: Option<String>,
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default = "legacy_version")]
    pub version: String,
    #[serde(default)]
    pub metadata: SnapshotMetadata,
}

fn legacy_version() -> String {
    "1.0.0".to_string()
}

/// How a stored version tag relates to [`SNAPSHOT_VERSION`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionCheck {
    Current,
    /// Same major version, different minor/patch.
    Compatible(String),
    /// Different major version; loaded anyway.
    Incompatible(String),
    Unparsable(String),
}

impl GraphSnapshot {
    /// Captures the current state. `created_at` is carried from the state
    /// or set to now on first capture.
    pub fn capture(state: &GraphState) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        let data_size = serde_json::to_vec(&(&state.nodes, &state.edges))
            .map(|bytes| bytes.len())
            .unwrap_or(0);

        Self {
            nodes: state.nodes.clone(),
            edges: state.edges.clone(),
            active_node_id: state.active_node_id.clone(),
            timestamp: now,
            version: SNAPSHOT_VERSION.to_string(),
            metadata: SnapshotMetadata {
                total_messages: state.total_messages(),
                total_attachments: state.total_attachments(),
                created_at: state.created_at.unwrap_or(now),
                last_modified: now,
                data_size,
            },
        }
    }

    /// Restores the live state, synthesizing `root` at the front when it is
    /// missing and dropping an `activeNodeId` that points nowhere.
    pub fn into_state(self) -> GraphState {
        let created_at = (self.metadata.created_at > 0).then_some(self.metadata.created_at);
        let mut state = GraphState {
            nodes: self.nodes,
            edges: self.edges,
            active_node_id: self.active_node_id,
            active_path: Default::default(),
            created_at,
        };

        if !state.contains(ROOT_NODE_ID) {
            tracing::warn!("[Snapshot] Loaded snapshot has no root node; synthesizing");
            state.nodes.insert(0, Node::root());
        }
        if let Some(active) = &state.active_node_id
            && !state.contains(active)
        {
            tracing::warn!(node_id = %active, "[Snapshot] Dropping dangling activeNodeId");
            state.active_node_id = None;
        }
        state.refresh_active_path();
        state
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Compares the stored version tag against [`SNAPSHOT_VERSION`].
    pub fn check_version(&self) -> VersionCheck {
        let current = semver::Version::parse(SNAPSHOT_VERSION)
            .unwrap_or_else(|_| semver::Version::new(0, 0, 0));
        match semver::Version::parse(&self.version) {
            Ok(stored) if stored == current => VersionCheck::Current,
            Ok(stored) if stored.major == current.major => {
                VersionCheck::Compatible(self.version.clone())
            }
            Ok(_) => VersionCheck::Incompatible(self.version.clone()),
            Err(_) => VersionCheck::Unparsable(self.version.clone()),
        }
    }

    /// Returns a copy with long message content truncated and oversized
    /// attachments dropped.
    pub fn compacted(&self, content_limit: usize, attachment_limit: usize) -> Self {
        let mut compacted = self.clone();
        let mut truncated = 0usize;
        let mut dropped = 0usize;

        for node in &mut compacted.nodes {
            for message in &mut node.data.chat_history {
                if message.content.chars().count() > content_limit {
                    let head: String = message.content.chars().take(content_limit).collect();
                    message.content = format!("{}{}", head, TRUNCATION_MARKER);
                    truncated += 1;
                }
                let before = message.attachments.len();
                message.attachments.retain(|a| a.data.len() <= attachment_limit);
                dropped += before - message.attachments.len();
            }
        }

        compacted.metadata.total_attachments = compacted
            .nodes
            .iter()
            .flat_map(|n| n.data.chat_history.iter())
            .map(|m| m.attachments.len())
            .sum();

        tracing::debug!(truncated, dropped, "[Snapshot] Compacted snapshot");
        compacted
    }
}
