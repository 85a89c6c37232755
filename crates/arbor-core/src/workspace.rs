//! Workspace directory contract.
//!
//! A workspace is an independently named and persisted graph. The directory
//! tracks which one is active and stores one snapshot per workspace id.

use crate::error::Result;
use crate::snapshot::GraphSnapshot;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Listing entry for a workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceMetadata {
    pub id: String,
    pub name: String,
    /// Epoch ms
    pub created_at: i64,
    /// Epoch ms
    pub last_accessed: i64,
}

impl WorkspaceMetadata {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id: id.into(),
            name: name.into(),
            created_at: now,
            last_accessed: now,
        }
    }
}

#[async_trait]
pub trait WorkspaceDirectory: Send + Sync {
    /// Id of the active workspace. A directory always has one.
    async fn active_workspace_id(&self) -> String;

    async fn active_workspace(&self) -> Option<WorkspaceMetadata>;

    async fn list(&self) -> Vec<WorkspaceMetadata>;

    /// Loads the workspace's snapshot. `Ok(None)` when nothing was saved yet.
    async fn get_data(&self, workspace_id: &str) -> Result<Option<GraphSnapshot>>;

    /// Stores the workspace's snapshot. `Ok(false)` when the write was skipped.
    async fn save_data(&self, workspace_id: &str, snapshot: &GraphSnapshot) -> Result<bool>;

    /// Creates a workspace and returns its id.
    async fn create(&self, name: &str) -> Result<String>;

    async fn rename(&self, workspace_id: &str, name: &str) -> Result<bool>;

    /// Deletes a workspace and its data. The last workspace cannot be deleted.
    async fn delete(&self, workspace_id: &str) -> Result<bool>;

    async fn set_active(&self, workspace_id: &str) -> Result<()>;
}
