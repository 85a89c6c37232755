//! Workspace directory over a [`DurableStore`].
//!
//! Directory structure (file-backed):
//! ```text
//! base_dir/
//! ├── workspaces.json      # WorkspaceIndex: active id + metadata list
//! └── graphs/              # one snapshot per `workspace:<id>` key
//! ```

use crate::storage::AtomicJsonFile;
use arbor_core::error::{ArborError, Result};
use arbor_core::snapshot::GraphSnapshot;
use arbor_core::storage::DurableStore;
use arbor_core::workspace::{WorkspaceDirectory, WorkspaceMetadata};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

pub const DEFAULT_WORKSPACE_ID: &str = "default";
pub const DEFAULT_WORKSPACE_NAME: &str = "Default";

/// Durable-store key holding a workspace's graph snapshot.
pub fn workspace_key(workspace_id: &str) -> String {
    format!("workspace:{}", workspace_id)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WorkspaceIndex {
    active_id: String,
    workspaces: Vec<WorkspaceMetadata>,
}

impl Default for WorkspaceIndex {
    fn default() -> Self {
        Self {
            active_id: DEFAULT_WORKSPACE_ID.to_string(),
            workspaces: vec![WorkspaceMetadata::new(
                DEFAULT_WORKSPACE_ID,
                DEFAULT_WORKSPACE_NAME,
            )],
        }
    }
}

impl WorkspaceIndex {
    fn find(&self, workspace_id: &str) -> Option<&WorkspaceMetadata> {
        self.workspaces.iter().find(|w| w.id == workspace_id)
    }

    fn find_mut(&mut self, workspace_id: &str) -> Option<&mut WorkspaceMetadata> {
        self.workspaces.iter_mut().find(|w| w.id == workspace_id)
    }

    /// Repairs an index whose active id points nowhere or which is empty.
    fn normalize(&mut self) {
        if self.workspaces.is_empty() {
            *self = Self::default();
            return;
        }
        if self.find(&self.active_id).is_none() {
            self.active_id = self.workspaces[0].id.clone();
        }
    }
}

/// [`WorkspaceDirectory`] storing graph data in a [`DurableStore`] and the
/// workspace list in an optional index file.
pub struct StoreWorkspaceDirectory {
    store: Arc<dyn DurableStore>,
    index_file: Option<PathBuf>,
    index: Mutex<WorkspaceIndex>,
}

impl StoreWorkspaceDirectory {
    /// Opens a directory whose index lives at `index_file`.
    pub async fn open(store: Arc<dyn DurableStore>, index_file: PathBuf) -> Result<Self> {
        let file = AtomicJsonFile::<WorkspaceIndex>::new(index_file.clone());
        let mut index = tokio::task::spawn_blocking(move || file.load())
            .await
            .map_err(|e| ArborError::internal(format!("Failed to join task: {}", e)))??
            .unwrap_or_default();
        index.normalize();

        tracing::debug!(
            workspaces = index.workspaces.len(),
            active = %index.active_id,
            "[WorkspaceDirectory] Opened"
        );

        Ok(Self {
            store,
            index_file: Some(index_file),
            index: Mutex::new(index),
        })
    }

    /// A directory whose workspace list is kept in memory only.
    pub fn in_memory(store: Arc<dyn DurableStore>) -> Self {
        Self {
            store,
            index_file: None,
            index: Mutex::new(WorkspaceIndex::default()),
        }
    }

    pub fn store(&self) -> &Arc<dyn DurableStore> {
        &self.store
    }

    async fn persist_index(&self, index: &WorkspaceIndex) -> Result<()> {
        let Some(path) = self.index_file.clone() else {
            return Ok(());
        };
        let file = AtomicJsonFile::<WorkspaceIndex>::new(path);
        let index = index.clone();
        tokio::task::spawn_blocking(move || file.save(&index))
            .await
            .map_err(|e| ArborError::internal(format!("Failed to join task: {}", e)))?
    }
}

#[async_trait]
impl WorkspaceDirectory for StoreWorkspaceDirectory {
    async fn active_workspace_id(&self) -> String {
        self.index.lock().await.active_id.clone()
    }

    async fn active_workspace(&self) -> Option<WorkspaceMetadata> {
        let index = self.index.lock().await;
        index.find(&index.active_id).cloned()
    }

    async fn list(&self) -> Vec<WorkspaceMetadata> {
        let mut workspaces = self.index.lock().await.workspaces.clone();
        workspaces.sort_by(|a, b| b.last_accessed.cmp(&a.last_accessed));
        workspaces
    }

    async fn get_data(&self, workspace_id: &str) -> Result<Option<GraphSnapshot>> {
        self.store.get(&workspace_key(workspace_id)).await
    }

    async fn save_data(&self, workspace_id: &str, snapshot: &GraphSnapshot) -> Result<bool> {
        self.store.set(&workspace_key(workspace_id), snapshot).await
    }

    async fn create(&self, name: &str) -> Result<String> {
        let mut index = self.index.lock().await;
        let id = format!("ws-{}", uuid::Uuid::new_v4());
        index.workspaces.push(WorkspaceMetadata::new(&id, name));
        self.persist_index(&index).await?;
        tracing::info!(workspace_id = %id, name, "[WorkspaceDirectory] Created workspace");
        Ok(id)
    }

    async fn rename(&self, workspace_id: &str, name: &str) -> Result<bool> {
        let mut index = self.index.lock().await;
        let Some(workspace) = index.find_mut(workspace_id) else {
            return Ok(false);
        };
        workspace.name = name.to_string();
        self.persist_index(&index).await?;
        Ok(true)
    }

    async fn delete(&self, workspace_id: &str) -> Result<bool> {
        let mut index = self.index.lock().await;
        if index.find(workspace_id).is_none() {
            return Ok(false);
        }
        if index.workspaces.len() == 1 {
            tracing::warn!(workspace_id, "[WorkspaceDirectory] Refusing to delete the last workspace");
            return Ok(false);
        }

        index.workspaces.retain(|w| w.id != workspace_id);
        index.normalize();
        self.store.remove(&workspace_key(workspace_id)).await?;
        self.persist_index(&index).await?;
        tracing::info!(workspace_id, "[WorkspaceDirectory] Deleted workspace");
        Ok(true)
    }

    async fn set_active(&self, workspace_id: &str) -> Result<()> {
        let mut index = self.index.lock().await;
        let Some(workspace) = index.find_mut(workspace_id) else {
            return Err(ArborError::not_found("Workspace", workspace_id));
        };
        workspace.last_accessed = chrono::Utc::now().timestamp_millis();
        index.active_id = workspace_id.to_string();
        self.persist_index(&index).await
    }
}
