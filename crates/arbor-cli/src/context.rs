//! Wiring of stores, directory, model and manager for one CLI invocation.

use anyhow::{Context, Result};
use arbor_application::GraphManager;
use arbor_core::config::ArborConfig;
use arbor_core::error::{ArborError, Result as ArborResult};
use arbor_core::graph::Message;
use arbor_core::storage::DurableStore;
use arbor_infrastructure::storage::{FileDurableStore, MemoryDurableStore, MemorySessionStore};
use arbor_infrastructure::{ArborPaths, ConfigService, StoreWorkspaceDirectory};
use arbor_interaction::{ChatModel, OpenAiChatModel, ThreadManager};
use async_trait::async_trait;
use std::sync::Arc;

/// Stand-in used when no API key is configured. Sends fail with a
/// configuration message, which the manager records on the node.
struct UnavailableModel {
    reason: String,
}

#[async_trait]
impl ChatModel for UnavailableModel {
    async fn complete(&self, _messages: &[Message]) -> ArborResult<String> {
        Err(ArborError::config(self.reason.clone()))
    }

    fn model_id(&self) -> String {
        "unavailable".to_string()
    }
}

pub struct AppContext {
    pub paths: ArborPaths,
    pub config: ArborConfig,
    pub store: Arc<dyn DurableStore>,
    pub manager: GraphManager,
}

impl AppContext {
    /// Opens the stores and loads the active workspace.
    ///
    /// With `ephemeral` nothing touches disk except the config file.
    pub async fn open(paths: ArborPaths, ephemeral: bool) -> Result<Self> {
        let config = ConfigService::new(paths.config_file())
            .get_config()
            .context("Failed to load configuration")?;

        let (store, directory): (Arc<dyn DurableStore>, Arc<StoreWorkspaceDirectory>) =
            if ephemeral {
                let store: Arc<dyn DurableStore> = Arc::new(MemoryDurableStore::with_consent());
                let directory = StoreWorkspaceDirectory::in_memory(store.clone());
                (store, Arc::new(directory))
            } else {
                let store: Arc<dyn DurableStore> = Arc::new(
                    FileDurableStore::new(paths.data_dir())
                        .await
                        .context("Failed to open graph store")?,
                );
                let directory =
                    StoreWorkspaceDirectory::open(store.clone(), paths.workspace_index_file())
                        .await
                        .context("Failed to open workspace index")?;
                (store, Arc::new(directory))
            };

        let model: Arc<dyn ChatModel> = match OpenAiChatModel::from_config(&config.model) {
            Ok(model) => Arc::new(model),
            Err(e) => {
                tracing::debug!(error = %e, "[AppContext] Chat model unavailable");
                Arc::new(UnavailableModel {
                    reason: e.to_string(),
                })
            }
        };
        let threads = Arc::new(ThreadManager::new(model));

        let manager = GraphManager::new(
            threads,
            directory,
            store.clone(),
            Arc::new(MemorySessionStore::new()),
            config.persistence.clone(),
        );
        manager
            .load_active_workspace()
            .await
            .context("Failed to load active workspace")?;

        Ok(Self {
            paths,
            config,
            store,
            manager,
        })
    }

    /// Prints a hint when saves are being skipped for lack of consent.
    pub async fn warn_if_unsaved(&self) {
        if self.store.needs_consent().await {
            eprintln!(
                "note: changes are not saved until storage is allowed (`arbor consent grant`)"
            );
        } else if !self.store.has_consent().await {
            eprintln!("note: storage consent was revoked; changes are not saved");
        }
    }

    pub async fn close(&self) {
        self.manager.close().await;
    }
}
