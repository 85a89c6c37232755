//! Persistence coordinator.
//!
//! Two tiers share one snapshot shape:
//! - the session tier, written synchronously on every persisting command
//! - the workspace tier, written through a per-workspace debounce that reads
//!   the live graph when it fires
//!
//! The live graph carries the id of the workspace it was loaded from, under
//! the same lock. A save only writes when that id matches its own scope, so
//! a timer that outlives a workspace switch never lands in the wrong slot.
//!
//! Load, export and import go through the workspace tier.

mod session;

pub use session::{SessionSaveOutcome, SessionTier};

use crate::coalesce::{CoalescedJob, CoalescingTask};
use arbor_core::config::PersistenceConfig;
use arbor_core::error::Result;
use arbor_core::graph::GraphState;
use arbor_core::snapshot::{GraphSnapshot, SNAPSHOT_VERSION, VersionCheck};
use arbor_core::storage::{DurableStore, KeyValueStore};
use arbor_core::workspace::WorkspaceDirectory;
use arbor_infrastructure::workspace_key;
use futures::FutureExt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// The loaded graph and the workspace it belongs to.
#[derive(Debug, Clone, Default)]
pub struct LiveGraph {
    pub workspace_id: String,
    pub state: GraphState,
    /// Changed since the workspace tier last captured it.
    pub(crate) dirty: bool,
}

impl LiveGraph {
    pub fn new(workspace_id: impl Into<String>, state: GraphState) -> Self {
        Self {
            workspace_id: workspace_id.into(),
            state,
            dirty: false,
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}

impl Deref for LiveGraph {
    type Target = GraphState;

    fn deref(&self) -> &GraphState {
        &self.state
    }
}

impl DerefMut for LiveGraph {
    fn deref_mut(&mut self) -> &mut GraphState {
        &mut self.state
    }
}

/// The live graph, shared between the command interface and the saver.
pub type SharedGraph = Arc<Mutex<LiveGraph>>;

/// Result of loading a workspace.
#[derive(Debug)]
pub enum LoadOutcome {
    Loaded(GraphState),
    /// Nothing was saved for this workspace yet.
    NotFound,
}

pub struct PersistenceCoordinator {
    session: SessionTier,
    directory: Arc<dyn WorkspaceDirectory>,
    store: Arc<dyn DurableStore>,
    saver: CoalescingTask,
}

impl PersistenceCoordinator {
    pub fn new(
        graph: SharedGraph,
        session_store: Arc<dyn KeyValueStore>,
        directory: Arc<dyn WorkspaceDirectory>,
        store: Arc<dyn DurableStore>,
        config: PersistenceConfig,
    ) -> Self {
        let job = workspace_save_job(graph, directory.clone());
        let saver = CoalescingTask::new(Duration::from_millis(config.debounce_ms), job);

        Self {
            session: SessionTier::new(session_store, config),
            directory,
            store,
            saver,
        }
    }

    // ============================================================================
    // Session tier
    // ============================================================================

    pub fn save_session(&self, state: &GraphState) -> SessionSaveOutcome {
        self.session.save(state)
    }

    pub fn restore_session(&self) -> Option<GraphState> {
        self.session.restore()
    }

    // ============================================================================
    // Workspace tier
    // ============================================================================

    /// Requests a debounced save of the live graph into `workspace_id`.
    pub fn schedule_save(&self, workspace_id: &str) {
        self.saver.schedule(&workspace_key(workspace_id));
    }

    /// A save for `workspace_id` is pending or running.
    pub fn is_saving(&self, workspace_id: &str) -> bool {
        self.saver.is_saving(&workspace_key(workspace_id))
    }

    /// Writes the live graph into `workspace_id` now, dropping any pending timer.
    pub async fn flush(&self, workspace_id: &str) {
        self.saver.flush(&workspace_key(workspace_id)).await;
    }

    /// Drops a pending save without writing it.
    pub fn cancel_save(&self, workspace_id: &str) -> bool {
        self.saver.cancel(&workspace_key(workspace_id))
    }

    /// Writes a graph that is no longer live into `workspace_id`.
    ///
    /// Runs behind the same per-workspace gate as the debounced save, so an
    /// older save still in flight cannot land after it.
    pub async fn save_detached(&self, workspace_id: &str, state: &GraphState) {
        let snapshot = GraphSnapshot::capture(state);
        self.saver
            .exclusive(
                &workspace_key(workspace_id),
                write_workspace(self.directory.as_ref(), workspace_id, &snapshot),
            )
            .await;
    }

    /// Writes only if a debounced save is pending.
    pub async fn flush_pending(&self, workspace_id: &str) -> bool {
        self.saver.flush_pending(&workspace_key(workspace_id)).await
    }

    pub async fn load(&self, workspace_id: &str) -> Result<LoadOutcome> {
        let Some(snapshot) = self.directory.get_data(workspace_id).await? else {
            tracing::debug!(workspace_id, "[Persistence] No saved graph");
            return Ok(LoadOutcome::NotFound);
        };

        match snapshot.check_version() {
            VersionCheck::Current => {}
            VersionCheck::Compatible(version) | VersionCheck::Incompatible(version) => {
                tracing::warn!(
                    workspace_id,
                    stored = %version,
                    current = SNAPSHOT_VERSION,
                    "[Persistence] Snapshot version differs; loading as-is"
                );
            }
            VersionCheck::Unparsable(version) => {
                tracing::warn!(
                    workspace_id,
                    stored = %version,
                    "[Persistence] Unparsable snapshot version; loading as-is"
                );
            }
        }

        let state = snapshot.into_state();
        tracing::info!(
            workspace_id,
            nodes = state.nodes.len(),
            edges = state.edges.len(),
            messages = state.total_messages(),
            "[Persistence] Loaded graph"
        );
        Ok(LoadOutcome::Loaded(state))
    }

    // ============================================================================
    // Durable store passthrough
    // ============================================================================

    pub async fn export_all(&self) -> Result<String> {
        self.store.export_all().await
    }

    /// Replaces the durable store with the bundle. The caller reloads.
    pub async fn import_all(&self, blob: &str) -> Result<bool> {
        self.store.import_all(blob).await
    }

    pub async fn has_consent(&self) -> bool {
        self.store.has_consent().await
    }

    pub async fn needs_consent(&self) -> bool {
        self.store.needs_consent().await
    }

    pub async fn set_consent(&self, granted: bool) -> Result<()> {
        self.store.set_consent(granted).await
    }
}

fn workspace_save_job(graph: SharedGraph, directory: Arc<dyn WorkspaceDirectory>) -> CoalescedJob {
    Arc::new(move |key: String| {
        let graph = graph.clone();
        let directory = directory.clone();
        async move {
            let Some(workspace_id) = key.strip_prefix("workspace:") else {
                tracing::error!(key = %key, "[Persistence] Unexpected save scope");
                return;
            };

            let snapshot = {
                let mut live = graph.lock().await;
                if live.workspace_id != workspace_id {
                    tracing::debug!(
                        workspace_id,
                        loaded = %live.workspace_id,
                        "[Persistence] Workspace no longer loaded; save skipped"
                    );
                    return;
                }
                let snapshot = GraphSnapshot::capture(&live.state);
                if live.state.created_at.is_none() {
                    live.state.created_at = Some(snapshot.metadata.created_at);
                }
                live.dirty = false;
                snapshot
            };

            write_workspace(directory.as_ref(), workspace_id, &snapshot).await;
        }
        .boxed()
    })
}

async fn write_workspace(
    directory: &dyn WorkspaceDirectory,
    workspace_id: &str,
    snapshot: &GraphSnapshot,
) {
    match directory.save_data(workspace_id, snapshot).await {
        Ok(true) => tracing::debug!(
            workspace_id,
            nodes = snapshot.nodes.len(),
            messages = snapshot.metadata.total_messages,
            attachments = snapshot.metadata.total_attachments,
            bytes = snapshot.metadata.data_size,
            "[Persistence] Workspace saved"
        ),
        Ok(false) => tracing::debug!(
            workspace_id,
            bytes = snapshot.metadata.data_size,
            "[Persistence] Workspace save skipped (no consent or over limit)"
        ),
        Err(e) => tracing::error!(
            workspace_id,
            error = %e,
            bytes = snapshot.metadata.data_size,
            "[Persistence] Workspace save failed"
        ),
    }
}
