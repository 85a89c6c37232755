//! Graph command interface.
//!
//! `GraphManager` owns the live graph of the active workspace. Every
//! mutation goes through [`GraphManager::dispatch`], which applies the
//! command under a single lock and then executes the effects it reported.
//! Async completions (titles, model replies) re-enter through the same
//! path, so commands are applied in the order they are issued.
//!
//! The loaded workspace id lives under the same lock as the graph. Every
//! save request names the workspace that was live when its command was
//! applied, never whichever one is live by the time the effect runs.

use crate::persistence::{LiveGraph, LoadOutcome, PersistenceCoordinator, SharedGraph};
use arbor_core::config::PersistenceConfig;
use arbor_core::error::{ArborError, Result};
use arbor_core::graph::{
    ActivePath, Attachment, Command, EdgeChange, Effect, GraphState, Message, NodeChange,
    NodeKind, Outcome, SaveMode, conversation_context, inherited_documents, path_edge_ids,
    path_messages, path_node_ids,
};
use arbor_core::snapshot::GraphSnapshot;
use arbor_core::storage::{DurableStore, KeyValueStore};
use arbor_core::thread::ThreadCollaborator;
use arbor_core::workspace::WorkspaceDirectory;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

#[derive(Clone)]
pub struct GraphManager {
    graph: SharedGraph,
    threads: Arc<dyn ThreadCollaborator>,
    directory: Arc<dyn WorkspaceDirectory>,
    persistence: Arc<PersistenceCoordinator>,
    /// Spawned title tasks not yet awaited.
    background: Arc<StdMutex<Vec<JoinHandle<()>>>>,
}

impl GraphManager {
    /// Creates a manager with a root-only graph. Call
    /// [`load_active_workspace`](Self::load_active_workspace) to restore data.
    pub fn new(
        threads: Arc<dyn ThreadCollaborator>,
        directory: Arc<dyn WorkspaceDirectory>,
        store: Arc<dyn DurableStore>,
        session_store: Arc<dyn KeyValueStore>,
        config: PersistenceConfig,
    ) -> Self {
        let graph: SharedGraph = Arc::new(Mutex::new(LiveGraph::default()));
        let persistence = PersistenceCoordinator::new(
            graph.clone(),
            session_store,
            directory.clone(),
            store,
            config,
        );

        Self {
            graph,
            threads,
            directory,
            persistence: Arc::new(persistence),
            background: Arc::new(StdMutex::new(Vec::new())),
        }
    }

    pub fn persistence(&self) -> &PersistenceCoordinator {
        &self.persistence
    }

    pub fn directory(&self) -> &Arc<dyn WorkspaceDirectory> {
        &self.directory
    }

    pub async fn workspace_id(&self) -> String {
        self.graph.lock().await.workspace_id.clone()
    }

    // ============================================================================
    // Commands
    // ============================================================================

    /// Applies `command` and executes the effects it produced.
    pub async fn dispatch(&self, command: Command) -> Outcome {
        let (outcome, workspace_id) = self.apply_locked(command).await;
        self.execute(&outcome.effects, &workspace_id).await;
        outcome
    }

    pub async fn apply_node_changes(&self, changes: Vec<NodeChange>) -> Outcome {
        self.dispatch(Command::ApplyNodeChanges(changes)).await
    }

    pub async fn apply_edge_changes(&self, changes: Vec<EdgeChange>) -> Outcome {
        self.dispatch(Command::ApplyEdgeChanges(changes)).await
    }

    /// Creates a child of `source_id`. `None` when the source is unknown.
    pub async fn create_node(&self, source_id: &str, label: &str, kind: NodeKind) -> Option<String> {
        self.dispatch(Command::CreateNode {
            source_id: source_id.to_string(),
            label: label.to_string(),
            kind,
        })
        .await
        .created_node_id
    }

    pub async fn reset_node(&self, node_id: &str) -> Outcome {
        self.dispatch(Command::ResetNode {
            node_id: node_id.to_string(),
        })
        .await
    }

    pub async fn delete_node(&self, node_id: &str) -> Outcome {
        self.dispatch(Command::DeleteNode {
            node_id: node_id.to_string(),
        })
        .await
    }

    pub async fn set_label(&self, node_id: &str, label: &str) -> Outcome {
        self.dispatch(Command::SetLabel {
            node_id: node_id.to_string(),
            label: label.to_string(),
        })
        .await
    }

    pub async fn append_message(&self, node_id: &str, message: Message, is_partial: bool) -> Outcome {
        self.dispatch(Command::AppendMessage {
            node_id: node_id.to_string(),
            message,
            is_partial,
        })
        .await
    }

    pub async fn replace_last(&self, node_id: &str, content: &str, model_id: Option<&str>) -> bool {
        self.dispatch(Command::ReplaceLast {
            node_id: node_id.to_string(),
            content: content.to_string(),
            model_id: model_id.map(str::to_string),
        })
        .await
        .replaced
    }

    pub async fn drop_last(&self, node_id: &str) -> Outcome {
        self.dispatch(Command::DropLast {
            node_id: node_id.to_string(),
        })
        .await
    }

    pub async fn set_active(&self, node_id: Option<&str>) -> Outcome {
        self.dispatch(Command::SetActive {
            node_id: node_id.map(str::to_string),
        })
        .await
    }

    /// Sends `text` from the user on `node_id` and records the reply.
    ///
    /// A failed send is recorded as an error message on the node instead of
    /// being returned, so the only error is an unknown node.
    pub async fn send_message(
        &self,
        node_id: &str,
        text: &str,
        attachments: Vec<Attachment>,
    ) -> Result<Message> {
        let (context, unseeded_branch) = {
            let state = self.graph.lock().await;
            let Some(node) = state.node(node_id) else {
                return Err(ArborError::not_found("Node", node_id));
            };
            // A branch with no history may have lost its thread on restart.
            let unseeded_branch = match &node.data.branched_from {
                Some(source_id) if node.data.chat_history.is_empty() => Some((
                    source_id.clone(),
                    inherited_documents(&path_messages(&state.nodes, &state.edges, source_id)),
                )),
                _ => None,
            };
            (
                conversation_context(&state.nodes, &state.edges, node_id),
                unseeded_branch,
            )
        };
        if let Some((source_id, documents)) = unseeded_branch {
            self.seed_branch_thread(&source_id, node_id, &documents).await;
        }

        self.append_message(
            node_id,
            Message::user(text).with_attachments(attachments.clone()),
            false,
        )
        .await;

        let reply = match self.threads.get_or_create_thread(node_id, &context).await {
            Ok(_) => self.threads.send_message(node_id, text, &attachments).await,
            Err(e) => Err(e),
        };

        let message = match reply {
            Ok(content) => Message::model(content, self.threads.model_id()),
            Err(e) => {
                tracing::warn!(node_id, error = %e, "[GraphManager] Send failed");
                Message::error(format!("Error: {}", e))
            }
        };
        self.append_message(node_id, message.clone(), false).await;
        Ok(message)
    }

    /// Waits for spawned title tasks to finish.
    pub async fn settle(&self) {
        loop {
            let handles: Vec<JoinHandle<()>> = {
                let mut background = self
                    .background
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                std::mem::take(&mut *background)
            };
            if handles.is_empty() {
                return;
            }
            for handle in handles {
                if let Err(e) = handle.await {
                    tracing::warn!(error = %e, "[GraphManager] Background task failed");
                }
            }
        }
    }

    /// Waits for background work and writes any pending save.
    pub async fn close(&self) {
        self.settle().await;
        let workspace_id = self.workspace_id().await;
        if !workspace_id.is_empty() && self.persistence.flush_pending(&workspace_id).await {
            tracing::debug!(workspace_id = %workspace_id, "[GraphManager] Flushed pending save on close");
        }
    }

    /// Applies `command` and returns the id of the workspace it changed.
    async fn apply_locked(&self, command: Command) -> (Outcome, String) {
        let mut live = self.graph.lock().await;
        let outcome = live.apply(command);
        if outcome.persists() {
            live.dirty = true;
            let saved = self.persistence.save_session(&live.state);
            if !saved.is_written() {
                tracing::debug!(outcome = ?saved, "[GraphManager] Session copy not updated");
            }
        }
        (outcome, live.workspace_id.clone())
    }

    async fn execute(&self, effects: &[Effect], workspace_id: &str) {
        for effect in effects {
            match effect {
                Effect::Persist(mode) => self.persist(*mode, workspace_id).await,
                Effect::ReleaseThread { node_id } => self.threads.delete_thread(node_id).await,
                Effect::SeedBranchThread {
                    source_id,
                    node_id,
                    documents,
                } => self.seed_branch_thread(source_id, node_id, documents).await,
                Effect::RegenerateTitle {
                    node_id,
                    recent,
                    fallback,
                } => self.spawn_title(node_id.clone(), recent.clone(), fallback.clone()),
            }
        }
    }

    async fn persist(&self, mode: SaveMode, workspace_id: &str) {
        if workspace_id.is_empty() {
            return;
        }
        match mode {
            SaveMode::Debounced => self.persistence.schedule_save(workspace_id),
            SaveMode::Immediate => self.persistence.flush(workspace_id).await,
        }
    }

    async fn seed_branch_thread(&self, source_id: &str, node_id: &str, documents: &[Attachment]) {
        if let Err(e) = self
            .threads
            .create_branch_thread(source_id, node_id, documents)
            .await
        {
            tracing::warn!(
                source_id,
                node_id,
                documents = documents.len(),
                error = %e,
                "[GraphManager] Failed to seed branch thread"
            );
        }
    }

    fn spawn_title(&self, node_id: String, recent: Vec<Message>, fallback: String) {
        let manager = self.clone();
        let handle = tokio::spawn(async move {
            let label = match manager.threads.generate_title(&recent).await {
                Ok(title) => title,
                Err(e) => {
                    tracing::warn!(
                        node_id = %node_id,
                        messages = recent.len(),
                        error = %e,
                        "[GraphManager] Title generation failed; using fallback"
                    );
                    fallback
                }
            };
            manager.apply_title(&node_id, &label).await;
        });
        self.background
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(handle);
    }

    /// Title completions only rename, so they persist without spawning.
    async fn apply_title(&self, node_id: &str, label: &str) {
        let (outcome, workspace_id) = self
            .apply_locked(Command::SetLabel {
                node_id: node_id.to_string(),
                label: label.to_string(),
            })
            .await;
        for effect in &outcome.effects {
            if let Effect::Persist(mode) = effect {
                self.persist(*mode, &workspace_id).await;
            }
        }
    }

    // ============================================================================
    // Queries
    // ============================================================================

    pub async fn state(&self) -> GraphState {
        self.graph.lock().await.state.clone()
    }

    pub async fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot::capture(&self.graph.lock().await.state)
    }

    pub async fn active_path(&self) -> ActivePath {
        self.graph.lock().await.active_path.clone()
    }

    pub async fn active_node_id(&self) -> Option<String> {
        self.graph.lock().await.active_node_id.clone()
    }

    pub async fn path_node_ids(&self, target_id: &str) -> Vec<String> {
        let state = self.graph.lock().await;
        path_node_ids(&state.nodes, &state.edges, target_id)
    }

    pub async fn path_edge_ids(&self, target_id: &str) -> Vec<String> {
        let state = self.graph.lock().await;
        path_edge_ids(&state.nodes, &state.edges, target_id)
    }

    pub async fn path_messages(&self, target_id: &str) -> Vec<Message> {
        let state = self.graph.lock().await;
        path_messages(&state.nodes, &state.edges, target_id)
    }

    // ============================================================================
    // Workspaces
    // ============================================================================

    /// Loads the directory's active workspace into the live graph.
    ///
    /// Without durable data the session copy is used when durable writes are
    /// not permitted; otherwise the graph starts with only the root.
    pub async fn load_active_workspace(&self) -> Result<()> {
        let workspace_id = self.directory.active_workspace_id().await;
        self.load_into(&workspace_id, false).await
    }

    /// Saves the outgoing workspace, then loads `workspace_id`.
    ///
    /// Changes that reach the outgoing graph while the switch is under way
    /// are written to the outgoing workspace once it has been swapped out.
    pub async fn switch_workspace(&self, workspace_id: &str) -> Result<()> {
        let outgoing = self.workspace_id().await;
        if outgoing == workspace_id {
            return Ok(());
        }
        if !outgoing.is_empty() {
            self.persistence.flush(&outgoing).await;
        }
        self.directory.set_active(workspace_id).await?;
        self.load_into(workspace_id, true).await?;
        tracing::info!(from = %outgoing, to = workspace_id, "[GraphManager] Switched workspace");
        Ok(())
    }

    /// Deletes a workspace. Deleting the loaded one discards its pending
    /// save and loads whichever workspace the directory makes active.
    pub async fn delete_workspace(&self, workspace_id: &str) -> Result<bool> {
        let current = self.workspace_id().await;
        let cancelled = current == workspace_id && self.persistence.cancel_save(workspace_id);
        if !self.directory.delete(workspace_id).await? {
            if cancelled {
                self.persistence.schedule_save(workspace_id);
            }
            return Ok(false);
        }
        if current == workspace_id {
            self.load_active_workspace().await?;
        }
        Ok(true)
    }

    /// Exports every saved workspace, including the live graph.
    pub async fn export_all(&self) -> Result<String> {
        let workspace_id = self.workspace_id().await;
        if !workspace_id.is_empty() {
            self.persistence.flush(&workspace_id).await;
        }
        self.persistence.export_all().await
    }

    /// Replaces all saved workspaces with `blob` and reloads the active one.
    pub async fn import_all(&self, blob: &str) -> Result<bool> {
        let workspace_id = self.workspace_id().await;
        if !workspace_id.is_empty() {
            // A pending write would overwrite the imported graph.
            self.persistence.flush_pending(&workspace_id).await;
        }
        if !self.persistence.import_all(blob).await? {
            return Ok(false);
        }
        self.load_active_workspace().await?;
        Ok(true)
    }

    /// Swaps the live graph for `workspace_id`'s. With `keep_outgoing`, a
    /// graph swapped out with unsaved changes is written back to its own
    /// workspace.
    async fn load_into(&self, workspace_id: &str, keep_outgoing: bool) -> Result<()> {
        let loaded = match self.persistence.load(workspace_id).await? {
            LoadOutcome::Loaded(state) => state,
            LoadOutcome::NotFound if !self.persistence.has_consent().await => self
                .persistence
                .restore_session()
                .unwrap_or_default(),
            LoadOutcome::NotFound => GraphState::new(),
        };

        let (previous, released) = {
            let mut live = self.graph.lock().await;
            let previous = std::mem::replace(&mut *live, LiveGraph::new(workspace_id, loaded));
            let released = previous
                .nodes
                .iter()
                .filter(|n| !live.contains(&n.id))
                .map(|n| n.id.clone())
                .collect::<Vec<_>>();
            (previous, released)
        };

        if !previous.workspace_id.is_empty() && previous.workspace_id != workspace_id {
            // Its scheduled save would find another graph loaded and skip.
            self.persistence.cancel_save(&previous.workspace_id);
            if keep_outgoing && previous.is_dirty() {
                tracing::debug!(
                    workspace_id = %previous.workspace_id,
                    "[GraphManager] Writing late changes of outgoing workspace"
                );
                self.persistence
                    .save_detached(&previous.workspace_id, &previous.state)
                    .await;
            }
        }
        for node_id in released {
            self.threads.delete_thread(&node_id).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_core::graph::{ERROR_MODEL_ID, ROOT_NODE_ID};
    use arbor_core::thread::ThreadInfo;
    use arbor_core::workspace::WorkspaceMetadata;
    use arbor_infrastructure::StoreWorkspaceDirectory;
    use arbor_infrastructure::storage::{MemoryDurableStore, MemorySessionStore};
    use async_trait::async_trait;
    use std::sync::Mutex as SyncMutex;
    use std::time::Duration;

    // ============================================================================
    // Mock ThreadCollaborator
    // ============================================================================

    #[derive(Default)]
    struct MockThreads {
        fail_send: bool,
        fail_title: bool,
        title_delay: Option<Duration>,
        released: SyncMutex<Vec<String>>,
        branches: SyncMutex<Vec<(String, String, Vec<Attachment>)>>,
        contexts: SyncMutex<Vec<(String, usize)>>,
    }

    #[async_trait]
    impl ThreadCollaborator for MockThreads {
        async fn get_or_create_thread(
            &self,
            node_id: &str,
            path_messages: &[Message],
        ) -> Result<ThreadInfo> {
            self.contexts
                .lock()
                .unwrap()
                .push((node_id.to_string(), path_messages.len()));
            Ok(ThreadInfo {
                node_id: node_id.to_string(),
                context_len: path_messages.len(),
                documents: 0,
            })
        }

        async fn send_message(&self, _: &str, text: &str, _: &[Attachment]) -> Result<String> {
            if self.fail_send {
                return Err(ArborError::collaborator("model offline"));
            }
            Ok(format!("echo: {}", text))
        }

        async fn create_branch_thread(
            &self,
            source_id: &str,
            node_id: &str,
            documents: &[Attachment],
        ) -> Result<()> {
            self.branches.lock().unwrap().push((
                source_id.to_string(),
                node_id.to_string(),
                documents.to_vec(),
            ));
            Ok(())
        }

        async fn delete_thread(&self, node_id: &str) {
            self.released.lock().unwrap().push(node_id.to_string());
        }

        async fn generate_title(&self, recent: &[Message]) -> Result<String> {
            if let Some(delay) = self.title_delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail_title {
                return Err(ArborError::collaborator("summarizer offline"));
            }
            Ok(format!("Title of {}", recent.len()))
        }

        fn model_id(&self) -> String {
            "mock-model".to_string()
        }
    }

    // ============================================================================
    // Directory with slow activation
    // ============================================================================

    struct SlowActivation {
        inner: StoreWorkspaceDirectory,
        delay: Duration,
    }

    #[async_trait]
    impl WorkspaceDirectory for SlowActivation {
        async fn active_workspace_id(&self) -> String {
            self.inner.active_workspace_id().await
        }

        async fn active_workspace(&self) -> Option<WorkspaceMetadata> {
            self.inner.active_workspace().await
        }

        async fn list(&self) -> Vec<WorkspaceMetadata> {
            self.inner.list().await
        }

        async fn get_data(&self, workspace_id: &str) -> Result<Option<GraphSnapshot>> {
            self.inner.get_data(workspace_id).await
        }

        async fn save_data(&self, workspace_id: &str, snapshot: &GraphSnapshot) -> Result<bool> {
            self.inner.save_data(workspace_id, snapshot).await
        }

        async fn create(&self, name: &str) -> Result<String> {
            self.inner.create(name).await
        }

        async fn rename(&self, workspace_id: &str, name: &str) -> Result<bool> {
            self.inner.rename(workspace_id, name).await
        }

        async fn delete(&self, workspace_id: &str) -> Result<bool> {
            self.inner.delete(workspace_id).await
        }

        async fn set_active(&self, workspace_id: &str) -> Result<()> {
            tokio::time::sleep(self.delay).await;
            self.inner.set_active(workspace_id).await
        }
    }

    struct Fixture {
        manager: GraphManager,
        threads: Arc<MockThreads>,
        store: Arc<MemoryDurableStore>,
    }

    async fn fixture_with(threads: MockThreads, consent: bool) -> Fixture {
        fixture_in(threads, consent, None).await
    }

    async fn fixture_in(
        threads: MockThreads,
        consent: bool,
        activation_delay: Option<Duration>,
    ) -> Fixture {
        let threads = Arc::new(threads);
        let store = Arc::new(if consent {
            MemoryDurableStore::with_consent()
        } else {
            MemoryDurableStore::new()
        });
        let inner = StoreWorkspaceDirectory::in_memory(store.clone());
        let directory: Arc<dyn WorkspaceDirectory> = match activation_delay {
            Some(delay) => Arc::new(SlowActivation { inner, delay }),
            None => Arc::new(inner),
        };
        let manager = GraphManager::new(
            threads.clone(),
            directory,
            store.clone(),
            Arc::new(MemorySessionStore::new()),
            PersistenceConfig::default(),
        );
        manager.load_active_workspace().await.unwrap();
        Fixture {
            manager,
            threads,
            store,
        }
    }

    async fn fixture() -> Fixture {
        fixture_with(MockThreads::default(), true).await
    }

    #[tokio::test]
    async fn test_starts_with_root_in_default_workspace() {
        let f = fixture().await;
        assert_eq!(f.manager.workspace_id().await, "default");
        let state = f.manager.state().await;
        assert_eq!(state.nodes.len(), 1);
        assert_eq!(state.nodes[0].id, ROOT_NODE_ID);
    }

    #[tokio::test]
    async fn test_create_node_saves_immediately() {
        let f = fixture().await;
        let id = f
            .manager
            .create_node(ROOT_NODE_ID, "First", NodeKind::Response)
            .await
            .unwrap();

        let saved = f.store.get("workspace:default").await.unwrap().unwrap();
        assert!(saved.nodes.iter().any(|n| n.id == id));
    }

    #[tokio::test]
    async fn test_branch_seeds_thread_with_documents() {
        let f = fixture().await;
        let a = f
            .manager
            .create_node(ROOT_NODE_ID, "A", NodeKind::Response)
            .await
            .unwrap();
        let pdf = Attachment::new("spec.pdf", "application/pdf", "JVBERi0=");
        f.manager
            .append_message(&a, Message::user("read").with_attachments(vec![pdf.clone()]), false)
            .await;

        let b = f
            .manager
            .create_node(&a, "B", NodeKind::Branch)
            .await
            .unwrap();

        let branches = f.threads.branches.lock().unwrap().clone();
        assert_eq!(branches, vec![(a, b, vec![pdf])]);
    }

    #[tokio::test]
    async fn test_delete_releases_threads() {
        let f = fixture().await;
        let a = f
            .manager
            .create_node(ROOT_NODE_ID, "A", NodeKind::Response)
            .await
            .unwrap();
        let b = f
            .manager
            .create_node(&a, "B", NodeKind::Response)
            .await
            .unwrap();

        f.manager.delete_node(&a).await;
        let mut released = f.threads.released.lock().unwrap().clone();
        released.sort();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(released, expected);
        assert_eq!(f.manager.state().await.nodes.len(), 1);
    }

    #[tokio::test]
    async fn test_send_message_records_reply_and_title() {
        let f = fixture().await;
        let a = f
            .manager
            .create_node(ROOT_NODE_ID, "New Chat", NodeKind::Response)
            .await
            .unwrap();

        let reply = f.manager.send_message(&a, "hello", Vec::new()).await.unwrap();
        assert_eq!(reply.content, "echo: hello");
        assert_eq!(reply.model_id.as_deref(), Some("mock-model"));

        f.manager.settle().await;
        let state = f.manager.state().await;
        let node = state.node(&a).unwrap();
        assert_eq!(node.data.chat_history.len(), 2);
        assert_eq!(node.data.label, "Title of 2");
        assert_eq!(f.threads.contexts.lock().unwrap()[0], (a, 0));
    }

    #[tokio::test]
    async fn test_failed_send_becomes_error_message() {
        let threads = MockThreads {
            fail_send: true,
            fail_title: true,
            ..MockThreads::default()
        };
        let f = fixture_with(threads, true).await;
        let a = f
            .manager
            .create_node(ROOT_NODE_ID, "New Chat", NodeKind::Response)
            .await
            .unwrap();

        let reply = f.manager.send_message(&a, "hello", Vec::new()).await.unwrap();
        assert!(reply.is_error());
        assert_eq!(reply.model_id.as_deref(), Some(ERROR_MODEL_ID));
        assert!(reply.content.contains("model offline"));

        f.manager.settle().await;
        let state = f.manager.state().await;
        let node = state.node(&a).unwrap();
        assert_eq!(node.data.chat_history.len(), 2);
        assert!(node.data.label.starts_with("Error: "));
    }

    #[tokio::test]
    async fn test_send_to_unknown_node_is_not_found() {
        let f = fixture().await;
        let err = f
            .manager
            .send_message("ghost", "hi", Vec::new())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test(start_paused = true)]
    async fn test_label_changes_debounced_into_one_write() {
        let f = fixture().await;
        f.manager.set_label(ROOT_NODE_ID, "one").await;
        f.manager.set_label(ROOT_NODE_ID, "two").await;
        f.manager.set_label(ROOT_NODE_ID, "three").await;
        assert!(f.manager.persistence().is_saving("default"));
        assert!(f.store.get("workspace:default").await.unwrap().is_none());

        tokio::time::sleep(Duration::from_millis(300)).await;
        let saved = f.store.get("workspace:default").await.unwrap().unwrap();
        assert_eq!(saved.nodes[0].data.label, "three");
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_writes_pending_save() {
        let f = fixture().await;
        f.manager.set_label(ROOT_NODE_ID, "closing").await;
        f.manager.close().await;
        assert!(!f.manager.persistence().is_saving("default"));
        let saved = f.store.get("workspace:default").await.unwrap().unwrap();
        assert_eq!(saved.nodes[0].data.label, "closing");
    }

    #[tokio::test]
    async fn test_switch_workspace_flushes_outgoing() {
        let f = fixture().await;
        f.manager.set_label(ROOT_NODE_ID, "renamed").await;
        let other = f.manager.directory().create("Other").await.unwrap();

        f.manager.switch_workspace(&other).await.unwrap();
        assert_eq!(f.manager.workspace_id().await, other);
        assert_eq!(f.manager.state().await.nodes[0].data.label, "Start");

        let saved = f.store.get("workspace:default").await.unwrap().unwrap();
        assert_eq!(saved.nodes[0].data.label, "renamed");

        f.manager.switch_workspace("default").await.unwrap();
        assert_eq!(f.manager.state().await.nodes[0].data.label, "renamed");
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_title_during_switch_stays_in_outgoing_workspace() {
        let threads = MockThreads {
            title_delay: Some(Duration::from_millis(30)),
            ..MockThreads::default()
        };
        let f = fixture_in(threads, true, Some(Duration::from_millis(100))).await;
        let a = f
            .manager
            .create_node(ROOT_NODE_ID, "New Chat", NodeKind::Response)
            .await
            .unwrap();
        f.manager.send_message(&a, "hello", Vec::new()).await.unwrap();
        let other = f.manager.directory().create("Other").await.unwrap();

        // The title lands while the directory is still activating `other`.
        f.manager.switch_workspace(&other).await.unwrap();
        f.manager.settle().await;
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(f.manager.workspace_id().await, other);
        assert!(!f.manager.state().await.contains(&a));
        let saved = f.store.get("workspace:default").await.unwrap().unwrap();
        let node = saved.nodes.iter().find(|n| n.id == a).unwrap();
        assert_eq!(node.data.label, "Title of 2");
        assert_eq!(node.data.chat_history.len(), 2);
        let other_key = format!("workspace:{}", other);
        if let Some(saved) = f.store.get(&other_key).await.unwrap() {
            assert!(saved.nodes.iter().all(|n| n.id != a));
        }

        f.manager.switch_workspace("default").await.unwrap();
        assert_eq!(f.manager.state().await.node(&a).unwrap().data.label, "Title of 2");
    }

    #[tokio::test]
    async fn test_branch_send_uses_only_branch_history() {
        let f = fixture().await;
        let a = f
            .manager
            .create_node(ROOT_NODE_ID, "A", NodeKind::Response)
            .await
            .unwrap();
        let pdf = Attachment::new("spec.pdf", "application/pdf", "JVBERi0=");
        f.manager
            .send_message(&a, "read this", vec![pdf.clone()])
            .await
            .unwrap();
        let b = f
            .manager
            .create_node(&a, "B", NodeKind::Branch)
            .await
            .unwrap();
        let c = f
            .manager
            .create_node(&b, "C", NodeKind::Response)
            .await
            .unwrap();

        f.manager.send_message(&b, "fresh", Vec::new()).await.unwrap();
        f.manager.send_message(&c, "deeper", Vec::new()).await.unwrap();

        let contexts = f.threads.contexts.lock().unwrap().clone();
        assert_eq!(contexts[1], (b.clone(), 0));
        // Only the branch's own exchange, not the two messages on `a`.
        assert_eq!(contexts[2], (c, 2));

        // The branch thread is seeded at creation and again before its first send.
        let branches = f.threads.branches.lock().unwrap().clone();
        assert_eq!(branches.len(), 2);
        assert!(branches.iter().all(|(source, node, docs)| {
            source == &a && node == &b && docs == &vec![pdf.clone()]
        }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_current_workspace_discards_pending_save() {
        let f = fixture().await;
        f.manager.set_label(ROOT_NODE_ID, "doomed").await;
        let other = f.manager.directory().create("Other").await.unwrap();

        assert!(f.manager.delete_workspace("default").await.unwrap());
        assert_eq!(f.manager.workspace_id().await, other);
        f.manager.close().await;
        assert!(f.store.get("workspace:default").await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refused_delete_keeps_pending_save() {
        let f = fixture().await;
        f.manager.set_label(ROOT_NODE_ID, "kept").await;

        assert!(!f.manager.delete_workspace("default").await.unwrap());
        f.manager.close().await;
        let saved = f.store.get("workspace:default").await.unwrap().unwrap();
        assert_eq!(saved.nodes[0].data.label, "kept");
    }

    #[tokio::test]
    async fn test_switch_to_unknown_workspace_fails_without_swap() {
        let f = fixture().await;
        f.manager.set_label(ROOT_NODE_ID, "kept").await;
        assert!(f.manager.switch_workspace("missing").await.is_err());
        assert_eq!(f.manager.workspace_id().await, "default");
        assert_eq!(f.manager.state().await.nodes[0].data.label, "kept");
    }

    #[tokio::test]
    async fn test_export_import_reloads_graph() {
        let f = fixture().await;
        let a = f
            .manager
            .create_node(ROOT_NODE_ID, "Exported", NodeKind::Response)
            .await
            .unwrap();
        f.manager.set_active(Some(&a)).await;
        let blob = f.manager.export_all().await.unwrap();

        let g = fixture().await;
        assert!(g.manager.import_all(&blob).await.unwrap());
        assert_eq!(g.manager.active_node_id().await.as_deref(), Some(a.as_str()));
        assert_eq!(
            g.manager.active_path().await.node_ids,
            vec![ROOT_NODE_ID.to_string(), a.clone()]
        );
        assert_eq!(g.manager.path_edge_ids(&a).await.len(), 1);
    }

    #[tokio::test]
    async fn test_without_consent_session_copy_is_restored() {
        let f = fixture_with(MockThreads::default(), false).await;
        let a = f
            .manager
            .create_node(ROOT_NODE_ID, "Session only", NodeKind::Response)
            .await
            .unwrap();
        assert!(f.store.is_empty().await);

        f.manager.load_active_workspace().await.unwrap();
        assert!(f.manager.state().await.contains(&a));
    }
}
