//! File-backed durable snapshot store.
//!
//! Directory structure:
//! ```text
//! base_dir/
//! ├── graphs/
//! │   ├── <encoded key>.json
//! │   └── <encoded key>.json
//! └── consent.json
//! ```
//!
//! Keys are encoded with URL-safe base64 so any key maps to a valid file name.

use super::atomic_json::AtomicJsonFile;
use super::bundle::ExportBundle;
use arbor_core::error::{ArborError, Result};
use arbor_core::snapshot::GraphSnapshot;
use arbor_core::storage::DurableStore;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ConsentRecord {
    granted: Option<bool>,
    updated_at: Option<String>,
}

/// [`DurableStore`] writing one atomic JSON file per key.
pub struct FileDurableStore {
    graphs_dir: PathBuf,
    consent_file: PathBuf,
    /// Largest serialized snapshot accepted, if limited.
    max_entry_bytes: Option<usize>,
    consent: Mutex<Option<bool>>,
}

impl FileDurableStore {
    /// Opens (creating if needed) a store rooted at `base_dir`.
    pub async fn new(base_dir: impl AsRef<Path>) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        let graphs_dir = base_dir.join("graphs");
        fs::create_dir_all(&graphs_dir).await?;

        let consent_file = base_dir.join("consent.json");
        let consent = {
            let path = consent_file.clone();
            tokio::task::spawn_blocking(move || AtomicJsonFile::<ConsentRecord>::new(path).load())
                .await
                .map_err(|e| ArborError::internal(format!("Failed to join task: {}", e)))??
                .and_then(|record| record.granted)
        };

        tracing::debug!(
            graphs_dir = %graphs_dir.display(),
            consent = ?consent,
            "[FileDurableStore] Opened"
        );

        Ok(Self {
            graphs_dir,
            consent_file,
            max_entry_bytes: None,
            consent: Mutex::new(consent),
        })
    }

    /// Refuses snapshots whose serialized form exceeds `bytes`.
    pub fn with_max_entry_bytes(mut self, bytes: usize) -> Self {
        self.max_entry_bytes = Some(bytes);
        self
    }

    pub fn graphs_dir(&self) -> &Path {
        &self.graphs_dir
    }

    fn entry_file(&self, key: &str) -> AtomicJsonFile<GraphSnapshot> {
        let name = format!("{}.json", URL_SAFE_NO_PAD.encode(key));
        AtomicJsonFile::new(self.graphs_dir.join(name))
    }

    fn key_from_file_name(file_name: &str) -> Option<String> {
        let encoded = file_name.strip_suffix(".json")?;
        let bytes = URL_SAFE_NO_PAD.decode(encoded).ok()?;
        String::from_utf8(bytes).ok()
    }

    async fn stored_keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut dir = fs::read_dir(&self.graphs_dir).await?;
        while let Some(entry) = dir.next_entry().await? {
            let file_name = entry.file_name().to_string_lossy().to_string();
            if file_name.starts_with('.') {
                continue;
            }
            match Self::key_from_file_name(&file_name) {
                Some(key) => keys.push(key),
                None => tracing::debug!(file_name, "[FileDurableStore] Skipping foreign file"),
            }
        }
        keys.sort();
        Ok(keys)
    }
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ArborError::internal(format!("Failed to join task: {}", e)))?
}

#[async_trait]
impl DurableStore for FileDurableStore {
    async fn get(&self, key: &str) -> Result<Option<GraphSnapshot>> {
        let file = self.entry_file(key);
        blocking(move || file.load()).await
    }

    async fn set(&self, key: &str, snapshot: &GraphSnapshot) -> Result<bool> {
        if !self.has_consent().await {
            tracing::debug!(key, "[FileDurableStore] No consent; write skipped");
            return Ok(false);
        }

        let json = snapshot.to_json()?;
        if let Some(limit) = self.max_entry_bytes
            && json.len() > limit
        {
            tracing::warn!(
                key,
                size = json.len(),
                limit,
                "[FileDurableStore] Snapshot exceeds entry limit; write refused"
            );
            return Ok(false);
        }

        let size = json.len();
        let file = self.entry_file(key);
        blocking(move || file.save_raw(&json)).await?;
        tracing::debug!(key, size, "[FileDurableStore] Saved");
        Ok(true)
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let file = self.entry_file(key);
        blocking(move || file.remove()).await
    }

    async fn has_consent(&self) -> bool {
        *self.consent.lock().await == Some(true)
    }

    async fn needs_consent(&self) -> bool {
        self.consent.lock().await.is_none()
    }

    async fn set_consent(&self, granted: bool) -> Result<()> {
        let mut consent = self.consent.lock().await;
        let file = AtomicJsonFile::<ConsentRecord>::new(self.consent_file.clone());
        let record = ConsentRecord {
            granted: Some(granted),
            updated_at: Some(chrono::Utc::now().to_rfc3339()),
        };
        blocking(move || file.save(&record)).await?;
        *consent = Some(granted);
        tracing::info!(granted, "[FileDurableStore] Consent updated");
        Ok(())
    }

    async fn export_all(&self) -> Result<String> {
        let mut entries = BTreeMap::new();
        for key in self.stored_keys().await? {
            if let Some(snapshot) = self.get(&key).await? {
                entries.insert(key, snapshot);
            }
        }
        tracing::info!(entries = entries.len(), "[FileDurableStore] Exported");
        ExportBundle::new(entries).encode()
    }

    async fn import_all(&self, blob: &str) -> Result<bool> {
        let bundle = match ExportBundle::decode(blob) {
            Ok(bundle) => bundle,
            Err(e) => {
                tracing::warn!(error = %e, "[FileDurableStore] Rejected import");
                return Ok(false);
            }
        };

        for key in self.stored_keys().await? {
            if !bundle.entries.contains_key(&key) {
                self.remove(&key).await?;
            }
        }
        for (key, snapshot) in &bundle.entries {
            let json = snapshot.to_json()?;
            let file = self.entry_file(key);
            blocking(move || file.save_raw(&json)).await?;
        }

        tracing::info!(entries = bundle.entries.len(), "[FileDurableStore] Imported");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_core::graph::{GraphState, NodeKind, ROOT_NODE_ID};
    use tempfile::TempDir;

    fn snapshot_with_child() -> GraphSnapshot {
        let mut state = GraphState::new();
        let (id, _) = state.create_node_and_edge(ROOT_NODE_ID, "Child", NodeKind::Response);
        state.set_active(id.as_deref());
        GraphSnapshot::capture(&state)
    }

    #[tokio::test]
    async fn test_writes_skipped_without_consent() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileDurableStore::new(temp_dir.path()).await.unwrap();
        assert!(store.needs_consent().await);

        let saved = store.set("workspace:a", &snapshot_with_child()).await.unwrap();
        assert!(!saved);
        assert!(store.get("workspace:a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_consent_persists_across_instances() {
        let temp_dir = TempDir::new().unwrap();
        {
            let store = FileDurableStore::new(temp_dir.path()).await.unwrap();
            store.set_consent(true).await.unwrap();
        }
        let store = FileDurableStore::new(temp_dir.path()).await.unwrap();
        assert!(store.has_consent().await);
        assert!(!store.needs_consent().await);
    }

    #[tokio::test]
    async fn test_set_get_remove() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileDurableStore::new(temp_dir.path()).await.unwrap();
        store.set_consent(true).await.unwrap();

        let snapshot = snapshot_with_child();
        assert!(store.set("workspace:a", &snapshot).await.unwrap());
        assert_eq!(store.get("workspace:a").await.unwrap(), Some(snapshot));

        store.remove("workspace:a").await.unwrap();
        assert!(store.get("workspace:a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_oversized_entry_leaves_prior_state() {
        let temp_dir = TempDir::new().unwrap();
        let small = GraphSnapshot::capture(&GraphState::new());
        let limit = small.to_json().unwrap().len() + 10;
        let store = FileDurableStore::new(temp_dir.path())
            .await
            .unwrap()
            .with_max_entry_bytes(limit);
        store.set_consent(true).await.unwrap();

        assert!(store.set("k", &small).await.unwrap());
        assert!(!store.set("k", &snapshot_with_child()).await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some(small));
    }

    #[tokio::test]
    async fn test_export_import_round_trip() {
        let source_dir = TempDir::new().unwrap();
        let source = FileDurableStore::new(source_dir.path()).await.unwrap();
        source.set_consent(true).await.unwrap();
        let snapshot = snapshot_with_child();
        source.set("workspace:a", &snapshot).await.unwrap();

        let blob = source.export_all().await.unwrap();

        let target_dir = TempDir::new().unwrap();
        let target = FileDurableStore::new(target_dir.path()).await.unwrap();
        target.set_consent(true).await.unwrap();
        target.set("workspace:stale", &snapshot).await.unwrap();

        assert!(target.import_all(&blob).await.unwrap());
        let restored = target.get("workspace:a").await.unwrap().unwrap().into_state();
        let original = snapshot.into_state();
        assert_eq!(restored.nodes, original.nodes);
        assert_eq!(restored.edges, original.edges);
        assert_eq!(restored.active_node_id, original.active_node_id);
        assert!(target.get("workspace:stale").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_import_rejects_malformed_blob() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileDurableStore::new(temp_dir.path()).await.unwrap();
        store.set_consent(true).await.unwrap();
        store.set("k", &snapshot_with_child()).await.unwrap();

        assert!(!store.import_all("%%%").await.unwrap());
        assert!(store.get("k").await.unwrap().is_some());
    }
}
