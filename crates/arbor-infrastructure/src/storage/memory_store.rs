//! In-memory durable store, used in tests and with `--ephemeral`.

use super::bundle::ExportBundle;
use arbor_core::error::Result;
use arbor_core::snapshot::GraphSnapshot;
use arbor_core::storage::DurableStore;
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// [`DurableStore`] backed by a map. Consent is tracked like the file store.
#[derive(Default)]
pub struct MemoryDurableStore {
    entries: RwLock<BTreeMap<String, GraphSnapshot>>,
    consent: RwLock<Option<bool>>,
}

impl MemoryDurableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that starts with consent already granted.
    pub fn with_consent() -> Self {
        Self {
            entries: RwLock::default(),
            consent: RwLock::new(Some(true)),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl DurableStore for MemoryDurableStore {
    async fn get(&self, key: &str) -> Result<Option<GraphSnapshot>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, snapshot: &GraphSnapshot) -> Result<bool> {
        if !self.has_consent().await {
            return Ok(false);
        }
        self.entries
            .write()
            .await
            .insert(key.to_string(), snapshot.clone());
        Ok(true)
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn has_consent(&self) -> bool {
        *self.consent.read().await == Some(true)
    }

    async fn needs_consent(&self) -> bool {
        self.consent.read().await.is_none()
    }

    async fn set_consent(&self, granted: bool) -> Result<()> {
        *self.consent.write().await = Some(granted);
        Ok(())
    }

    async fn export_all(&self) -> Result<String> {
        let entries = self.entries.read().await.clone();
        ExportBundle::new(entries).encode()
    }

    async fn import_all(&self, blob: &str) -> Result<bool> {
        match ExportBundle::decode(blob) {
            Ok(bundle) => {
                *self.entries.write().await = bundle.entries;
                Ok(true)
            }
            Err(e) => {
                tracing::warn!(error = %e, "[MemoryDurableStore] Rejected import");
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_core::graph::GraphState;

    #[tokio::test]
    async fn test_consent_gates_writes() {
        let store = MemoryDurableStore::new();
        let snapshot = GraphSnapshot::capture(&GraphState::new());
        assert!(store.needs_consent().await);
        assert!(!store.set("k", &snapshot).await.unwrap());

        store.set_consent(true).await.unwrap();
        assert!(store.set("k", &snapshot).await.unwrap());
        assert_eq!(store.len().await, 1);

        store.set_consent(false).await.unwrap();
        assert!(!store.needs_consent().await);
        assert!(!store.set("other", &snapshot).await.unwrap());
    }

    #[tokio::test]
    async fn test_import_replaces_entries() {
        let source = MemoryDurableStore::with_consent();
        let snapshot = GraphSnapshot::capture(&GraphState::new());
        source.set("a", &snapshot).await.unwrap();
        let blob = source.export_all().await.unwrap();

        let target = MemoryDurableStore::with_consent();
        target.set("b", &snapshot).await.unwrap();
        assert!(target.import_all(&blob).await.unwrap());
        assert!(target.get("a").await.unwrap().is_some());
        assert!(target.get("b").await.unwrap().is_none());
    }
}
