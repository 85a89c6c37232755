//! Session tier: synchronous, size-limited, single slot.

use arbor_core::config::PersistenceConfig;
use arbor_core::error::Result;
use arbor_core::graph::GraphState;
use arbor_core::snapshot::GraphSnapshot;
use arbor_core::storage::KeyValueStore;
use std::sync::Arc;

/// What a session save did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionSaveOutcome {
    Saved { bytes: usize },
    /// The full snapshot was over the ceiling; a compacted copy was stored.
    Compacted { original_bytes: usize, bytes: usize },
    /// Even the compacted copy was over its ceiling. Nothing was written.
    TooLarge { original_bytes: usize, compacted_bytes: usize },
    /// The store refused the write after the retry.
    Failed { reason: String },
}

impl SessionSaveOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self, Self::Saved { .. } | Self::Compacted { .. })
    }
}

pub struct SessionTier {
    store: Arc<dyn KeyValueStore>,
    config: PersistenceConfig,
}

impl SessionTier {
    pub fn new(store: Arc<dyn KeyValueStore>, config: PersistenceConfig) -> Self {
        Self { store, config }
    }

    pub fn save(&self, state: &GraphState) -> SessionSaveOutcome {
        let snapshot = GraphSnapshot::capture(state);
        let json = match snapshot.to_json() {
            Ok(json) => json,
            Err(e) => {
                return SessionSaveOutcome::Failed {
                    reason: e.to_string(),
                };
            }
        };
        let original_bytes = json.len();

        if original_bytes <= self.config.session_ceiling_bytes {
            return match self.write(&json) {
                Ok(()) => SessionSaveOutcome::Saved {
                    bytes: original_bytes,
                },
                Err(e) => self.failed(e.to_string(), original_bytes),
            };
        }

        let compacted = snapshot.compacted(
            self.config.compact_content_chars,
            self.config.compact_attachment_chars,
        );
        let compacted_json = match compacted.to_json() {
            Ok(json) => json,
            Err(e) => return self.failed(e.to_string(), original_bytes),
        };
        let bytes = compacted_json.len();

        if bytes > self.config.compacted_ceiling_bytes {
            tracing::warn!(
                original_bytes,
                compacted_bytes = bytes,
                ceiling = self.config.compacted_ceiling_bytes,
                nodes = state.nodes.len(),
                messages = state.total_messages(),
                "[SessionTier] Snapshot too large even after compaction; previous session copy kept"
            );
            return SessionSaveOutcome::TooLarge {
                original_bytes,
                compacted_bytes: bytes,
            };
        }

        match self.write(&compacted_json) {
            Ok(()) => {
                tracing::info!(
                    original_bytes,
                    bytes,
                    "[SessionTier] Saved compacted snapshot"
                );
                SessionSaveOutcome::Compacted {
                    original_bytes,
                    bytes,
                }
            }
            Err(e) => self.failed(e.to_string(), bytes),
        }
    }

    /// Restores the graph saved in this tier, if any.
    pub fn restore(&self) -> Option<GraphState> {
        let json = match self.store.get(&self.config.session_key) {
            Ok(Some(json)) => json,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(error = %e, "[SessionTier] Failed to read session copy");
                return None;
            }
        };

        match GraphSnapshot::from_json(&json) {
            Ok(snapshot) => Some(snapshot.into_state()),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    bytes = json.len(),
                    "[SessionTier] Discarding unreadable session copy"
                );
                None
            }
        }
    }

    pub fn clear(&self) -> Result<()> {
        self.store.remove(&self.config.session_key)
    }

    /// Writes the entry, retrying once after clearing it when the store is full.
    fn write(&self, json: &str) -> Result<()> {
        let key = &self.config.session_key;
        match self.store.set(key, json) {
            Err(e) if e.is_capacity() => {
                tracing::warn!(
                    error = %e,
                    bytes = json.len(),
                    "[SessionTier] Quota exceeded; clearing previous entry and retrying"
                );
                self.store.remove(key)?;
                self.store.set(key, json)
            }
            other => other,
        }
    }

    fn failed(&self, reason: String, bytes: usize) -> SessionSaveOutcome {
        tracing::error!(bytes, reason = %reason, "[SessionTier] Session save failed");
        SessionSaveOutcome::Failed { reason }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_core::graph::{Attachment, Message, NodeKind, ROOT_NODE_ID};
    use arbor_infrastructure::storage::MemorySessionStore;

    fn tier_with(store: Arc<MemorySessionStore>, ceiling: usize) -> SessionTier {
        let config = PersistenceConfig {
            session_ceiling_bytes: ceiling,
            compacted_ceiling_bytes: ceiling,
            compact_content_chars: 10,
            compact_attachment_chars: 100,
            ..PersistenceConfig::default()
        };
        SessionTier::new(store, config)
    }

    fn graph_with_content(content: &str, attachment: usize) -> GraphState {
        let mut state = GraphState::new();
        let (id, _) = state.create_node_and_edge(ROOT_NODE_ID, "Chat", NodeKind::Response);
        let id = id.unwrap();
        let mut message = Message::user(content);
        if attachment > 0 {
            message = message.with_attachments(vec![Attachment::new(
                "big.bin",
                "application/octet-stream",
                "A".repeat(attachment),
            )]);
        }
        state.append_message(&id, message, false);
        state.set_active(Some(&id));
        state
    }

    #[test]
    fn test_small_graph_saved_and_restored() {
        let store = Arc::new(MemorySessionStore::new());
        let tier = tier_with(store, 1_000_000);
        let state = graph_with_content("hello", 0);

        assert!(matches!(tier.save(&state), SessionSaveOutcome::Saved { .. }));
        let restored = tier.restore().unwrap();
        assert_eq!(restored.nodes, state.nodes);
        assert_eq!(restored.active_path, state.active_path);
    }

    #[test]
    fn test_oversized_graph_compacted() {
        let store = Arc::new(MemorySessionStore::new());
        let state = graph_with_content(&"x".repeat(5_000), 5_000);
        let full = GraphSnapshot::capture(&state).to_json().unwrap().len();
        let tier = tier_with(store, full - 1);

        let outcome = tier.save(&state);
        assert!(matches!(outcome, SessionSaveOutcome::Compacted { .. }), "{:?}", outcome);

        let restored = tier.restore().unwrap();
        let message = &restored.nodes[1].data.chat_history[0];
        assert!(message.content.starts_with("xxxxxxxxxx"));
        assert!(message.content.len() < 100);
        assert!(message.attachments.is_empty());
    }

    #[test]
    fn test_too_large_keeps_previous_copy() {
        let store = Arc::new(MemorySessionStore::new());
        let small = graph_with_content("hi", 0);
        let small_len = GraphSnapshot::capture(&small).to_json().unwrap().len();
        let tier = tier_with(store, small_len + 100);
        assert!(tier.save(&small).is_written());

        let mut huge = graph_with_content("hi", 0);
        for i in 0..20 {
            huge.create_node_and_edge(ROOT_NODE_ID, &format!("node {}", i), NodeKind::Branch);
        }
        let outcome = tier.save(&huge);
        assert!(matches!(outcome, SessionSaveOutcome::TooLarge { .. }), "{:?}", outcome);
        assert_eq!(tier.restore().unwrap().nodes, small.nodes);
    }

    #[test]
    fn test_quota_retry_after_clearing_prior_entry() {
        let first = graph_with_content("a", 0);
        let second = graph_with_content("b", 0);
        let first_len = GraphSnapshot::capture(&first).to_json().unwrap().len();
        let key_len = PersistenceConfig::default().session_key.len();

        // Room for one copy but not two.
        let store = Arc::new(MemorySessionStore::with_capacity(key_len + first_len + 50));
        let tier = tier_with(store.clone(), 1_000_000);

        assert!(tier.save(&first).is_written());
        assert!(tier.save(&second).is_written());
        assert_eq!(tier.restore().unwrap().nodes, second.nodes);
    }

    #[test]
    fn test_store_full_reports_failed() {
        let store = Arc::new(MemorySessionStore::with_capacity(10));
        let tier = tier_with(store, 1_000_000);
        let outcome = tier.save(&GraphState::new());
        assert!(matches!(outcome, SessionSaveOutcome::Failed { .. }));
        assert!(tier.restore().is_none());
    }

    #[test]
    fn test_unreadable_copy_ignored() {
        let store = Arc::new(MemorySessionStore::new());
        store
            .set(&PersistenceConfig::default().session_key, "{not json")
            .unwrap();
        let tier = tier_with(store, 1_000_000);
        assert!(tier.restore().is_none());
    }
}
