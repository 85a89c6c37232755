//! Configuration model.
//!
//! Loaded from `config.toml` by the infrastructure layer. Every field has a
//! default so a partial file is valid.

use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct ArborConfig {
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub model: ModelConfig,
}

/// Limits and timings of the persistence coordinator.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Debounce window for workspace saves.
    pub debounce_ms: u64,
    /// Largest serialized snapshot the session tier accepts as-is.
    pub session_ceiling_bytes: usize,
    /// Largest compacted snapshot the session tier accepts.
    pub compacted_ceiling_bytes: usize,
    /// Message content longer than this is truncated by compaction.
    pub compact_content_chars: usize,
    /// Attachments with more base64 data than this are dropped by compaction.
    pub compact_attachment_chars: usize,
    /// Key of the session-tier entry.
    pub session_key: String,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 200,
            session_ceiling_bytes: 4_718_592, // 4.5 MiB
            compacted_ceiling_bytes: 4_718_592,
            compact_content_chars: 10_000,
            compact_attachment_chars: 100_000,
            session_key: "arbor.graph".to_string(),
        }
    }
}

/// OpenAI-compatible chat endpoint used by the CLI.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    pub base_url: String,
    pub model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub max_tokens: Option<u32>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            max_tokens: None,
        }
    }
}
