//! Portable export format shared by the durable stores.
//!
//! A bundle is JSON wrapped in standard base64 so it survives copy/paste
//! and clipboard round-trips.

use arbor_core::error::{ArborError, Result};
use arbor_core::snapshot::{GraphSnapshot, SNAPSHOT_VERSION};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Format tag identifying Arbor export bundles.
pub const BUNDLE_FORMAT: &str = "arbor-export";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportBundle {
    pub format: String,
    pub version: String,
    /// Epoch ms
    pub exported_at: i64,
    pub entries: BTreeMap<String, GraphSnapshot>,
}

impl ExportBundle {
    pub fn new(entries: BTreeMap<String, GraphSnapshot>) -> Self {
        Self {
            format: BUNDLE_FORMAT.to_string(),
            version: SNAPSHOT_VERSION.to_string(),
            exported_at: chrono::Utc::now().timestamp_millis(),
            entries,
        }
    }

    pub fn encode(&self) -> Result<String> {
        let json = serde_json::to_vec(self)?;
        Ok(BASE64_STANDARD.encode(json))
    }

    /// Decodes and validates a bundle.
    pub fn decode(blob: &str) -> Result<Self> {
        let bytes = BASE64_STANDARD.decode(blob.trim())?;
        let bundle: ExportBundle = serde_json::from_slice(&bytes)?;
        if bundle.format != BUNDLE_FORMAT {
            return Err(ArborError::Serialization {
                format: BUNDLE_FORMAT.to_string(),
                message: format!("unexpected bundle format '{}'", bundle.format),
            });
        }
        if bundle.version != SNAPSHOT_VERSION {
            tracing::warn!(
                bundle_version = %bundle.version,
                current = SNAPSHOT_VERSION,
                "[ExportBundle] Importing bundle from a different version"
            );
        }
        Ok(bundle)
    }
}
