//! Storage collaborator traits.
//!
//! Two tiers sit behind these traits: a synchronous session key-value store
//! with a hard capacity, and an asynchronous durable store whose writes are
//! gated on user consent.

use crate::error::Result;
use crate::snapshot::GraphSnapshot;
use async_trait::async_trait;

/// Synchronous key-value storage for the session tier.
///
/// Implementations report a full store as
/// [`ArborError::QuotaExceeded`](crate::error::ArborError::QuotaExceeded)
/// rather than panicking, so callers can free space and retry.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Removes a key. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<()>;
}

/// Durable, cross-session snapshot storage.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Finds the snapshot stored under `key`.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(snapshot))`: Snapshot found
    /// - `Ok(None)`: Nothing stored under this key
    /// - `Err(_)`: The stored data could not be read
    async fn get(&self, key: &str) -> Result<Option<GraphSnapshot>>;

    /// Stores a snapshot.
    ///
    /// Returns `Ok(false)` when the write was skipped (no consent) or
    /// refused (capacity). Prior contents are left untouched in both cases.
    async fn set(&self, key: &str, snapshot: &GraphSnapshot) -> Result<bool>;

    async fn remove(&self, key: &str) -> Result<()>;

    /// Whether the user has agreed to durable storage.
    async fn has_consent(&self) -> bool;

    /// Whether the user has not yet been asked.
    async fn needs_consent(&self) -> bool;

    async fn set_consent(&self, granted: bool) -> Result<()>;

    /// Serializes every stored entry to a portable blob.
    async fn export_all(&self) -> Result<String>;

    /// Validates `blob` and replaces the stored entries with its contents.
    ///
    /// Returns `Ok(false)` when the blob is malformed; nothing is replaced.
    async fn import_all(&self, blob: &str) -> Result<bool>;
}
