//! In-process key-value store for the session tier.
//!
//! Behaves like a browser session store: contents live as long as the
//! process, and the store has a fixed byte capacity.

use arbor_core::error::{ArborError, Result};
use arbor_core::storage::KeyValueStore;
use std::collections::HashMap;
use std::sync::Mutex;

/// Default capacity, matching the common 5 MiB browser quota.
pub const DEFAULT_SESSION_CAPACITY: usize = 5 * 1024 * 1024;

/// Quota-limited in-memory [`KeyValueStore`].
pub struct MemorySessionStore {
    capacity: usize,
    entries: Mutex<HashMap<String, String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_SESSION_CAPACITY)
    }

    /// Creates a store that refuses writes once keys plus values exceed
    /// `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Bytes currently used by keys and values.
    pub fn used_bytes(&self) -> usize {
        self.lock()
            .map(|entries| usage(&entries))
            .unwrap_or(0)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|e| ArborError::storage(format!("Session store lock poisoned: {}", e)))
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

fn usage(entries: &HashMap<String, String>) -> usize {
    entries.iter().map(|(k, v)| k.len() + v.len()).sum()
}

impl KeyValueStore for MemorySessionStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.lock()?;
        // The previous value under this key still counts until replaced.
        let used = usage(&entries);
        let required = key.len() + value.len();
        let available = self.capacity.saturating_sub(used);

        if required > available {
            return Err(ArborError::QuotaExceeded {
                key: key.to_string(),
                required,
                available,
            });
        }

        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }
}
