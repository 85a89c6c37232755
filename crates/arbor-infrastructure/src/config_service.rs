//! Configuration service.
//!
//! Loads [`ArborConfig`] from `config.toml`, writing a default file when none
//! exists, and caches the result.

use arbor_core::config::ArborConfig;
use arbor_core::error::{ArborError, Result};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone)]
pub struct ConfigService {
    path: PathBuf,
    config: Arc<RwLock<Option<ArborConfig>>>,
}

impl ConfigService {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            config: Arc::new(RwLock::new(None)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the configuration, loading it on first access.
    pub fn get_config(&self) -> Result<ArborConfig> {
        {
            let cached = self
                .config
                .read()
                .map_err(|e| ArborError::internal(format!("Config lock poisoned: {}", e)))?;
            if let Some(config) = cached.as_ref() {
                return Ok(config.clone());
            }
        }

        let loaded = self.load_or_create()?;
        let mut cached = self
            .config
            .write()
            .map_err(|e| ArborError::internal(format!("Config lock poisoned: {}", e)))?;
        *cached = Some(loaded.clone());
        Ok(loaded)
    }

    /// Forces a reload on next access.
    pub fn invalidate_cache(&self) {
        if let Ok(mut cached) = self.config.write() {
            *cached = None;
        }
    }

    fn load_or_create(&self) -> Result<ArborConfig> {
        if !self.path.exists() {
            let config = ArborConfig::default();
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&self.path, toml::to_string_pretty(&config)?)?;
            tracing::info!(path = %self.path.display(), "[ConfigService] Wrote default config");
            return Ok(config);
        }

        let content = std::fs::read_to_string(&self.path)?;
        let config: ArborConfig = toml::from_str(&content).map_err(|e| {
            ArborError::config(format!("Invalid {}: {}", self.path.display(), e))
        })?;
        tracing::debug!(path = %self.path.display(), "[ConfigService] Loaded config");
        Ok(config)
    }
}
