//! Unified path management for arbor files.
//!
//! # Directory Structure
//!
//! ```text
//! ~/.config/arbor/             # Config directory
//! ├── config.toml              # Application configuration
//! └── logs/                    # Application logs
//!     └── arbor.log.YYYY-MM-DD
//!
//! ~/.local/share/arbor/        # Data directory
//! ├── workspaces.json          # Workspace index
//! ├── consent.json             # Durable storage consent
//! └── graphs/                  # Graph snapshots
//! ```
//!
//! Setting `ARBOR_HOME` places both trees under a single directory.

use arbor_core::error::{ArborError, Result};
use std::path::{Path, PathBuf};

const APP_DIR: &str = "arbor";
const HOME_ENV: &str = "ARBOR_HOME";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArborPaths {
    config_dir: PathBuf,
    data_dir: PathBuf,
}

impl ArborPaths {
    /// Resolves platform directories, honouring `ARBOR_HOME`.
    pub fn resolve() -> Result<Self> {
        if let Some(home) = std::env::var_os(HOME_ENV) {
            return Ok(Self::with_base(PathBuf::from(home)));
        }

        let config_dir = dirs::config_dir()
            .ok_or_else(|| ArborError::io("Cannot find config directory"))?
            .join(APP_DIR);
        let data_dir = dirs::data_dir()
            .ok_or_else(|| ArborError::io("Cannot find data directory"))?
            .join(APP_DIR);
        Ok(Self {
            config_dir,
            data_dir,
        })
    }

    /// Places config and data under `base`.
    pub fn with_base(base: impl AsRef<Path>) -> Self {
        let base = base.as_ref();
        Self {
            config_dir: base.join("config"),
            data_dir: base.join("data"),
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.config_dir.join("logs")
    }

    pub fn workspace_index_file(&self) -> PathBuf {
        self.data_dir.join("workspaces.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_base_layout() {
        let paths = ArborPaths::with_base("/tmp/arbor-test");
        assert!(paths.config_file().ends_with("config/config.toml"));
        assert!(paths.logs_dir().starts_with(paths.config_dir()));
        assert!(paths.workspace_index_file().starts_with(paths.data_dir()));
    }

    #[test]
    fn test_resolve_names_app_dir() {
        if std::env::var_os(HOME_ENV).is_some() {
            return;
        }
        if let Ok(paths) = ArborPaths::resolve() {
            assert!(paths.config_dir().ends_with(APP_DIR));
            assert!(paths.data_dir().ends_with(APP_DIR));
        }
    }
}
