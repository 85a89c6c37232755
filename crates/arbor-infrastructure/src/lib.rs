//! Storage, configuration and path handling for arbor.

pub mod config_service;
pub mod paths;
pub mod storage;
pub mod workspace_directory;

pub use config_service::ConfigService;
pub use paths::ArborPaths;
pub use workspace_directory::{StoreWorkspaceDirectory, workspace_key};
