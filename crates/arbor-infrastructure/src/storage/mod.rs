//! Storage backends for the session and workspace tiers.

pub mod atomic_json;
pub mod bundle;
pub mod file_store;
pub mod memory_store;
pub mod session_store;

pub use atomic_json::AtomicJsonFile;
pub use bundle::{BUNDLE_FORMAT, ExportBundle};
pub use file_store::FileDurableStore;
pub use memory_store::MemoryDurableStore;
pub use session_store::{DEFAULT_SESSION_CAPACITY, MemorySessionStore};
