//! Application layer: the graph command interface and persistence
//! orchestration.

pub mod coalesce;
pub mod manager;
pub mod persistence;

pub use coalesce::CoalescingTask;
pub use manager::GraphManager;
pub use persistence::{LiveGraph, LoadOutcome, PersistenceCoordinator, SessionSaveOutcome};
