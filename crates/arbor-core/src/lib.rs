//! Core domain of Arbor: the conversation graph, its snapshot format and
//! the contracts of the collaborators around it.

pub mod config;
pub mod error;
pub mod graph;
pub mod snapshot;
pub mod storage;
pub mod thread;
pub mod workspace;

// Re-export common error type
pub use error::ArborError;
