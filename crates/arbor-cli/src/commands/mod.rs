pub mod chat;
pub mod consent;
pub mod graph;
pub mod transfer;
pub mod workspace;
