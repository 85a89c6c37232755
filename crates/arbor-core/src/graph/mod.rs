//! Conversation graph domain module.
//!
//! # Module Structure
//!
//! - `model`: nodes, edges and the root record
//! - `message`: per-node messages and attachments
//! - `index`: path resolution over the edge list
//! - `state`: the owned graph state, commands and effects
//! - `mutator`: structural edits (create, delete, reset, raw deltas)
//! - `ledger`: message history operations
//! - `documents`: document inheritance for branches
//! - `active_path`: focused node tracking

mod active_path;
mod documents;
mod index;
mod ledger;
mod message;
mod model;
mod mutator;
mod state;

pub use active_path::ActivePath;
pub use documents::{inherited_documents, is_document_like};
pub use index::{GraphIndex, conversation_context, path_edge_ids, path_messages, path_node_ids};
pub use ledger::{FALLBACK_TITLE_CHARS, TITLE_CONTEXT_MESSAGES, fallback_title};
pub use message::{Attachment, ERROR_MODEL_ID, Message, MessageRole};
pub use model::{
    DEFAULT_NODE_LABEL, Edge, Node, NodeData, NodeKind, Position, ROOT_LABEL, ROOT_NODE_ID,
};
pub use state::{Command, EdgeChange, Effect, GraphState, NodeChange, Outcome, SaveMode};
