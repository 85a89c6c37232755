//! Thread collaborator contract.
//!
//! A thread is the model client's per-node conversational context. The
//! graph only tells the collaborator when threads come and go; it never
//! looks inside one.

use crate::error::Result;
use crate::graph::{Attachment, Message};
use async_trait::async_trait;

/// Identity of a live conversation thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadInfo {
    pub node_id: String,
    /// Number of messages the thread currently holds as context.
    pub context_len: usize,
    pub documents: usize,
}

#[async_trait]
pub trait ThreadCollaborator: Send + Sync {
    /// Returns the node's thread, creating it from `path_messages` when absent.
    async fn get_or_create_thread(
        &self,
        node_id: &str,
        path_messages: &[Message],
    ) -> Result<ThreadInfo>;

    /// Sends `text` on the node's thread and returns the model reply.
    async fn send_message(
        &self,
        node_id: &str,
        text: &str,
        attachments: &[Attachment],
    ) -> Result<String>;

    /// Seeds a thread for a new branch carrying the inherited documents.
    async fn create_branch_thread(
        &self,
        source_id: &str,
        node_id: &str,
        documents: &[Attachment],
    ) -> Result<()>;

    /// Releases the node's thread. Unknown nodes are ignored.
    async fn delete_thread(&self, node_id: &str);

    /// Summarizes recent messages into a short title.
    async fn generate_title(&self, recent: &[Message]) -> Result<String>;

    /// Tag recorded as `modelId` on replies.
    fn model_id(&self) -> String;
}
