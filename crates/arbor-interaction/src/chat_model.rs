//! Chat model abstraction used by the thread manager.

use arbor_core::error::Result;
use arbor_core::graph::Message;
use async_trait::async_trait;

/// A stateless completion endpoint: the full conversation goes in, one
/// reply comes out.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Completes `messages` and returns the reply text.
    async fn complete(&self, messages: &[Message]) -> Result<String>;

    /// Tag recorded as `modelId` on replies.
    fn model_id(&self) -> String;
}
