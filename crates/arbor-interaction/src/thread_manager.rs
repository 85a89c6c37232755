//! Per-node conversation threads over a [`ChatModel`].
//!
//! A thread is created lazily the first time a node is used. Its context is
//! the message history along the path from the root, and branch threads
//! additionally carry the documents inherited from their source path. The
//! documents ride along with the first message sent on the thread.
//!
//! A branch thread starts with an empty history: the path it hangs from is
//! never used as context, only the documents collected from it.

use crate::chat_model::ChatModel;
use arbor_core::error::{ArborError, Result};
use arbor_core::graph::{Attachment, Message, MessageRole, inherited_documents};
use arbor_core::thread::{ThreadCollaborator, ThreadInfo};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

const TITLE_PROMPT: &str = "Summarize the conversation below as a short title of at most six words. \
Reply with the title only, without quotes or punctuation at the end.";

/// Longest title accepted from the model.
const MAX_TITLE_CHARS: usize = 60;

#[derive(Debug, Clone, Default)]
struct Thread {
    history: Vec<Message>,
    /// Documents not yet delivered to the model.
    pending_documents: Vec<Attachment>,
    /// Set once the history has been seeded from the graph path.
    seeded: bool,
}

impl Thread {
    fn info(&self, node_id: &str) -> ThreadInfo {
        ThreadInfo {
            node_id: node_id.to_string(),
            context_len: self.history.len(),
            documents: self.pending_documents.len(),
        }
    }
}

/// [`ThreadCollaborator`] keeping one in-memory thread per node.
pub struct ThreadManager<M: ?Sized> {
    model: Arc<M>,
    threads: RwLock<HashMap<String, Thread>>,
}

impl<M: ChatModel + ?Sized> ThreadManager<M> {
    pub fn new(model: Arc<M>) -> Self {
        Self {
            model,
            threads: RwLock::new(HashMap::new()),
        }
    }

    pub async fn thread_count(&self) -> usize {
        self.threads.read().await.len()
    }

    pub async fn has_thread(&self, node_id: &str) -> bool {
        self.threads.read().await.contains_key(node_id)
    }
}

/// Error surrogates never reach the model as context.
fn context_messages(messages: &[Message]) -> Vec<Message> {
    messages.iter().filter(|m| !m.is_error()).cloned().collect()
}

fn transcript(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| {
            let speaker = match m.role {
                MessageRole::User => "User",
                MessageRole::Model => "Assistant",
            };
            format!("{}: {}", speaker, m.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn clean_title(raw: &str) -> Option<String> {
    let line = raw.lines().find(|l| !l.trim().is_empty())?;
    let title = line
        .trim()
        .trim_matches(|c| c == '"' || c == '\'' || c == '*')
        .trim_end_matches('.')
        .trim();
    if title.is_empty() {
        return None;
    }
    Some(title.chars().take(MAX_TITLE_CHARS).collect())
}

#[async_trait]
impl<M: ChatModel + ?Sized + 'static> ThreadCollaborator for ThreadManager<M> {
    async fn get_or_create_thread(
        &self,
        node_id: &str,
        path_messages: &[Message],
    ) -> Result<ThreadInfo> {
        let mut threads = self.threads.write().await;
        let thread = threads.entry(node_id.to_string()).or_default();
        if !thread.seeded {
            thread.history = context_messages(path_messages);
            if thread.pending_documents.is_empty() {
                thread.pending_documents = inherited_documents(path_messages);
            }
            thread.seeded = true;
            tracing::debug!(
                node_id,
                context_len = thread.history.len(),
                documents = thread.pending_documents.len(),
                "[ThreadManager] Seeded thread"
            );
        }
        Ok(thread.info(node_id))
    }

    async fn send_message(
        &self,
        node_id: &str,
        text: &str,
        attachments: &[Attachment],
    ) -> Result<String> {
        let (request, delivered_documents) = {
            let threads = self.threads.read().await;
            let thread = threads
                .get(node_id)
                .ok_or_else(|| ArborError::not_found("Thread", node_id))?;

            let mut outgoing = attachments.to_vec();
            for document in &thread.pending_documents {
                if !outgoing
                    .iter()
                    .any(|a| a.name == document.name && a.mime_type == document.mime_type)
                {
                    outgoing.push(document.clone());
                }
            }

            let mut request = thread.history.clone();
            request.push(Message::user(text).with_attachments(outgoing));
            (request, !thread.pending_documents.is_empty())
        };

        let reply = self.model.complete(&request).await?;

        let mut threads = self.threads.write().await;
        if let Some(thread) = threads.get_mut(node_id) {
            if let Some(user) = request.last() {
                thread.history.push(user.clone());
            }
            thread
                .history
                .push(Message::model(reply.clone(), self.model.model_id()));
            if delivered_documents {
                thread.pending_documents.clear();
            }
        } else {
            tracing::debug!(node_id, "[ThreadManager] Thread released during send");
        }
        Ok(reply)
    }

    async fn create_branch_thread(
        &self,
        source_id: &str,
        node_id: &str,
        documents: &[Attachment],
    ) -> Result<()> {
        let mut threads = self.threads.write().await;
        let thread = threads.entry(node_id.to_string()).or_default();
        thread.pending_documents = documents.to_vec();
        thread.seeded = true;
        tracing::debug!(
            source_id,
            node_id,
            documents = documents.len(),
            "[ThreadManager] Created branch thread"
        );
        Ok(())
    }

    async fn delete_thread(&self, node_id: &str) {
        if self.threads.write().await.remove(node_id).is_some() {
            tracing::debug!(node_id, "[ThreadManager] Released thread");
        }
    }

    async fn generate_title(&self, recent: &[Message]) -> Result<String> {
        let prompt = format!("{}\n\n{}", TITLE_PROMPT, transcript(&context_messages(recent)));
        let raw = self.model.complete(&[Message::user(prompt)]).await?;
        clean_title(&raw).ok_or_else(|| ArborError::collaborator("Model returned an empty title"))
    }

    fn model_id(&self) -> String {
        self.model.model_id()
    }
}
