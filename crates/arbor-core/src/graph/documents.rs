//! Shared documents inherited by new branches.

use super::message::{Attachment, Message};
use std::collections::HashSet;

/// Whether an attachment of this MIME type is reference material a branch
/// should carry forward (as opposed to, say, an image in the conversation).
pub fn is_document_like(mime_type: &str) -> bool {
    let mime = mime_type.to_ascii_lowercase();
    mime == "application/pdf"
        || mime.starts_with("text/")
        || mime.contains("javascript")
        || mime.contains("python")
}

/// Collects document attachments along an ancestor path, de-duplicated by
/// `(name, type)` keeping the first occurrence.
pub fn inherited_documents(messages: &[Message]) -> Vec<Attachment> {
    let mut seen: HashSet<(&str, &str)> = HashSet::new();
    messages
        .iter()
        .flat_map(|m| m.attachments.iter())
        .filter(|a| is_document_like(&a.mime_type))
        .filter(|a| seen.insert((a.name.as_str(), a.mime_type.as_str())))
        .cloned()
        .collect()
}
