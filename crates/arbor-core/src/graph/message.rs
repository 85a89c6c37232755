//! Conversation message types.
//!
//! This module contains the per-node message history entries and their
//! attachments, in the JSON shape the graph renderer exchanges.

use serde::{Deserialize, Serialize};

/// `model_id` recorded on the synthetic model message that replaces a failed send.
pub const ERROR_MODEL_ID: &str = "error";

/// Represents the author of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Message typed by the user.
    User,
    /// Message produced by the model (or an error surrogate).
    Model,
}

/// A file attached to a message.
///
/// `data` carries the base64 payload. `preview` is a runtime handle (for
/// example an object URL held by the UI) and is never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    #[serde(rename = "type")]
    pub mime_type: String,
    pub data: String,
    #[serde(skip)]
    pub preview: Option<String>,
}

impl Attachment {
    pub fn new(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        data: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            data: data.into(),
            preview: None,
        }
    }
}

/// A single message in a node's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    /// Opaque tag of the model that produced this message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
}

impl Message {
    /// Creates a user message with no attachments.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            attachments: Vec::new(),
            model_id: None,
        }
    }

    /// Creates a model message tagged with the producing model.
    pub fn model(content: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Model,
            content: content.into(),
            attachments: Vec::new(),
            model_id: Some(model_id.into()),
        }
    }

    /// Creates the visible surrogate for a failed model invocation.
    pub fn error(content: impl Into<String>) -> Self {
        Self::model(content, ERROR_MODEL_ID)
    }

    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }

    pub fn is_error(&self) -> bool {
        self.model_id.as_deref() == Some(ERROR_MODEL_ID)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_json_shape() {
        let message = Message::model("hi", "gpt-4o");
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["role"], "model");
        assert_eq!(json["modelId"], "gpt-4o");
        assert!(json.get("attachments").is_none());
    }

    #[test]
    fn test_attachment_preview_not_persisted() {
        let mut attachment = Attachment::new("spec.pdf", "application/pdf", "AAAA");
        attachment.preview = Some("blob:123".to_string());
        let json = serde_json::to_string(&attachment).unwrap();
        assert!(!json.contains("blob:123"));
        assert!(json.contains("\"type\":\"application/pdf\""));

        let restored: Attachment = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.preview, None);
    }

    #[test]
    fn test_error_surrogate() {
        let message = Message::error("Error: timeout");
        assert_eq!(message.role, MessageRole::Model);
        assert!(message.is_error());
    }
}
