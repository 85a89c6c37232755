//! OpenAiChatModel - Chat Completions REST client.
//!
//! Works against any OpenAI-compatible endpoint. Attachments are sent as
//! image data URLs when they are images and inlined as text when they
//! decode as UTF-8; anything else is announced by name only.

use crate::chat_model::ChatModel;
use arbor_core::config::ModelConfig;
use arbor_core::error::{ArborError, Result};
use arbor_core::graph::{Attachment, Message, MessageRole};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Clone)]
pub struct OpenAiChatModel {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: Option<u32>,
}

impl OpenAiChatModel {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: ModelConfig::default().base_url,
            api_key: api_key.into(),
            model: model.into(),
            max_tokens: None,
        }
    }

    /// Builds a client from config, reading the key from `api_key_env`.
    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        let api_key = env::var(&config.api_key_env).map_err(|_| {
            ArborError::config(format!("{} is not set", config.api_key_env))
        })?;
        let mut model = Self::new(api_key, &config.model).with_base_url(&config.base_url);
        model.max_tokens = config.max_tokens;
        Ok(model)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    async fn send_request(&self, body: &ChatCompletionRequest) -> Result<String> {
        let response = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|err| ArborError::collaborator(format!("Chat request failed: {err}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            return Err(map_http_error(status, &body_text));
        }

        let parsed: ChatCompletionResponse = response.json().await.map_err(|err| {
            ArborError::collaborator(format!("Failed to parse chat response: {err}"))
        })?;

        extract_text_response(parsed)
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    async fn complete(&self, messages: &[Message]) -> Result<String> {
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: messages.iter().map(to_chat_message).collect(),
            max_tokens: self.max_tokens,
        };
        tracing::debug!(
            model = %self.model,
            messages = request.messages.len(),
            "[OpenAiChatModel] Sending request"
        );
        self.send_request(&request).await
    }

    fn model_id(&self) -> String {
        self.model.clone()
    }
}

fn to_chat_message(message: &Message) -> ChatMessage {
    let role = match message.role {
        MessageRole::User => "user",
        MessageRole::Model => "assistant",
    };

    let mut content = Vec::with_capacity(1 + message.attachments.len());
    if !message.content.trim().is_empty() {
        content.push(MessageContent::Text {
            text: message.content.clone(),
        });
    }
    content.extend(message.attachments.iter().map(attachment_to_content));

    ChatMessage {
        role: role.to_string(),
        content,
    }
}

fn attachment_to_content(attachment: &Attachment) -> MessageContent {
    if attachment.mime_type.starts_with("image/") {
        return MessageContent::ImageUrl {
            image_url: ImageUrl {
                url: format!("data:{};base64,{}", attachment.mime_type, attachment.data),
            },
        };
    }

    let decoded = BASE64_STANDARD
        .decode(attachment.data.as_bytes())
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok());
    let text = match decoded {
        Some(body) => format!("--- {} ---\n{}", attachment.name, body),
        None => format!("[Attached file: {} ({})]", attachment.name, attachment.mime_type),
    };
    MessageContent::Text { text }
}

#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: Vec<MessageContent>,
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum MessageContent {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, PartialEq, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

fn extract_text_response(response: ChatCompletionResponse) -> Result<String> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| ArborError::collaborator("Chat API returned no content in the response"))
}

fn map_http_error(status: StatusCode, body: &str) -> ArborError {
    let message = serde_json::from_str::<ErrorResponse>(body)
        .map(|wrapper| wrapper.error.message)
        .unwrap_or_else(|_| body.to_string());

    let retryable = matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    );
    tracing::warn!(status = status.as_u16(), retryable, "[OpenAiChatModel] HTTP error");

    ArborError::collaborator(format!("Chat API error {}: {}", status.as_u16(), message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roles_and_text_attachment() {
        let message = Message::user("see file").with_attachments(vec![Attachment::new(
            "notes.txt",
            "text/plain",
            BASE64_STANDARD.encode("hello"),
        )]);
        let chat = to_chat_message(&message);
        assert_eq!(chat.role, "user");
        assert_eq!(chat.content.len(), 2);
        assert_eq!(
            chat.content[1],
            MessageContent::Text {
                text: "--- notes.txt ---\nhello".to_string()
            }
        );
        assert_eq!(to_chat_message(&Message::model("hi", "m")).role, "assistant");
    }

    #[test]
    fn test_image_becomes_data_url() {
        let content = attachment_to_content(&Attachment::new("a.png", "image/png", "AAAA"));
        assert_eq!(
            content,
            MessageContent::ImageUrl {
                image_url: ImageUrl {
                    url: "data:image/png;base64,AAAA".to_string()
                }
            }
        );
    }

    #[test]
    fn test_binary_attachment_named_only() {
        let content = attachment_to_content(&Attachment::new("a.pdf", "application/pdf", "/w=="));
        assert_eq!(
            content,
            MessageContent::Text {
                text: "[Attached file: a.pdf (application/pdf)]".to_string()
            }
        );
    }

    #[test]
    fn test_content_serializes_with_type_tag() {
        let json = serde_json::to_value(MessageContent::Text {
            text: "x".to_string(),
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"type": "text", "text": "x"}));
    }

    #[test]
    fn test_error_body_message_extracted() {
        let err = map_http_error(
            StatusCode::UNAUTHORIZED,
            r#"{"error":{"message":"bad key","type":"auth"}}"#,
        );
        assert!(err.to_string().contains("bad key"));
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let model = OpenAiChatModel::new("k", "m").with_base_url("http://localhost:8080/v1/");
        assert_eq!(model.endpoint(), "http://localhost:8080/v1/chat/completions");
    }
}
