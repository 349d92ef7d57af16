//! OpenAI chat completion wire types.
//!
//! Notes:
//! - `messages[].content` may be a plain string, a single content part, or an
//!   array mixing strings and parts. All of them are accepted via
//!   `#[serde(untagged)]` enums.
//! - The upstream only takes one text blob, so messages are flattened into a
//!   `role:content` transcript before encoding.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ProxyError;

/// Models that reject `stream: true`.
const NON_STREAMING_MODEL_PREFIX: &str = "o1-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    Developer,
    User,
    Assistant,
    Tool,
    Function,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::Developer => "developer",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
            Role::Function => "function",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: MessageContent,
}

impl ChatMessage {
    /// `role:content` line used in the transcript.
    pub fn to_transcript_line(&self) -> String {
        format!("{}:{}", self.role, self.content.to_plaintext())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Part(ContentPart),
    Items(Vec<ContentItem>),
}

impl MessageContent {
    /// Lossy plain-text representation; parts are joined with `", "`.
    pub fn to_plaintext(&self) -> String {
        match self {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Part(part) => part.to_string(),
            MessageContent::Items(items) => items
                .iter()
                .map(ContentItem::to_string)
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContentItem {
    Text(String),
    Part(ContentPart),
}

impl fmt::Display for ContentItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentItem::Text(text) => f.write_str(text),
            ContentItem::Part(part) => fmt::Display::fmt(part, f),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

impl fmt::Display for ContentPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentPart::Text { text } => f.write_str(text),
            ContentPart::ImageUrl { image_url } => write!(f, "[Image: {}]", image_url.url),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

/// Request body for `/v1/chat/completions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub stream: bool,
}

impl ChatCompletionRequest {
    pub fn validate(&self) -> Result<(), ProxyError> {
        if self.stream && self.model.starts_with(NON_STREAMING_MODEL_PREFIX) {
            return Err(ProxyError::StreamingUnsupported {
                model: self.model.clone(),
            });
        }
        if self.messages.is_empty() {
            return Err(ProxyError::InvalidRequest(
                "messages should be a non-empty array".to_string(),
            ));
        }
        Ok(())
    }

    /// Flatten the conversation into the newline-joined transcript.
    pub fn transcript(&self) -> String {
        self.messages
            .iter()
            .map(ChatMessage::to_transcript_line)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Response body for non-streaming completions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletion {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<Choice>,
    pub usage: Usage,
}

impl ChatCompletion {
    pub fn new(id: String, created: i64, model: String, content: String) -> Self {
        Self {
            id,
            object: "chat.completion".to_string(),
            created,
            model,
            choices: vec![Choice {
                index: 0,
                message: AssistantMessage {
                    role: Role::Assistant,
                    content,
                },
                finish_reason: "stop".to_string(),
            }],
            usage: Usage::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub index: u32,
    pub message: AssistantMessage,
    pub finish_reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantMessage {
    pub role: Role,
    pub content: String,
}

/// Token usage. The upstream does not report counts, so these stay zero.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// One streamed `chat.completion.chunk`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChunkChoice>,
}

impl ChatCompletionChunk {
    pub fn delta(id: &str, created: i64, model: &str, content: String) -> Self {
        Self {
            id: id.to_string(),
            object: "chat.completion.chunk".to_string(),
            created,
            model: model.to_string(),
            choices: vec![ChunkChoice {
                index: 0,
                delta: Delta { content },
                finish_reason: None,
            }],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkChoice {
    pub index: u32,
    pub delta: Delta,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delta {
    pub content: String,
}

/// `GET /v1/models` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelList {
    pub object: String,
    pub data: Vec<ModelCard>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelCard {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub owned_by: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(value: serde_json::Value) -> ChatCompletionRequest {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_string_content_transcript() {
        let req = request(json!({
            "model": "gpt-4o",
            "messages": [
                {"role": "system", "content": "Be brief"},
                {"role": "user", "content": "Hello"}
            ]
        }));
        assert!(!req.stream);
        assert_eq!(req.transcript(), "system:Be brief\nuser:Hello");
    }

    #[test]
    fn test_content_parts_transcript() {
        let req = request(json!({
            "model": "gpt-4o",
            "messages": [{
                "role": "user",
                "content": [
                    {"type": "text", "text": "What is this?"},
                    {"type": "image_url", "image_url": {"url": "https://x.test/a.png"}},
                    "plain"
                ]
            }]
        }));
        assert_eq!(
            req.transcript(),
            "user:What is this?, [Image: https://x.test/a.png], plain"
        );
    }

    #[test]
    fn test_single_part_content() {
        let req = request(json!({
            "model": "gpt-4o",
            "messages": [{"role": "user", "content": {"type": "text", "text": "solo"}}]
        }));
        assert_eq!(req.transcript(), "user:solo");
    }

    #[test]
    fn test_unknown_role_is_rejected() {
        let parsed = serde_json::from_value::<ChatCompletionRequest>(json!({
            "model": "gpt-4o",
            "messages": [{"role": "narrator", "content": "hi"}]
        }));
        assert!(parsed.is_err());
    }

    #[test]
    fn test_validate() {
        let ok = request(json!({
            "model": "o1-mini",
            "messages": [{"role": "user", "content": "hi"}]
        }));
        assert!(ok.validate().is_ok());

        let streaming_o1 = request(json!({
            "model": "o1-mini",
            "stream": true,
            "messages": [{"role": "user", "content": "hi"}]
        }));
        assert!(matches!(
            streaming_o1.validate(),
            Err(ProxyError::StreamingUnsupported { .. })
        ));

        let empty = request(json!({"model": "gpt-4o", "messages": []}));
        assert!(matches!(
            empty.validate(),
            Err(ProxyError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_completion_shape() {
        let completion = ChatCompletion::new(
            "chatcmpl-1".to_string(),
            1_700_000_000,
            "gpt-4o".to_string(),
            "hi".to_string(),
        );
        let value = serde_json::to_value(&completion).unwrap();
        assert_eq!(value["object"], "chat.completion");
        assert_eq!(value["choices"][0]["message"]["role"], "assistant");
        assert_eq!(value["choices"][0]["finish_reason"], "stop");
        assert_eq!(value["usage"]["total_tokens"], 0);
    }

    #[test]
    fn test_chunk_shape() {
        let chunk = ChatCompletionChunk::delta("chatcmpl-1", 1, "gpt-4o", "Hi".to_string());
        let value = serde_json::to_value(&chunk).unwrap();
        assert_eq!(value["object"], "chat.completion.chunk");
        assert_eq!(value["choices"][0]["delta"]["content"], "Hi");
        assert!(value["choices"][0]["finish_reason"].is_null());
    }
}
