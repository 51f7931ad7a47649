//! Inference backend trait and the chat completion wire types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::store::model::Role;

/// Role of a prompt entry sent to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptRole {
    System,
    User,
    Assistant,
}

impl From<Role> for PromptRole {
    fn from(role: Role) -> Self {
        match role {
            Role::User => PromptRole::User,
            Role::Assistant => PromptRole::Assistant,
        }
    }
}

/// A single `{role, content}` entry of the prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: PromptRole,
    pub content: String,
}

impl PromptMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::System,
            content: content.into(),
        }
    }
}

/// Non-streaming chat completion request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<PromptMessage>,
    pub stream: bool,
}

/// Message field of a chat-style response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
}

/// Backend response body. Either shape may be present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CompletionResponse {
    /// Chat endpoint shape: `{ "message": { "content": ... } }`.
    #[serde(default)]
    pub message: Option<ResponseMessage>,
    /// Generate endpoint shape: `{ "response": ... }`.
    #[serde(default)]
    pub response: Option<String>,
}

impl CompletionResponse {
    /// Trimmed assistant text, or `None` when the response carries nothing usable.
    ///
    /// A non-empty `message.content` wins over `response`.
    pub fn assistant_text(&self) -> Option<&str> {
        self.message
            .as_ref()
            .and_then(|m| m.content.as_deref())
            .filter(|content| !content.is_empty())
            .or(self.response.as_deref())
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }
}

/// A single-concurrency inference service.
///
/// Callers own the deadline: dropping the returned future must abort the
/// in-flight request.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError>;
}
