//! Ollama chat endpoint over HTTP.

use async_trait::async_trait;

use crate::error::LlmError;
use crate::llm::provider::{CompletionRequest, CompletionResponse, InferenceBackend};

const PROVIDER: &str = "ollama";

/// Talks to a local Ollama server's `/api/chat` endpoint.
pub struct OllamaBackend {
    client: reqwest::Client,
    url: String,
}

impl OllamaBackend {
    pub fn new(url: impl Into<String>) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| LlmError::RequestFailed {
                provider: PROVIDER.to_string(),
                reason: format!("Failed to create HTTP client: {}", e),
            })?;
        Ok(Self::with_client(client, url))
    }

    pub fn with_client(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl InferenceBackend for OllamaBackend {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        tracing::debug!(
            url = %self.url,
            model = %request.model,
            messages = request.messages.len(),
            "Sending chat request"
        );

        let response = self
            .client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed {
                provider: PROVIDER.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                provider: PROVIDER.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<CompletionResponse>()
            .await
            .map_err(|e| LlmError::InvalidResponse {
                provider: PROVIDER.to_string(),
                reason: e.to_string(),
            })
    }
}
