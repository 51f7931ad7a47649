//! Error types for Chat Relay.

use std::time::Duration;

/// Top-level error type for the relay.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Chat error: {0}")]
    Chat(#[from] ChatError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),
}

/// Conversation store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Inference backend errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} returned status {status}: {body}")]
    Status {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },
}

/// Errors reported to the submitter of a chat turn.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Chat queue is full ({capacity} pending). Please try again shortly.")]
    CapacityExceeded { capacity: usize },

    #[error("Backend request timed out after {}ms", .timeout.as_millis())]
    BackendTimeout { timeout: Duration },

    #[error("Backend error: {0}")]
    BackendError(LlmError),

    #[error("Invalid backend response: {reason}")]
    InvalidBackendResponse { reason: String },

    #[error("Message content is empty")]
    EmptyMessage,

    #[error("Conversation store error: {0}")]
    Store(#[from] StoreError),

    #[error("Job panicked: {reason}")]
    WorkerPanicked { reason: String },

    #[error("Queue worker dropped the job before completing it")]
    WorkerGone,
}

impl ChatError {
    /// Whether the caller may reasonably resubmit the same turn later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ChatError::CapacityExceeded { .. } | ChatError::BackendTimeout { .. }
        )
    }
}

impl From<LlmError> for ChatError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::InvalidResponse { reason, .. } => {
                ChatError::InvalidBackendResponse { reason }
            }
            other => ChatError::BackendError(other),
        }
    }
}

/// Result type alias for the relay.
pub type Result<T> = std::result::Result<T, Error>;
