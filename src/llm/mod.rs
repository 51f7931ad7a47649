//! Inference backend integration.
//!
//! The relay talks to a single local model server. `InferenceBackend` is the
//! seam the chat executor calls through; `OllamaBackend` is the HTTP
//! implementation used in production.

pub mod ollama;
pub mod provider;

pub use ollama::OllamaBackend;
pub use provider::*;

use std::sync::Arc;

use crate::config::ChatConfig;
use crate::error::LlmError;

/// Create the inference backend from configuration.
pub fn create_backend(config: &ChatConfig) -> Result<Arc<dyn InferenceBackend>, LlmError> {
    let backend = OllamaBackend::new(&config.ollama_url)?;
    tracing::info!("Using Ollama (url: {}, model: {})", config.ollama_url, config.model);
    Ok(Arc::new(backend))
}
