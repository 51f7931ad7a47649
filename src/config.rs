//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Default system prompt sent ahead of every conversation.
pub const DEFAULT_SYSTEM_PROMPT: &str = "Personality:\n\n\nContext:\n\n\nRules:";

const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434/api/chat";
const DEFAULT_MODEL: &str = "BASIC_MODEL";
const DEFAULT_TIMEOUT_MS: u64 = 60_000;
const DEFAULT_MAX_PENDING: u64 = 100;
const DEFAULT_MAX_RECENT_MESSAGES: u64 = 30;

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Chat endpoint of the model server.
    pub ollama_url: String,
    /// Model identifier passed with every request.
    pub model: String,
    /// Fixed system prompt.
    pub system_prompt: String,
    /// Hard deadline for a single backend call.
    pub timeout: Duration,
    /// Maximum queued-plus-executing turns across all users.
    pub max_pending: usize,
    /// Messages retained per conversation by the store.
    pub max_recent_messages: usize,
    /// Root data directory.
    pub data_dir: PathBuf,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            max_pending: DEFAULT_MAX_PENDING as usize,
            max_recent_messages: DEFAULT_MAX_RECENT_MESSAGES as usize,
            data_dir: PathBuf::from("./data"),
        }
    }
}

impl ChatConfig {
    /// Load configuration from the process environment.
    ///
    /// A `.env` file in the working directory is read first; variables
    /// already set in the environment take precedence over it.
    pub fn from_env() -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!(path = %path.display(), "Loaded .env file"),
            Err(e) if e.not_found() => {}
            Err(e) => return Err(ConfigError::ParseError(e.to_string())),
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self {
            ollama_url: lookup("OLLAMA_URL")
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
            model: lookup("OLLAMA_MODEL")
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            system_prompt: lookup("SYSTEM_PROMPT")
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            timeout: Duration::from_millis(parse_positive(
                lookup("OLLAMA_TIMEOUT_MS"),
                DEFAULT_TIMEOUT_MS,
            )),
            max_pending: parse_positive(lookup("CHAT_QUEUE_MAX_PENDING"), DEFAULT_MAX_PENDING)
                as usize,
            max_recent_messages: parse_positive(
                lookup("MAX_RECENT_MESSAGES"),
                DEFAULT_MAX_RECENT_MESSAGES,
            ) as usize,
            data_dir: lookup("CHAT_RELAY_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data")),
        };
        config.validate()?;
        Ok(config)
    }

    /// Directory holding one memory file per user.
    pub fn memory_dir(&self) -> PathBuf {
        self.data_dir.join("memories")
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.ollama_url.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "OLLAMA_URL".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "OLLAMA_MODEL".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// Parse a strictly positive integer, falling back on anything else.
fn parse_positive(value: Option<String>, fallback: u64) -> u64 {
    value
        .and_then(|s| s.trim().parse::<u64>().ok())
        .filter(|n| *n > 0)
        .unwrap_or(fallback)
}
