//! JSON-file conversation store: one memory file per user.
//!
//! Files live under the memory directory, named by the URL-safe base64 of the
//! owner key, in the shape `{ "longTerm", "messages", "updatedAt" }` with
//! millisecond timestamps. Loading is lenient: malformed entries are dropped
//! and an unreadable file yields an empty conversation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::store::model::{ChatMessage, ConversationState, Role};
use crate::store::traits::ConversationStore;

/// File-backed conversation store with an in-memory cache.
pub struct JsonFileStore {
    memory_dir: PathBuf,
    max_recent_messages: usize,
    cache: RwLock<HashMap<String, ConversationState>>,
}

impl JsonFileStore {
    /// Create a store rooted at `memory_dir` retaining `max_recent_messages`.
    pub fn new(memory_dir: impl Into<PathBuf>, max_recent_messages: usize) -> Self {
        Self {
            memory_dir: memory_dir.into(),
            max_recent_messages,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Create the memory directory along with any missing parents, which
    /// includes the data directory it lives under.
    pub async fn ensure_dirs(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.memory_dir).await?;
        Ok(())
    }

    /// Create an empty memory file for `owner` if none exists yet.
    pub async fn ensure_owner_file(&self, owner: &str) -> Result<(), StoreError> {
        let path = self.file_for(owner);
        if !fs::try_exists(&path).await? {
            self.write_file(&path, &ConversationState::default()).await?;
        }
        Ok(())
    }

    /// Path of the memory file for `owner`.
    pub fn file_for(&self, owner: &str) -> PathBuf {
        self.memory_dir
            .join(format!("{}.json", URL_SAFE_NO_PAD.encode(owner.as_bytes())))
    }

    async fn load(&self, owner: &str) -> Result<ConversationState, StoreError> {
        let path = self.file_for(owner);
        if !fs::try_exists(&path).await? {
            let state = ConversationState::default();
            self.write_file(&path, &state).await?;
            debug!(owner, path = %path.display(), "Created memory file");
            return Ok(state);
        }

        let raw = match fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(owner, error = %e, "Unreadable memory file, starting empty");
                return Ok(ConversationState::default());
            }
        };

        match serde_json::from_str::<Value>(&raw) {
            Ok(value) => Ok(parse_memory_file(&value, self.max_recent_messages)),
            Err(e) => {
                warn!(owner, error = %e, "Malformed memory file, starting empty");
                Ok(ConversationState::default())
            }
        }
    }

    async fn write_file(&self, path: &Path, state: &ConversationState) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let body = serde_json::to_string_pretty(state)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, body).await?;
        fs::rename(&tmp, path).await?;
        Ok(())
    }
}

#[async_trait]
impl ConversationStore for JsonFileStore {
    async fn get_state(&self, owner: &str) -> Result<ConversationState, StoreError> {
        if let Some(state) = self.cache.read().await.get(owner) {
            return Ok(state.clone());
        }

        let mut cache = self.cache.write().await;
        // Another caller may have loaded it while we waited for the write lock.
        if let Some(state) = cache.get(owner) {
            return Ok(state.clone());
        }
        let state = self.load(owner).await?;
        cache.insert(owner.to_string(), state.clone());
        Ok(state)
    }

    async fn persist(
        &self,
        owner: &str,
        state: &mut ConversationState,
    ) -> Result<(), StoreError> {
        state.retain_recent(self.max_recent_messages);

        self.cache
            .write()
            .await
            .insert(owner.to_string(), state.clone());

        self.write_file(&self.file_for(owner), state).await?;
        debug!(owner, messages = state.messages.len(), "Persisted conversation");
        Ok(())
    }
}

/// Build a conversation from a raw memory file, dropping anything malformed.
fn parse_memory_file(raw: &Value, max_recent_messages: usize) -> ConversationState {
    let long_term = raw
        .get("longTerm")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let messages = raw
        .get("messages")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(parse_message).collect())
        .unwrap_or_default();

    let mut state = ConversationState {
        long_term,
        messages,
        updated_at: parse_millis(raw.get("updatedAt")),
    };
    state.retain_recent(max_recent_messages);
    state
}

fn parse_message(raw: &Value) -> Option<ChatMessage> {
    let role = match raw.get("role")?.as_str()? {
        "user" => Role::User,
        "assistant" => Role::Assistant,
        _ => return None,
    };
    let content = raw.get("content")?.as_str()?.to_string();
    Some(ChatMessage {
        role,
        content,
        timestamp: parse_millis(raw.get("timestamp")),
    })
}

fn parse_millis(raw: Option<&Value>) -> DateTime<Utc> {
    raw.and_then(Value::as_i64)
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .unwrap_or_else(Utc::now)
}
