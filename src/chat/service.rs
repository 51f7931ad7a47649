//! Chat service — the submission API in front of the serialized queue.

use std::sync::Arc;

use serde::Serialize;

use crate::chat::turn::{ChatReply, ChatTurn, TurnSettings};
use crate::config::ChatConfig;
use crate::error::ChatError;
use crate::llm::InferenceBackend;
use crate::queue::{JobQueue, QueueSnapshot};
use crate::store::{ChatMessage, ConversationStore};

/// Status of one user's conversation and of the shared queue.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatStatus {
    pub messages: Vec<ChatMessage>,
    pub is_busy: bool,
    pub queue: QueueSnapshot,
}

/// Accepts chat turns from any number of callers and runs them one at a time.
pub struct ChatService {
    queue: JobQueue<ChatReply>,
    turn: Arc<ChatTurn>,
    store: Arc<dyn ConversationStore>,
}

impl ChatService {
    /// Build the service. Must be called inside a Tokio runtime.
    pub fn new(
        config: &ChatConfig,
        store: Arc<dyn ConversationStore>,
        backend: Arc<dyn InferenceBackend>,
    ) -> Self {
        let settings = TurnSettings {
            model: config.model.clone(),
            system_prompt: config.system_prompt.clone(),
            timeout: config.timeout,
        };
        Self {
            queue: JobQueue::new(config.max_pending),
            turn: Arc::new(ChatTurn::new(Arc::clone(&store), backend, settings)),
            store,
        }
    }

    /// Queue a turn for `owner` and wait for the assistant's reply.
    ///
    /// Fails immediately with `CapacityExceeded` when the queue is full.
    pub async fn send_message(&self, owner: &str, content: &str) -> Result<ChatReply, ChatError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        let turn = Arc::clone(&self.turn);
        let owner_key = owner.to_string();
        let content = content.to_string();

        let handle = self.queue.submit(owner, move || async move {
            turn.run(&owner_key, &content).await
        })?;

        tracing::debug!(job_id = %handle.id(), owner, "Chat turn queued");
        handle.await
    }

    /// Conversation history, busy flag and queue load for `owner`.
    ///
    /// Never waits on the queue.
    pub async fn status(&self, owner: &str) -> Result<ChatStatus, ChatError> {
        let state = self.store.get_state(owner).await?;
        Ok(ChatStatus {
            messages: state.messages,
            is_busy: self.queue.is_busy(owner),
            queue: self.queue.snapshot(),
        })
    }

    pub fn queue(&self) -> &JobQueue<ChatReply> {
        &self.queue
    }

    /// Finish queued turns and stop the worker.
    pub async fn shutdown(self) {
        self.queue.shutdown().await;
    }
}
