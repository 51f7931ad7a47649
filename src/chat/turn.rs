//! A single chat turn: record the user message, ask the backend, record the reply.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::ChatError;
use crate::llm::{CompletionRequest, InferenceBackend, PromptMessage};
use crate::store::{ChatMessage, ConversationState, ConversationStore};

/// Fixed inputs of every turn.
#[derive(Debug, Clone)]
pub struct TurnSettings {
    pub model: String,
    pub system_prompt: String,
    pub timeout: Duration,
}

/// Outcome of a successful turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatReply {
    /// The assistant message appended to the conversation.
    pub assistant: ChatMessage,
    /// False when either save of this turn failed; the reply is still valid
    /// but the stored history may lag behind it.
    pub persisted: bool,
}

/// Executes chat turns against a store and a backend.
pub struct ChatTurn {
    store: Arc<dyn ConversationStore>,
    backend: Arc<dyn InferenceBackend>,
    settings: TurnSettings,
}

impl ChatTurn {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        backend: Arc<dyn InferenceBackend>,
        settings: TurnSettings,
    ) -> Self {
        Self {
            store,
            backend,
            settings,
        }
    }

    /// Run one turn for `owner`.
    ///
    /// The user message is saved before the backend is called, so it survives
    /// a backend failure. The assistant message is only saved on success.
    pub async fn run(&self, owner: &str, content: &str) -> Result<ChatReply, ChatError> {
        let mut state = self.store.get_state(owner).await?;

        state.push(ChatMessage::user(content));
        let user_saved = self.save(owner, &mut state).await;

        let request = build_request(&self.settings, &state);
        let timeout = self.settings.timeout;

        debug!(
            owner,
            backend = self.backend.name(),
            messages = request.messages.len(),
            timeout_ms = timeout.as_millis() as u64,
            "Calling backend"
        );

        // Dropping the backend future on expiry aborts the request; the
        // timer is owned by `timeout` and dropped with it on every path.
        let response = match tokio::time::timeout(timeout, self.backend.complete(&request)).await
        {
            Ok(result) => result?,
            Err(_) => {
                warn!(
                    owner,
                    timeout_ms = timeout.as_millis() as u64,
                    "Backend call timed out"
                );
                return Err(ChatError::BackendTimeout { timeout });
            }
        };

        let text = response
            .assistant_text()
            .ok_or_else(|| ChatError::InvalidBackendResponse {
                reason: "no assistant text in response".to_string(),
            })?;

        let assistant = ChatMessage::assistant(text);
        state.push(assistant.clone());
        let assistant_saved = self.save(owner, &mut state).await;

        info!(owner, chars = assistant.content.len(), "Chat turn completed");

        Ok(ChatReply {
            assistant,
            persisted: user_saved && assistant_saved,
        })
    }

    /// Persist `state`, logging instead of failing the turn.
    async fn save(&self, owner: &str, state: &mut ConversationState) -> bool {
        match self.store.persist(owner, state).await {
            Ok(()) => true,
            Err(e) => {
                warn!(owner, error = %e, "Failed to persist conversation");
                false
            }
        }
    }
}

/// Build the backend payload: system prompt, optional long-term memory, then
/// the conversation stripped to `{role, content}`.
pub fn build_request(settings: &TurnSettings, state: &ConversationState) -> CompletionRequest {
    let mut messages = Vec::with_capacity(state.messages.len() + 2);
    messages.push(PromptMessage::system(settings.system_prompt.as_str()));

    if !state.long_term.is_empty() {
        messages.push(PromptMessage::system(format!(
            "Long-term memory:\n{}",
            state.long_term
        )));
    }

    messages.extend(state.messages.iter().map(|m| PromptMessage {
        role: m.role.into(),
        content: m.content.clone(),
    }));

    CompletionRequest {
        model: settings.model.clone(),
        messages,
        stream: false,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Instant;

    use async_trait::async_trait;

    use super::*;
    use crate::error::{LlmError, StoreError};
    use crate::llm::{CompletionResponse, PromptRole, ResponseMessage};
    use crate::store::{InMemoryStore, Role};

    /// What the scripted backend does on its next call.
    enum Step {
        Reply(CompletionResponse),
        Fail(LlmError),
        Hang,
    }

    struct ScriptedBackend {
        steps: Mutex<VecDeque<Step>>,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedBackend {
        fn new(steps: Vec<Step>) -> Arc<Self> {
            Arc::new(Self {
                steps: Mutex::new(steps.into()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn last_request(&self) -> CompletionRequest {
            self.requests.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl InferenceBackend for ScriptedBackend {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            request: &CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            self.requests.lock().unwrap().push(request.clone());
            let step = self.steps.lock().unwrap().pop_front();
            match step {
                Some(Step::Reply(resp)) => Ok(resp),
                Some(Step::Fail(e)) => Err(e),
                Some(Step::Hang) | None => std::future::pending().await,
            }
        }
    }

    /// Store whose saves always fail.
    struct ReadOnlyStore;

    #[async_trait]
    impl ConversationStore for ReadOnlyStore {
        async fn get_state(&self, _owner: &str) -> Result<ConversationState, StoreError> {
            Ok(ConversationState::default())
        }

        async fn persist(
            &self,
            _owner: &str,
            _state: &mut ConversationState,
        ) -> Result<(), StoreError> {
            Err(StoreError::Io(std::io::Error::other("disk full")))
        }
    }

    fn chat_reply(text: &str) -> Step {
        Step::Reply(CompletionResponse {
            message: Some(ResponseMessage {
                content: Some(text.to_string()),
            }),
            response: None,
        })
    }

    fn settings(timeout: Duration) -> TurnSettings {
        TurnSettings {
            model: "llama3".into(),
            system_prompt: "You are terse.".into(),
            timeout,
        }
    }

    fn turn(store: Arc<dyn ConversationStore>, backend: Arc<ScriptedBackend>) -> ChatTurn {
        ChatTurn::new(store, backend, settings(Duration::from_secs(5)))
    }

    #[tokio::test]
    async fn successful_turn_appends_both_messages_and_saves_twice() {
        let store = Arc::new(InMemoryStore::new(30));
        let backend = ScriptedBackend::new(vec![chat_reply("  hello there \n")]);
        let turn = turn(store.clone(), backend.clone());

        let reply = turn.run("alice", "hi").await.unwrap();

        assert_eq!(reply.assistant.role, Role::Assistant);
        assert_eq!(reply.assistant.content, "hello there");
        assert!(reply.persisted);
        assert_eq!(store.revisions("alice").await, 2);

        let state = store.get_state("alice").await.unwrap();
        let roles: Vec<_> = state.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant]);
    }

    #[tokio::test]
    async fn request_carries_prompt_memory_and_history() {
        let store = Arc::new(InMemoryStore::new(30));
        store.set_long_term("alice", "Lives in Lisbon").await;
        let backend = ScriptedBackend::new(vec![chat_reply("first"), chat_reply("second")]);
        let turn = turn(store.clone(), backend.clone());

        turn.run("alice", "one").await.unwrap();
        turn.run("alice", "two").await.unwrap();

        let request = backend.last_request();
        assert_eq!(request.model, "llama3");
        assert!(!request.stream);
        let pairs: Vec<_> = request
            .messages
            .iter()
            .map(|m| (m.role, m.content.as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                (PromptRole::System, "You are terse."),
                (PromptRole::System, "Long-term memory:\nLives in Lisbon"),
                (PromptRole::User, "one"),
                (PromptRole::Assistant, "first"),
                (PromptRole::User, "two"),
            ]
        );
    }

    #[tokio::test]
    async fn request_history_is_bounded_by_retention() {
        let store = Arc::new(InMemoryStore::new(2));
        let backend = ScriptedBackend::new(vec![chat_reply("first"), chat_reply("second")]);
        let turn = turn(store.clone(), backend.clone());

        turn.run("alice", "one").await.unwrap();
        turn.run("alice", "two").await.unwrap();

        let request = backend.last_request();
        let history: Vec<_> = request.messages[1..]
            .iter()
            .map(|m| (m.role, m.content.as_str()))
            .collect();
        assert_eq!(
            history,
            vec![(PromptRole::Assistant, "first"), (PromptRole::User, "two")]
        );
        assert_eq!(store.get_state("alice").await.unwrap().messages.len(), 2);
    }

    #[test]
    fn no_memory_entry_when_long_term_is_empty() {
        let mut state = ConversationState::default();
        state.push(ChatMessage::user("hey"));
        let request = build_request(&settings(Duration::from_secs(1)), &state);
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, PromptRole::System);
        assert_eq!(request.messages[1].role, PromptRole::User);
    }

    #[tokio::test]
    async fn backend_status_error_keeps_user_message() {
        let store = Arc::new(InMemoryStore::new(30));
        let backend = ScriptedBackend::new(vec![Step::Fail(LlmError::Status {
            provider: "scripted".into(),
            status: 503,
            body: "loading model".into(),
        })]);
        let turn = turn(store.clone(), backend);

        let err = turn.run("alice", "hi").await.unwrap_err();
        match err {
            ChatError::BackendError(LlmError::Status { status, body, .. }) => {
                assert_eq!(status, 503);
                assert_eq!(body, "loading model");
            }
            other => panic!("expected BackendError, got {other:?}"),
        }

        assert_eq!(store.revisions("alice").await, 1);
        let state = store.get_state("alice").await.unwrap();
        assert_eq!(state.messages.len(), 1);
        assert_eq!(state.messages[0].role, Role::User);
    }

    #[tokio::test]
    async fn empty_response_is_invalid() {
        let store = Arc::new(InMemoryStore::new(30));
        let backend = ScriptedBackend::new(vec![Step::Reply(CompletionResponse::default())]);
        let turn = turn(store.clone(), backend);

        let err = turn.run("alice", "hi").await.unwrap_err();
        assert!(matches!(err, ChatError::InvalidBackendResponse { .. }));
        assert_eq!(store.revisions("alice").await, 1);
    }

    #[tokio::test]
    async fn flat_response_shape_is_accepted() {
        let store = Arc::new(InMemoryStore::new(30));
        let backend = ScriptedBackend::new(vec![Step::Reply(CompletionResponse {
            message: None,
            response: Some("hi".into()),
        })]);
        let reply = turn(store, backend).run("alice", "yo").await.unwrap();
        assert_eq!(reply.assistant.content, "hi");
    }

    #[tokio::test]
    async fn hanging_backend_times_out() {
        let store = Arc::new(InMemoryStore::new(30));
        let backend = ScriptedBackend::new(vec![Step::Hang]);
        let timeout = Duration::from_millis(100);
        let turn = ChatTurn::new(store.clone(), backend, settings(timeout));

        let started = Instant::now();
        let err = turn.run("alice", "hello?").await.unwrap_err();
        let elapsed = started.elapsed();

        assert!(matches!(err, ChatError::BackendTimeout { timeout: t } if t == timeout));
        assert!(elapsed >= timeout);
        assert!(elapsed < Duration::from_secs(2));
        assert_eq!(store.revisions("alice").await, 1);
    }

    #[tokio::test]
    async fn persistence_failure_is_flagged_not_fatal() {
        let backend = ScriptedBackend::new(vec![chat_reply("still here")]);
        let turn = turn(Arc::new(ReadOnlyStore), backend);

        let reply = turn.run("alice", "hi").await.unwrap();
        assert_eq!(reply.assistant.content, "still here");
        assert!(!reply.persisted);
    }
}
