//! In-process conversation store with no durable backing.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::store::model::ConversationState;
use crate::store::traits::ConversationStore;

#[derive(Debug, Default)]
struct Entry {
    state: ConversationState,
    revisions: usize,
}

/// Keeps conversations in memory. Applies the same retention as the file store.
pub struct InMemoryStore {
    max_recent_messages: usize,
    entries: RwLock<HashMap<String, Entry>>,
}

impl InMemoryStore {
    pub fn new(max_recent_messages: usize) -> Self {
        Self {
            max_recent_messages,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Seed long-term memory text for `owner`.
    pub async fn set_long_term(&self, owner: &str, text: impl Into<String>) {
        let mut entries = self.entries.write().await;
        entries.entry(owner.to_string()).or_default().state.long_term = text.into();
    }

    /// How many times `owner`'s state has been persisted.
    pub async fn revisions(&self, owner: &str) -> usize {
        self.entries
            .read()
            .await
            .get(owner)
            .map(|e| e.revisions)
            .unwrap_or(0)
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    async fn get_state(&self, owner: &str) -> Result<ConversationState, StoreError> {
        let mut entries = self.entries.write().await;
        Ok(entries.entry(owner.to_string()).or_default().state.clone())
    }

    async fn persist(
        &self,
        owner: &str,
        state: &mut ConversationState,
    ) -> Result<(), StoreError> {
        state.retain_recent(self.max_recent_messages);

        let mut entries = self.entries.write().await;
        let entry = entries.entry(owner.to_string()).or_default();
        entry.state = state.clone();
        entry.revisions += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::model::ChatMessage;

    #[tokio::test]
    async fn counts_revisions_and_retains_recent() {
        let store = InMemoryStore::new(2);
        let mut state = store.get_state("alice").await.unwrap();
        for i in 0..3 {
            state.push(ChatMessage::user(format!("m{i}")));
            store.persist("alice", &mut state).await.unwrap();
        }

        assert_eq!(store.revisions("alice").await, 3);
        assert_eq!(store.revisions("bob").await, 0);
        assert_eq!(store.get_state("alice").await.unwrap().messages.len(), 2);
        assert_eq!(state.messages.len(), 2);
    }

    #[tokio::test]
    async fn long_term_is_visible_in_state() {
        let store = InMemoryStore::new(30);
        store.set_long_term("alice", "allergic to peanuts").await;
        assert_eq!(
            store.get_state("alice").await.unwrap().long_term,
            "allergic to peanuts"
        );
    }
}
