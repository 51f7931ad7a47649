//! `ConversationStore` — the narrow persistence interface the chat core consumes.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::store::model::ConversationState;

/// Backend-agnostic conversation persistence.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Current state for `owner`, materialized with defaults on first access.
    async fn get_state(&self, owner: &str) -> Result<ConversationState, StoreError>;

    /// Replace the current state for `owner` and save it durably.
    ///
    /// The store's retention policy is applied to `state` in place, so the
    /// caller keeps working with exactly what was saved.
    async fn persist(&self, owner: &str, state: &mut ConversationState) -> Result<(), StoreError>;
}
