//! Conversation data model shared by the store and the chat executor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Author of a stored chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One turn of a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self::now(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::now(Role::Assistant, content)
    }

    fn now(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// A user's conversation: recent history plus long-term memory text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationState {
    pub long_term: String,
    pub messages: Vec<ChatMessage>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
}

impl Default for ConversationState {
    fn default() -> Self {
        Self {
            long_term: String::new(),
            messages: Vec::new(),
            updated_at: Utc::now(),
        }
    }
}

impl ConversationState {
    /// Append a message and bump `updated_at`.
    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
        self.updated_at = Utc::now();
    }

    /// Drop all but the newest `max` messages.
    pub fn retain_recent(&mut self, max: usize) {
        let excess = self.messages.len().saturating_sub(max);
        if excess > 0 {
            self.messages.drain(..excess);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retain_recent_keeps_newest() {
        let mut state = ConversationState::default();
        for i in 0..5 {
            state.push(ChatMessage::user(format!("msg {i}")));
        }
        state.retain_recent(2);
        let contents: Vec<_> = state.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["msg 3", "msg 4"]);
    }

    #[test]
    fn serializes_in_memory_file_shape() {
        let state = ConversationState {
            long_term: "likes tea".into(),
            messages: vec![ChatMessage {
                role: Role::Assistant,
                content: "hello".into(),
                timestamp: DateTime::<Utc>::from_timestamp_millis(1_700_000_000_123).unwrap(),
            }],
            updated_at: DateTime::<Utc>::from_timestamp_millis(1_700_000_000_456).unwrap(),
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["longTerm"], "likes tea");
        assert_eq!(json["updatedAt"], 1_700_000_000_456i64);
        assert_eq!(json["messages"][0]["role"], "assistant");
        assert_eq!(json["messages"][0]["timestamp"], 1_700_000_000_123i64);
    }
}
