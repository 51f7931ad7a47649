//! Conversation persistence — the store interface plus file and in-memory backends.

pub mod json_file;
pub mod memory;
pub mod model;
pub mod traits;

pub use json_file::JsonFileStore;
pub use memory::InMemoryStore;
pub use model::{ChatMessage, ConversationState, Role};
pub use traits::ConversationStore;
