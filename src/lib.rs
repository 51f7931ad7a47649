//! Chat Relay — serialized chat turns against a single-concurrency model server.

pub mod chat;
pub mod config;
pub mod error;
pub mod llm;
pub mod queue;
pub mod store;
