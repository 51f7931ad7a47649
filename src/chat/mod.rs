//! Chat core — turn execution behind the serialized queue.
//!
//! - `turn` — one chat turn against the store and the inference backend
//! - `service` — submission and status API used by front ends

pub mod service;
pub mod turn;

pub use service::{ChatService, ChatStatus};
pub use turn::{ChatReply, ChatTurn, TurnSettings, build_request};
