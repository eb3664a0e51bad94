//! Client for OpenAI-compatible chat-completion endpoints (Groq by default).

pub mod chat;
pub mod types;

pub use types::{ChatCompletionRequest, ChatMessage, ChatRole, Completion};
