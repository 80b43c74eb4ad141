//! Conversation memory management module
//!
//! Provides in-memory conversation state management with:
//! - Thread-safe session storage (DashMap)
//! - Sliding history window of exchange pairs
//! - Prompt strategies chosen from backend capabilities

mod cache;
pub mod manager;
mod prompt;
pub mod types;

pub use cache::SessionStore;
pub use manager::{split_into_chunks, ChatStream, ConversationManager};
pub use prompt::PromptStrategy;
pub use types::{enforce_history_window, ChatError, Session};

pub use crate::models::chat::SessionId;
