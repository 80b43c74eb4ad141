use thiserror::Error;

use crate::models::chat::{SessionId, Turn};

/// Conversation state stored in the session store
#[derive(Debug, Clone)]
pub struct Session {
    /// Ordered turns; index 0 is always the system turn
    turns: Vec<Turn>,
}

impl Session {
    /// Create a session seeded with the system prompt
    pub fn new(system_prompt: &str) -> Self {
        Self {
            turns: vec![Turn::system(system_prompt)],
        }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Append a turn and enforce the history window of `max_pairs` exchanges
    pub fn push(&mut self, turn: Turn, max_pairs: usize) {
        self.turns.push(turn);
        enforce_history_window(&mut self.turns, max_pairs);
    }
}

/// Keep the system turn plus the last `2 * max_pairs` turns, in order.
pub fn enforce_history_window(turns: &mut Vec<Turn>, max_pairs: usize) {
    let limit = 1 + 2 * max_pairs;
    if turns.len() > limit {
        let excess = turns.len() - limit;
        turns.drain(1..1 + excess);
    }
}

/// Failures of conversation operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChatError {
    #[error("Model is still loading")]
    ServiceUnavailable,

    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("{0}")]
    Validation(String),

    #[error("Generation failed: {0}")]
    GenerationFailed(String),
}
