use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::types::{ChatError, Session};
use crate::models::chat::{SessionId, Turn};

/// Thread-safe in-memory session store
///
/// Uses DashMap: updates to one session are serialised by its shard lock,
/// different sessions can be written concurrently.
#[derive(Clone)]
pub struct SessionStore {
    /// Session storage: session_id -> Session
    storage: Arc<DashMap<SessionId, Session>>,

    /// Seeded as the first turn of every session
    system_prompt: Arc<str>,

    /// Exchange pairs retained besides the system turn
    max_pairs: usize,
}

impl SessionStore {
    pub fn new(system_prompt: impl Into<String>, max_pairs: usize) -> Self {
        info!("Initializing session store (max_pairs={})", max_pairs);
        Self {
            storage: Arc::new(DashMap::new()),
            system_prompt: Arc::from(system_prompt.into()),
            max_pairs,
        }
    }

    /// Create a new session with a random v4 id
    pub fn create(&self) -> SessionId {
        let session_id = Uuid::new_v4();
        self.storage
            .insert(session_id, Session::new(&self.system_prompt));
        info!("Session created: {}", session_id);
        session_id
    }

    /// Append a turn to an existing session, enforcing the history window
    pub fn append(&self, session_id: SessionId, turn: Turn) -> Result<(), ChatError> {
        let mut entry = self
            .storage
            .get_mut(&session_id)
            .ok_or(ChatError::SessionNotFound(session_id))?;
        entry.push(turn, self.max_pairs);
        debug!("Session {} now has {} turns", session_id, entry.turns().len());
        Ok(())
    }

    /// Snapshot of the session's turns, system turn included
    pub fn history(&self, session_id: SessionId) -> Result<Vec<Turn>, ChatError> {
        self.storage
            .get(&session_id)
            .map(|entry| entry.turns().to_vec())
            .ok_or(ChatError::SessionNotFound(session_id))
    }

    pub fn contains(&self, session_id: SessionId) -> bool {
        self.storage.contains_key(&session_id)
    }

    /// Remove a session. Removing an unknown session is not an error.
    pub fn clear(&self, session_id: SessionId) -> bool {
        let removed = self.storage.remove(&session_id).is_some();
        if removed {
            info!("Session {} cleared", session_id);
        } else {
            debug!("Clear requested for unknown session {}", session_id);
        }
        removed
    }

    /// Get number of active sessions
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }
}
