use chrono::Utc;
use futures::stream::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::models::chat::{
    ChatReply, ChatStreamChunk, MessageParams, ModelInfo, SessionId, StatusResponse, Turn,
};
use crate::services::backend::GenerationParams;
use crate::services::readiness::{LoadState, LoadedModel, ReadinessGate};

use super::cache::SessionStore;
use super::types::ChatError;

pub type ChatStream = Pin<Box<dyn Stream<Item = ChatStreamChunk> + Send>>;

/// Orchestrates sessions on top of the shared generation backend
pub struct ConversationManager {
    store: SessionStore,
    gate: Arc<ReadinessGate>,
    stream_chunk_size: usize,
}

impl ConversationManager {
    pub fn new(store: SessionStore, gate: Arc<ReadinessGate>, stream_chunk_size: usize) -> Self {
        Self {
            store,
            gate,
            stream_chunk_size: stream_chunk_size.max(1),
        }
    }

    fn ready_model(&self) -> Result<LoadedModel, ChatError> {
        self.gate.loaded().ok_or(ChatError::ServiceUnavailable)
    }

    pub fn create_session(&self) -> Result<SessionId, ChatError> {
        self.ready_model()?;
        Ok(self.store.create())
    }

    pub fn history(&self, session_id: SessionId) -> Result<Vec<Turn>, ChatError> {
        self.ready_model()?;
        self.store.history(session_id)
    }

    /// Remove a session; unknown sessions are accepted silently.
    pub fn clear_session(&self, session_id: SessionId) -> Result<(), ChatError> {
        self.ready_model()?;
        self.store.clear(session_id);
        Ok(())
    }

    pub fn model_info(&self) -> Result<ModelInfo, ChatError> {
        let model = self.ready_model()?;
        Ok(ModelInfo {
            model_name: model.model_name().to_string(),
            is_loaded: true,
            active_sessions: self.store.len(),
        })
    }

    pub fn status(&self) -> StatusResponse {
        let state = self.gate.status();
        let (fallback_used, error) = match &state {
            LoadState::Ready(model) => (model.fallback_used, None),
            LoadState::Failed(msg) => (false, Some(msg.clone())),
            _ => (false, None),
        };

        StatusResponse {
            model_loading: matches!(state, LoadState::Loading),
            model_loaded: matches!(state, LoadState::Ready(_)),
            load_state: state.as_str().to_string(),
            requested_model: self.gate.requested_model().to_string(),
            fallback_used,
            model_info: self.model_info().ok(),
            error,
        }
    }

    /// Generate the assistant reply for one user message.
    ///
    /// A failed generation leaves the user turn in the history; it is not rolled back.
    /// If the session is cleared while generating, the reply is still returned but not stored.
    pub async fn send_message(
        &self,
        session_id: SessionId,
        params: MessageParams,
    ) -> Result<ChatReply, ChatError> {
        let start_time = Instant::now();
        let model = self.ready_model()?;

        self.store.append(session_id, Turn::user(params.message))?;
        let turns = self.store.history(session_id)?;

        let prompt = model.strategy.build(&turns).map_err(|e| {
            error!("Failed to build prompt for session {}: {:#}", session_id, e);
            ChatError::GenerationFailed(e.to_string())
        })?;

        let generation = GenerationParams::chat(params.max_tokens, params.temperature);
        debug!(
            "Session {}: {} turns, templated={}, max_new_tokens={}",
            session_id,
            turns.len(),
            model.strategy.is_templated(),
            generation.max_new_tokens
        );

        let raw = model
            .backend
            .generate(&prompt, &generation)
            .await
            .map_err(|e| {
                error!("Generation failed for session {}: {:#}", session_id, e);
                ChatError::GenerationFailed(format!("{:#}", e))
            })?;

        let response = model.strategy.post_process(&raw);
        match self.store.append(session_id, Turn::assistant(response.clone())) {
            Ok(()) => {}
            Err(ChatError::SessionNotFound(_)) => {
                warn!("Session {} was cleared during generation, reply not stored", session_id);
            }
            Err(e) => return Err(e),
        }

        info!(
            "Session {}: reply generated in {}ms ({} chars)",
            session_id,
            start_time.elapsed().as_millis(),
            response.chars().count()
        );

        Ok(ChatReply {
            response,
            session_id,
            timestamp: Utc::now(),
            model: model.model_name().to_string(),
        })
    }

    /// Streaming variant of `send_message`.
    ///
    /// Readiness and session existence are checked before the stream is handed
    /// out. The reply is generated in full, then replayed in fixed-size slices.
    pub fn stream_message(
        self: Arc<Self>,
        session_id: SessionId,
        params: MessageParams,
    ) -> Result<ChatStream, ChatError> {
        self.ready_model()?;
        if !self.store.contains(session_id) {
            return Err(ChatError::SessionNotFound(session_id));
        }

        let manager = self.clone();
        let stream = async_stream::stream! {
            match manager.send_message(session_id, params).await {
                Ok(reply) => {
                    for chunk in split_into_chunks(&reply.response, manager.stream_chunk_size) {
                        yield ChatStreamChunk::Delta { chunk, done: false };
                    }
                    yield ChatStreamChunk::Done { done: true, session_id };
                }
                Err(e) => {
                    yield ChatStreamChunk::Error { error: e.to_string() };
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

/// Split text into slices of at most `max_chars` characters
pub fn split_into_chunks(text: &str, max_chars: usize) -> Vec<String> {
    if text.is_empty() {
        return vec![];
    }

    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(max_chars.max(1))
        .map(|chunk| chunk.iter().collect())
        .collect()
}
