use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

pub type SessionId = Uuid;

// ===== CONVERSATION MODELS =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    /// Capitalised label used by plain-text prompts.
    pub fn label(&self) -> &'static str {
        match self {
            Self::System => "System",
            Self::User => "User",
            Self::Assistant => "Assistant",
        }
    }
}

/// One message unit in a conversation. Never mutated after it is appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

// ===== REQUEST MODELS =====

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub message: String,
    #[serde(default, alias = "max_length")]
    #[validate(range(min = 1, max = 2000, message = "maxLength must be an integer between 1 and 2000"))]
    pub max_length: Option<u32>,
    #[serde(default)]
    #[validate(range(min = 0.0, max = 2.0, message = "temperature must be a number between 0.0 and 2.0"))]
    pub temperature: Option<f32>,
}

/// Validated and sanitised message parameters handed to the conversation layer.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageParams {
    pub message: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

// ===== RESPONSE MODELS =====

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResponse {
    pub session_id: SessionId,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub response: String,
    pub session_id: SessionId,
    pub timestamp: DateTime<Utc>,
    pub model: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub session_id: SessionId,
    pub history: Vec<Turn>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearSessionResponse {
    pub message: String,
    pub session_id: SessionId,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub model_name: String,
    pub is_loaded: bool,
    pub active_sessions: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub model_loading: bool,
    pub model_loaded: bool,
    /// not_started, loading, loaded, loaded_with_fallback, failed
    pub load_state: String,
    pub requested_model: String,
    pub fallback_used: bool,
    pub model_info: Option<ModelInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ===== STREAM EVENT MODELS =====

/// Payload of one SSE `data:` frame on the streaming endpoint.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum ChatStreamChunk {
    Delta {
        chunk: String,
        done: bool,
    },
    Done {
        done: bool,
        #[serde(rename = "sessionId")]
        session_id: SessionId,
    },
    Error {
        error: String,
    },
}
