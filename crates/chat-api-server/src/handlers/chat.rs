use crate::config::Settings;
use crate::models::chat::*;
use crate::services::conversation::ConversationManager;
use crate::utils::error::ApiError;
use crate::utils::validation::{parse_session_id, validate_message_request};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::stream::{Stream, StreamExt};
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{debug, info};

fn message_params(
    body: Result<Json<SendMessageRequest>, JsonRejection>,
    settings: &Settings,
) -> Result<MessageParams, ApiError> {
    let Json(request) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    Ok(validate_message_request(request, &settings.chat)?)
}

pub async fn create_session_handler(
    State(manager): State<Arc<ConversationManager>>,
) -> Result<Json<CreateSessionResponse>, ApiError> {
    let session_id = manager.create_session()?;

    Ok(Json(CreateSessionResponse {
        session_id,
        message: "Sessão criada com sucesso".to_string(),
    }))
}

pub async fn send_message_handler(
    State(manager): State<Arc<ConversationManager>>,
    State(settings): State<Arc<Settings>>,
    Path(raw_id): Path<String>,
    body: Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<Json<ChatReply>, ApiError> {
    let session_id = parse_session_id(&raw_id)?;
    let params = message_params(body, &settings)?;

    info!(
        "Message request: session={}, message_len={}, max_tokens={}, temperature={}",
        session_id,
        params.message.chars().count(),
        params.max_tokens,
        params.temperature
    );

    let reply = manager.send_message(session_id, params).await?;
    Ok(Json(reply))
}

pub async fn stream_message_handler(
    State(manager): State<Arc<ConversationManager>>,
    State(settings): State<Arc<Settings>>,
    Path(raw_id): Path<String>,
    body: Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let session_id = parse_session_id(&raw_id)?;
    let params = message_params(body, &settings)?;

    debug!("Stream request: session={}", session_id);

    let stream = manager
        .stream_message(session_id, params)?
        .map(|chunk| Ok(create_sse_event(&chunk)));

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

pub async fn history_handler(
    State(manager): State<Arc<ConversationManager>>,
    Path(raw_id): Path<String>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let session_id = parse_session_id(&raw_id)?;
    let history = manager.history(session_id)?;

    Ok(Json(HistoryResponse { session_id, history }))
}

pub async fn clear_session_handler(
    State(manager): State<Arc<ConversationManager>>,
    Path(raw_id): Path<String>,
) -> Result<Json<ClearSessionResponse>, ApiError> {
    let session_id = parse_session_id(&raw_id)?;
    manager.clear_session(session_id)?;

    Ok(Json(ClearSessionResponse {
        message: "Sessão limpa com sucesso".to_string(),
        session_id,
    }))
}

pub async fn model_info_handler(
    State(manager): State<Arc<ConversationManager>>,
) -> Result<Json<ModelInfo>, ApiError> {
    Ok(Json(manager.model_info()?))
}

pub async fn status_handler(
    State(manager): State<Arc<ConversationManager>>,
) -> Json<StatusResponse> {
    Json(manager.status())
}

// Helper: one `data:` frame per chunk
fn create_sse_event<T: serde::Serialize>(data: &T) -> Event {
    Event::default().data(serde_json::to_string(data).unwrap_or_else(|_| "{}".to_string()))
}
