use once_cell::sync::Lazy;
use regex::Regex;
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::config::ChatConfig;
use crate::models::chat::{MessageParams, SendMessageRequest, SessionId};
use crate::services::conversation::ChatError;

/// Canonical 8-4-4-4-12 hex form, any case
static SESSION_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$")
        .expect("session id pattern is valid")
});
static CONTROL_CHARS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F\x7F]").expect("control char pattern is valid")
});
static EXTRA_NEWLINES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n{3,}").expect("newline pattern is valid"));
static EXTRA_SPACES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r" {2,}").expect("space pattern is valid"));

pub fn parse_session_id(raw: &str) -> Result<SessionId, ChatError> {
    if !SESSION_ID.is_match(raw) {
        return Err(ChatError::Validation("Session ID inválido".to_string()));
    }
    Uuid::parse_str(raw).map_err(|_| ChatError::Validation("Session ID inválido".to_string()))
}

/// Strip control characters (newline, tab and carriage return survive) and collapse runs of
/// blank lines and spaces.
pub fn sanitize_message(message: &str) -> String {
    let message = CONTROL_CHARS.replace_all(message, "");
    let message = EXTRA_NEWLINES.replace_all(&message, "\n\n");
    let message = EXTRA_SPACES.replace_all(&message, " ");
    message.trim().to_string()
}

/// Check a send request and fill in the defaults.
pub fn validate_message_request(
    request: SendMessageRequest,
    config: &ChatConfig,
) -> Result<MessageParams, ChatError> {
    request
        .validate()
        .map_err(|e| ChatError::Validation(first_message(&e)))?;

    let message = sanitize_message(&request.message);
    if message.is_empty() {
        return Err(ChatError::Validation("Mensagem não pode estar vazia".to_string()));
    }
    if message.chars().count() > config.max_message_length {
        return Err(ChatError::Validation(format!(
            "Mensagem muito longa (máximo {} caracteres)",
            config.max_message_length
        )));
    }

    Ok(MessageParams {
        message,
        max_tokens: request.max_length.unwrap_or(config.default_max_length),
        temperature: request.temperature.unwrap_or(config.default_temperature),
    })
}

fn first_message(errors: &ValidationErrors) -> String {
    errors
        .field_errors()
        .values()
        .flat_map(|errs| errs.iter())
        .find_map(|e| e.message.as_ref().map(|m| m.to_string()))
        .unwrap_or_else(|| errors.to_string())
}
