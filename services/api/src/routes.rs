use crate::error::ApiError;
use axum::{Json, extract::State};
use secrecy::{ExposeSecret, SecretString};
use session_zero_core::history::{Role, Utterance};
use session_zero_core::oracle::{Mode, TurnOracle};
use session_zero_core::proxy::{
    ChatRequest, ChatResponse, RecognitionKeyResponse, StartSessionRequest, StartSessionResponse,
};
use std::sync::Arc;

pub struct AppState {
    pub oracle: Arc<dyn TurnOracle>,
    pub deepgram_api_key: Option<SecretString>,
}

fn parse_mode(mode: Option<&str>) -> Mode {
    mode.and_then(|m| m.parse().ok()).unwrap_or_default()
}

pub async fn deepgram_key(
    State(state): State<Arc<AppState>>,
) -> Result<Json<RecognitionKeyResponse>, ApiError> {
    let key = state
        .deepgram_api_key
        .as_ref()
        .ok_or_else(|| ApiError::internal("Deepgram API key not configured"))?;
    Ok(Json(RecognitionKeyResponse {
        api_key: key.expose_secret().to_string(),
    }))
}

pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let message = req
        .message
        .filter(|m| !m.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Message is required"))?;
    let mode = parse_mode(req.mode.as_deref());

    let mut messages = req.history;
    messages.push(Utterance::user(message));
    tracing::debug!("Chat turn with {} messages ({} mode)", messages.len(), mode);

    let reply = state.oracle.respond(mode, &messages).await.map_err(|e| {
        tracing::error!("Chat error: {:#}", e);
        ApiError::internal("Failed to get response from GM").with_details(&e)
    })?;
    Ok(Json(ChatResponse {
        message: reply,
        role: Role::Assistant,
    }))
}

pub async fn start_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StartSessionRequest>,
) -> Result<Json<StartSessionResponse>, ApiError> {
    let mode = parse_mode(req.mode.as_deref());
    tracing::info!("Starting session in {} mode", mode);

    let reply = state.oracle.open_session(mode).await.map_err(|e| {
        tracing::error!("Start session error: {:#}", e);
        ApiError::internal("Failed to start session").with_details(&e)
    })?;
    Ok(Json(StartSessionResponse {
        message: reply,
        role: Role::Assistant,
        mode,
    }))
}
