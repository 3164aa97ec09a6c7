//! HTTP request handlers

use super::assets::{get_index_html, serve_static};
use super::sse::sse_stream;
use super::types::{
    ChatRequest, ChatResponse, CreateSessionResponse, ErrorResponse, OptionsResponse,
    SettingsRequest, SuccessResponse,
};
use super::AppState;
use crate::llm::option_specs;
use crate::runtime::{RuntimeError, SessionSnapshot, SseEvent};
use crate::state_machine::{Event, SessionSettings, TransitionError};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::Value;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Root serves the page
        .route("/", get(serve_page))
        .route("/static/*path", get(serve_static))
        // Sidebar control ranges
        .route("/api/options", get(get_options))
        // Session lifecycle
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/:id", get(get_session))
        .route("/api/sessions/:id/close", post(close_session))
        // SSE streaming
        .route("/api/sessions/:id/stream", get(stream_session))
        // User actions
        .route("/api/sessions/:id/chat", post(send_chat))
        .route("/api/sessions/:id/settings", post(update_settings))
        .route("/api/sessions/:id/soliloquy/start", post(start_soliloquy))
        .route("/api/sessions/:id/soliloquy/stop", post(stop_soliloquy))
        // Speech queue; there is one voice per process, shared by every session
        .route("/api/speech/clear", post(clear_speech))
        // Version
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Page
// ============================================================

async fn serve_page() -> impl IntoResponse {
    match get_index_html() {
        Some(content) => Html(content).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Html("<h1>404 - UI not found</h1>".to_string()),
        )
            .into_response(),
    }
}

async fn get_options(State(state): State<AppState>) -> Json<OptionsResponse> {
    Json(OptionsResponse {
        options: option_specs().to_vec(),
        defaults: SessionSettings::default(),
        speech_available: state.runtime.narrator().is_available(),
        model: state.runtime.model_id().to_string(),
    })
}

// ============================================================
// Session Lifecycle
// ============================================================

async fn create_session(State(state): State<AppState>) -> Json<CreateSessionResponse> {
    let (id, snapshot) = state.runtime.create_session().await;
    Json(CreateSessionResponse {
        id,
        log_file: snapshot.log_file,
    })
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionSnapshot>, AppError> {
    Ok(Json(state.runtime.snapshot(&id).await?))
}

async fn close_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, AppError> {
    state.runtime.close_session(&id).await?;
    Ok(Json(SuccessResponse { success: true }))
}

// ============================================================
// SSE Streaming
// ============================================================

async fn stream_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    // Subscribe to updates
    let (broadcast_rx, snapshot) = state.runtime.subscribe(&id).await?;

    let json_msgs: Vec<Value> = snapshot
        .messages
        .iter()
        .map(|m| serde_json::to_value(m).unwrap_or(Value::Null))
        .collect();

    // Create init event
    let init_event = SseEvent::Init {
        messages: json_msgs,
        state: serde_json::to_value(&snapshot.state).unwrap_or(Value::Null),
        log_file: snapshot.log_file,
    };

    Ok(sse_stream(init_event, broadcast_rx))
}

// ============================================================
// User Actions
// ============================================================

async fn send_chat(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    if req.text.trim().is_empty() {
        return Err(AppError::BadRequest(TransitionError::EmptyMessage.to_string()));
    }
    req.settings
        .options
        .validate()
        .map_err(AppError::BadRequest)?;

    // Send event to runtime
    let event = Event::UserMessage {
        text: req.text,
        settings: req.settings,
    };
    state.runtime.send_event(&id, event).await?;

    Ok(Json(ChatResponse { queued: true }))
}

async fn update_settings(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SettingsRequest>,
) -> Result<Json<SuccessResponse>, AppError> {
    req.settings
        .options
        .validate()
        .map_err(AppError::BadRequest)?;

    state
        .runtime
        .send_event(
            &id,
            Event::SettingsChanged {
                settings: req.settings,
            },
        )
        .await?;

    Ok(Json(SuccessResponse { success: true }))
}

async fn start_soliloquy(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, AppError> {
    state.runtime.send_event(&id, Event::StartSoliloquy).await?;
    Ok(Json(SuccessResponse { success: true }))
}

async fn stop_soliloquy(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, AppError> {
    state.runtime.send_event(&id, Event::StopSoliloquy).await?;
    Ok(Json(SuccessResponse { success: true }))
}

/// Drop queued speech for all sessions.
///
/// Playback is serialized through a single process-wide queue, so this is
/// not scoped to the caller's session.
async fn clear_speech(State(state): State<AppState>) -> Json<SuccessResponse> {
    state.runtime.narrator().clear();
    Json(SuccessResponse { success: true })
}

async fn get_version() -> &'static str {
    concat!("mirror-chat ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl From<RuntimeError> for AppError {
    fn from(e: RuntimeError) -> Self {
        match e {
            RuntimeError::SessionNotFound(_) => AppError::NotFound(e.to_string()),
            RuntimeError::Closed(_) => AppError::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
