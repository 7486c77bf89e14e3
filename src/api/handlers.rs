//! HTTP request handlers

use super::sse::sse_stream;
use super::types::{ErrorResponse, PromptRequest, PromptResponse, RenameRequest, SuccessResponse};
use super::AppState;
use crate::studio::StudioSnapshot;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Snapshot of the current view
        .route("/api/state", get(get_state))
        // Live updates
        .route("/api/events", get(stream_events))
        // Generation
        .route("/api/prompt", post(submit_prompt))
        .route("/api/messages/:id/cancel", post(cancel_stream))
        .route("/api/messages/:id/render", post(render_video))
        // Conversation lifecycle
        .route("/api/conversations/:id/select", post(select_conversation))
        .route("/api/conversations/:id/delete", post(delete_conversation))
        .route("/api/conversations/:id/rename", post(rename_conversation))
        .route("/api/conversations/:id/clear-error", post(clear_error))
        .route("/api/refresh", post(refresh))
        // Version
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// State
// ============================================================

async fn get_state(State(state): State<AppState>) -> Json<StudioSnapshot> {
    Json(state.studio.current_state())
}

async fn stream_events(State(state): State<AppState>) -> impl IntoResponse {
    // Subscribe before the snapshot so nothing falls between them
    let rx = state.studio.subscribe();
    sse_stream(state.studio.current_state(), rx)
}

// ============================================================
// Generation
// ============================================================

async fn submit_prompt(
    State(state): State<AppState>,
    Json(req): Json<PromptRequest>,
) -> Json<PromptResponse> {
    let message_id = state
        .studio
        .submit_prompt(&req.prompt, req.conversation_id.as_deref());

    Json(PromptResponse {
        accepted: message_id.is_some(),
        message_id,
    })
}

async fn cancel_stream(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, AppError> {
    if !state.studio.cancel_stream(&id) {
        return Err(AppError::NotFound(format!("Nothing running for message {id}")));
    }
    Ok(Json(SuccessResponse { success: true }))
}

async fn render_video(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, AppError> {
    if !state.studio.render_video(&id) {
        return Err(AppError::BadRequest(format!(
            "Message {id} cannot be rendered right now"
        )));
    }
    Ok(Json(SuccessResponse { success: true }))
}

// ============================================================
// Conversation lifecycle
// ============================================================

async fn select_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, AppError> {
    if !state.studio.select_conversation(&id) {
        return Err(AppError::NotFound(format!("Conversation not found: {id}")));
    }
    Ok(Json(SuccessResponse { success: true }))
}

async fn delete_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, AppError> {
    if !state.studio.delete_conversation(&id) {
        return Err(AppError::NotFound(format!("Conversation not found: {id}")));
    }
    Ok(Json(SuccessResponse { success: true }))
}

async fn rename_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<RenameRequest>,
) -> Result<Json<SuccessResponse>, AppError> {
    if req.title.trim().is_empty() {
        return Err(AppError::BadRequest("Title cannot be empty".to_string()));
    }
    if !state.studio.rename_conversation(&id, &req.title) {
        return Err(AppError::NotFound(format!("Conversation not found: {id}")));
    }
    Ok(Json(SuccessResponse { success: true }))
}

async fn clear_error(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, AppError> {
    if !state.studio.clear_error(&id) {
        return Err(AppError::NotFound(format!("Conversation not found: {id}")));
    }
    Ok(Json(SuccessResponse { success: true }))
}

async fn refresh(State(state): State<AppState>) -> Result<Json<SuccessResponse>, AppError> {
    if !state.studio.refresh().await {
        return Err(AppError::Internal(
            "Failed to load conversations from backend".to_string(),
        ));
    }
    Ok(Json(SuccessResponse { success: true }))
}

async fn get_version() -> &'static str {
    concat!("manim-studio ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

enum AppError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
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
