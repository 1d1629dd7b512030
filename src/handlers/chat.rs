//! # Chat & History Endpoints
//!
//! One endpoint runs a full conversation turn (optionally returning
//! synthesized audio); the rest manage session histories.

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    /// The user's utterance
    pub text: String,

    /// Continue this session; a fresh one is created when absent
    pub session_id: Option<String>,

    /// Return synthesized audio instead of JSON
    #[serde(default)]
    pub tts: bool,
}

/// `POST /api/chat` — run one conversation turn.
///
/// With `tts: true` the response body is the synthesized WAV stream and the
/// session id travels in the `X-Session-Id` header.
pub async fn chat_turn(
    state: web::Data<AppState>,
    request: web::Json<ChatRequest>,
) -> AppResult<HttpResponse> {
    let request = request.into_inner();
    if request.text.trim().is_empty() {
        return Err(AppError::BadRequest("text must not be empty".to_string()));
    }

    let outcome = state
        .turns
        .handle_turn(request.session_id, &request.text, request.tts)
        .await?;

    match outcome.audio {
        Some(audio) => Ok(HttpResponse::Ok()
            .content_type("audio/wav")
            .insert_header(("X-Session-Id", outcome.session_id))
            .body(audio)),
        None => Ok(HttpResponse::Ok().json(json!({
            "session_id": outcome.session_id,
            "reply": outcome.reply,
        }))),
    }
}

/// `POST /api/history` — create an empty session.
pub async fn create_session(state: web::Data<AppState>) -> HttpResponse {
    let session_id = state.sessions.create_session().await;
    HttpResponse::Created().json(json!({ "session_id": session_id }))
}

/// `GET /api/history` — ids of every known session.
pub async fn list_sessions(state: web::Data<AppState>) -> HttpResponse {
    let sessions = state.sessions.session_ids().await;
    HttpResponse::Ok().json(json!({ "sessions": sessions }))
}

/// `GET /api/history/{session_id}` — a session's turns in order.
///
/// Unknown sessions read as empty rather than 404: callers may hold ids
/// minted elsewhere, and an empty history is the honest answer.
pub async fn read_history(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> HttpResponse {
    let session_id = path.into_inner();
    let turns = state.sessions.read(&session_id).await;
    HttpResponse::Ok().json(json!({
        "session_id": session_id,
        "turns": turns,
    }))
}

/// `DELETE /api/history/{session_id}` — empty a session, keeping it valid.
pub async fn clear_history(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> HttpResponse {
    let session_id = path.into_inner();
    let existed = state.sessions.clear(&session_id).await;
    HttpResponse::Ok().json(json!({
        "session_id": session_id,
        "existed": existed,
    }))
}
