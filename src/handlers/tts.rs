//! # Synthesis Endpoint

use actix_web::{web, HttpResponse};
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SynthesizeQuery {
    pub text: String,
}

/// `GET /api/tts?text=...` — synthesize text to a WAV stream.
///
/// Synthesis has no fallback: an unavailable backend is a 503 with the
/// recorded probe reason, never fabricated audio.
pub async fn synthesize(
    state: web::Data<AppState>,
    query: web::Query<SynthesizeQuery>,
) -> AppResult<HttpResponse> {
    if query.text.trim().is_empty() {
        return Err(AppError::BadRequest("text must not be empty".to_string()));
    }

    let audio = state.synth.synthesize(&query.text).await?;
    Ok(HttpResponse::Ok().content_type("audio/wav").body(audio))
}
