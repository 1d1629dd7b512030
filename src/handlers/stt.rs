//! # Transcription Endpoints
//!
//! Audio uploads come in as multipart form data, are spooled to a temp file
//! and handed to the recognition service. The response is always the stable
//! transcription shape, whatever happened to the backend.

use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use futures_util::StreamExt;
use serde_json::json;
use std::io::Write;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Reject uploads above 50 MB before they hit the recognizer.
const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// `POST /api/stt` — transcribe an uploaded WAV file.
///
/// Expects a multipart field named `audio`. The upload is kept on disk
/// afterwards so the debug endpoint can replay it.
pub async fn transcribe_upload(
    state: web::Data<AppState>,
    mut payload: Multipart,
) -> AppResult<HttpResponse> {
    let mut audio_data: Option<Vec<u8>> = None;

    while let Some(item) = payload.next().await {
        let mut field = item.map_err(|e| AppError::BadRequest(format!("Multipart error: {}", e)))?;

        let field_name = field
            .content_disposition()
            .and_then(|d| d.get_name())
            .map(str::to_string);
        if field_name.as_deref() != Some("audio") {
            continue;
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(|e| AppError::BadRequest(format!("Chunk error: {}", e)))?;
            if bytes.len() + chunk.len() > MAX_UPLOAD_BYTES {
                return Err(AppError::BadRequest(format!(
                    "Audio upload exceeds {} bytes",
                    MAX_UPLOAD_BYTES
                )));
            }
            bytes.extend_from_slice(&chunk);
        }
        audio_data = Some(bytes);
    }

    let audio_bytes =
        audio_data.ok_or_else(|| AppError::BadRequest("No audio field provided".to_string()))?;

    // Spool to a named temp file the recognition backend can read; the file
    // is kept so the debug endpoint can replay the last upload.
    let mut file = tempfile::Builder::new()
        .prefix("upload-")
        .suffix(".wav")
        .tempfile()
        .map_err(AppError::from)?;
    file.write_all(&audio_bytes).map_err(AppError::from)?;
    let (_, path) = file.keep().map_err(|e| AppError::Internal(e.to_string()))?;

    // Drop the previous upload before replacing the pointer to it.
    if let Some(old) = state.get_last_audio() {
        let _ = std::fs::remove_file(old);
    }
    state.set_last_audio(path.clone());

    let result = state.stt.transcribe(&path).await;
    state.set_last_result(result.clone());

    Ok(HttpResponse::Ok().json(result))
}

/// `GET /api/last_stt` — the most recent transcription result.
pub async fn last_transcription(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    match state.get_last_result() {
        Some(result) => Ok(HttpResponse::Ok().json(result)),
        None => Err(AppError::NotFound("No transcription has run yet".to_string())),
    }
}

/// `POST /api/debug_transcribe` — re-run recognition on the last upload.
///
/// Useful after installing a model: the lazy re-probe fires on this call.
pub async fn debug_transcribe(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let path = state
        .get_last_audio()
        .ok_or_else(|| AppError::NotFound("No audio has been uploaded yet".to_string()))?;
    if !path.exists() {
        return Err(AppError::NotFound(format!(
            "Last upload {} no longer exists",
            path.display()
        )));
    }

    let result = state.stt.transcribe(&path).await;
    state.set_last_result(result.clone());

    Ok(HttpResponse::Ok().json(json!({
        "file": path.display().to_string(),
        "result": result,
    })))
}
