use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;

/// Liveness check plus a summary of backend availability.
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let config = state.get_config();
    let uptime_seconds = state.get_uptime_seconds();

    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "service": {
            "name": "voicechat-backend",
            "version": env!("CARGO_PKG_VERSION"),
            "host": config.server.host,
            "port": config.server.port
        },
        "metrics": {
            "total_requests": metrics.request_count,
            "total_errors": metrics.error_count,
            "error_rate": if metrics.request_count > 0 {
                metrics.error_count as f64 / metrics.request_count as f64
            } else {
                0.0
            },
            "sessions": state.sessions.session_ids().await.len()
        },
        "capabilities": {
            "speech_to_text": {
                "model": config.models.whisper_model,
                "available": state.stt.available().await,
                "reason": state.stt.unavailable_reason().await
            },
            "text_generation": {
                "model": config.models.llm_model_path,
                "available": state.generator.available().await,
                "reason": state.generator.unavailable_reason().await
            },
            "speech_synthesis": {
                "command": config.models.tts_command,
                "available": state.synth.available().await,
                "reason": state.synth.unavailable_reason().await
            }
        }
    }))
}

/// Minimal liveness ping.
pub async fn ping() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "message": "pong" }))
}
