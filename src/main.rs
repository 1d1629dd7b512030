//! # Voice Chat Backend - Main Application Entry Point
//!
//! HTTP server for a local voice chat pipeline: speech recognition with
//! audio diagnostics, reply generation from a local GGUF model, speech
//! synthesis, and per-session conversation history.
//!
//! ## Application Architecture:
//! - **config**: TOML + environment configuration
//! - **capability**: probe/fallback gating for the optional heavy backends
//! - **audio**: WAV diagnostics and PCM decoding
//! - **stt / llm / tts**: the three gated backend services
//! - **chat**: session store and the turn flow
//! - **state / middleware / handlers / health / error**: the HTTP shell
//!
//! Every backend is optional at runtime: the server starts (and stays up)
//! with no models installed, degrading each capability per its contract.

mod audio;
mod capability;
mod chat;
mod config;
mod error;
mod handlers;
mod health;
mod llm;
mod middleware;
mod state;
mod stt;
mod tts;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::AppConfig;
use llm::GenerationOrchestrator;
use state::AppState;
use stt::SttService;
use tts::SynthService;

/// Global shutdown flag, set by the signal handler task.
static SHUTDOWN_SIGNAL: AtomicBool = AtomicBool::new(false);

#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting voicechat-backend v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded: {}:{}", config.server.host, config.server.port);

    // Probe all three backends eagerly: load failures are reported here at
    // startup, and the server comes up degraded rather than not at all.
    let stt = Arc::new(SttService::new(config.models.whisper_model.clone()).await);
    let generator =
        Arc::new(GenerationOrchestrator::new(&config.models, &config.generation).await);
    let synth = Arc::new(SynthService::new(config.models.tts_command.clone()).await);

    info!(
        "Capabilities: stt={} generation={} synthesis={}",
        stt.available().await,
        generator.available().await,
        synth.available().await
    );

    let app_state = AppState::new(config.clone(), stt, generator, synth);
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    setup_signal_handlers();

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(cors)
            .wrap(Logger::default())
            .wrap(middleware::RequestLogging)
            .service(
                web::scope("/api")
                    .route("/ping", web::get().to(health::ping))
                    .route("/stt", web::post().to(handlers::transcribe_upload))
                    .route("/last_stt", web::get().to(handlers::last_transcription))
                    .route("/debug_transcribe", web::post().to(handlers::debug_transcribe))
                    .route("/chat", web::post().to(handlers::chat_turn))
                    .route("/tts", web::get().to(handlers::synthesize))
                    .route("/history", web::post().to(handlers::create_session))
                    .route("/history", web::get().to(handlers::list_sessions))
                    .route("/history/{session_id}", web::get().to(handlers::read_history))
                    .route("/history/{session_id}", web::delete().to(handlers::clear_history))
                    .route("/config", web::get().to(handlers::get_config))
                    .route("/config", web::put().to(handlers::update_config)),
            )
            .route("/health", web::get().to(health::health_check))
    })
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    // Race the server against the shutdown signal.
    tokio::select! {
        result = server_task => {
            match result {
                Ok(server_result) => {
                    if let Err(e) = server_result {
                        error!("Server error: {}", e);
                    }
                }
                Err(e) => {
                    error!("Server task error: {}", e);
                }
            }
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Initialize structured logging. `RUST_LOG` overrides the default filter.
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voicechat_backend=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

/// Listen for SIGTERM/SIGINT and flip the shutdown flag.
fn setup_signal_handlers() {
    tokio::spawn(async {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler");
        let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
            .expect("Failed to install SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }

        SHUTDOWN_SIGNAL.store(true, Ordering::SeqCst);
    });
}

/// Poll the shutdown flag until it is set.
async fn wait_for_shutdown() {
    while !SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }
}
