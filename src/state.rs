//! # Application State Management
//!
//! Shared state accessed by every HTTP request handler: the runtime
//! configuration, the gated backend services, the conversation store, and a
//! small set of request metrics.
//!
//! Everything mutable sits behind `Arc<RwLock<T>>`; the heavyweight services
//! carry their own internal locking and are shared as plain `Arc`s.

use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Instant;

use crate::chat::{SessionStore, TurnOrchestrator};
use crate::config::AppConfig;
use crate::llm::GenerationOrchestrator;
use crate::stt::{SttService, TranscriptionResult};
use crate::tts::SynthService;

/// The main application state shared across all HTTP request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration (can be updated at runtime)
    pub config: Arc<RwLock<AppConfig>>,

    /// Request counters, updated by the logging middleware
    pub metrics: Arc<RwLock<AppMetrics>>,

    /// Speech recognition service (gated Whisper backend + diagnostics)
    pub stt: Arc<SttService>,

    /// Reply generation orchestrator (gated GGUF backend + echo fallback)
    pub generator: Arc<GenerationOrchestrator>,

    /// Speech synthesis service (gated external command)
    pub synth: Arc<SynthService>,

    /// Conversation histories, keyed by session id
    pub sessions: Arc<SessionStore>,

    /// The full chat turn flow over the pieces above
    pub turns: Arc<TurnOrchestrator>,

    /// Path of the most recently uploaded audio file, kept for debugging
    pub last_audio: Arc<RwLock<Option<PathBuf>>>,

    /// Most recent transcription result, kept for debugging
    pub last_result: Arc<RwLock<Option<TranscriptionResult>>>,

    /// When the server started
    pub start_time: Instant,
}

/// Request counters collected across all HTTP requests.
#[derive(Debug, Default, Clone)]
pub struct AppMetrics {
    /// Total number of HTTP requests processed since server start
    pub request_count: u64,

    /// Total number of error responses since server start
    pub error_count: u64,
}

impl AppState {
    /// Assemble the state from configuration and the already-probed
    /// services.
    pub fn new(
        config: AppConfig,
        stt: Arc<SttService>,
        generator: Arc<GenerationOrchestrator>,
        synth: Arc<SynthService>,
    ) -> Self {
        let sessions = Arc::new(SessionStore::new());
        let turns = Arc::new(TurnOrchestrator::new(
            sessions.clone(),
            generator.clone(),
            synth.clone(),
        ));
        Self {
            config: Arc::new(RwLock::new(config)),
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            stt,
            generator,
            synth,
            sessions,
            turns,
            last_audio: Arc::new(RwLock::new(None)),
            last_result: Arc::new(RwLock::new(None)),
            start_time: Instant::now(),
        }
    }

    /// Get a copy of the current configuration. Cloning releases the lock
    /// immediately.
    pub fn get_config(&self) -> AppConfig {
        self.config.read().unwrap().clone()
    }

    /// Replace the configuration after validating it.
    pub fn update_config(&self, new_config: AppConfig) -> Result<(), String> {
        match new_config.validate() {
            Ok(_) => {
                *self.config.write().unwrap() = new_config;
                Ok(())
            }
            Err(e) => Err(e.to_string()),
        }
    }

    /// Increment the total request counter (called by middleware).
    pub fn increment_request_count(&self) {
        self.metrics.write().unwrap().request_count += 1;
    }

    /// Increment the total error counter (called on 4xx/5xx responses).
    pub fn increment_error_count(&self) {
        self.metrics.write().unwrap().error_count += 1;
    }

    /// Snapshot the counters for the health endpoint.
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        self.metrics.read().unwrap().clone()
    }

    /// Record the path of the most recent audio upload.
    pub fn set_last_audio(&self, path: PathBuf) {
        *self.last_audio.write().unwrap() = Some(path);
    }

    /// Path of the most recent audio upload, when one exists.
    pub fn get_last_audio(&self) -> Option<PathBuf> {
        self.last_audio.read().unwrap().clone()
    }

    /// Cache the most recent transcription result.
    pub fn set_last_result(&self, result: TranscriptionResult) {
        *self.last_result.write().unwrap() = Some(result);
    }

    /// Most recent transcription result, when one exists.
    pub fn get_last_result(&self) -> Option<TranscriptionResult> {
        self.last_result.read().unwrap().clone()
    }

    /// Server uptime in seconds.
    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
