//! # HTTP Request Handlers
//!
//! Route handlers for the public API: transcription uploads, chat turns,
//! synthesis, history management and runtime configuration.

pub mod chat;
pub mod config;
pub mod stt;
pub mod tts;

pub use chat::{chat_turn, clear_history, create_session, list_sessions, read_history};
pub use config::{get_config, update_config};
pub use stt::{debug_transcribe, last_transcription, transcribe_upload};
pub use tts::synthesize;
