//! # Speech Recognition
//!
//! The transcription flow: a gated Whisper backend produces raw, untrusted
//! output; the normalizer coerces it into the stable [`TranscriptionResult`]
//! shape; the service layer attaches best-effort audio diagnostics and
//! guarantees a result value for every request, loaded model or not.

pub mod result;
pub mod service;
pub mod whisper;

pub use result::{Segment, TranscriptionResult};
pub use service::SttService;

/// Output of a recognition backend, before normalization.
///
/// Segment entries are kept as raw JSON values: backend output is treated as
/// untrusted and coerced field-by-field downstream.
#[derive(Debug, Clone, Default)]
pub struct RawTranscription {
    pub text: String,
    pub language: Option<String>,
    pub segments: Vec<serde_json::Value>,
}

/// A loaded speech recognition backend.
///
/// Implementations report failures as reason strings; the capability gate
/// converts them into its own error shape.
pub trait SpeechToText: Send {
    /// Transcribe the WAV file at `path`.
    fn transcribe(&mut self, path: &std::path::Path) -> Result<RawTranscription, String>;
}
