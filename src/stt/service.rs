//! # Transcription Service
//!
//! Front door for speech recognition. Guarantees that every request yields a
//! [`TranscriptionResult`] value: recognition failures, an unavailable model
//! and broken diagnostics all degrade into fields of the result rather than
//! HTTP-level errors.

use std::path::Path;

use crate::audio;
use crate::capability::{no_fallback, CapabilityError, CapabilityHandle};
use crate::stt::result::TranscriptionResult;
use crate::stt::whisper::WhisperBackend;
use crate::stt::SpeechToText;

/// Gated recognition backend plus the best-effort diagnostics pass.
pub struct SttService {
    handle: CapabilityHandle<Box<dyn SpeechToText + Send>>,
}

impl SttService {
    /// Build the service, eagerly probing the Whisper model named in
    /// configuration.
    pub async fn new(whisper_model: String) -> Self {
        let handle = CapabilityHandle::new("speech-to-text", move || {
            let backend = WhisperBackend::load(&whisper_model)?;
            Ok(Box::new(backend) as Box<dyn SpeechToText + Send>)
        })
        .await;
        Self { handle }
    }

    /// Build the service around an arbitrary backend probe (used by tests).
    #[cfg(test)]
    pub async fn with_probe<P>(probe: P) -> Self
    where
        P: Fn() -> Result<Box<dyn SpeechToText + Send>, String> + Send + Sync + 'static,
    {
        Self {
            handle: CapabilityHandle::new("speech-to-text", probe).await,
        }
    }

    /// Transcribe the WAV file at `path`. Always returns a result value.
    pub async fn transcribe(&self, path: &Path) -> TranscriptionResult {
        // Diagnostics run first and are best-effort: a failure here only
        // costs the diagnostics block.
        let diagnostics = match audio::inspect(path) {
            Ok(d) => Some(d),
            Err(e) => {
                tracing::warn!("audio diagnostics skipped: {}", e);
                None
            }
        };
        let file_size = std::fs::metadata(path).ok().map(|m| m.len());

        let outcome = self
            .handle
            .invoke(|backend| backend.transcribe(path), no_fallback)
            .await;

        let mut result = match outcome {
            Ok(raw) => TranscriptionResult::from_raw(raw),
            Err(CapabilityError::Unavailable(reason)) => TranscriptionResult::unavailable(&reason),
            Err(CapabilityError::Backend(msg)) => {
                tracing::error!("recognition backend failed: {}", msg);
                TranscriptionResult::failed(&msg)
            }
        };
        result.diagnostics = diagnostics;
        result.file_size = file_size;
        result
    }

    /// Whether a recognition model is currently loaded.
    pub async fn available(&self) -> bool {
        self.handle.available().await
    }

    /// Probe failure reason, when unavailable.
    pub async fn unavailable_reason(&self) -> Option<String> {
        self.handle.unavailable_reason().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::diagnostics::tests::{pcm16, write_wav};
    use crate::stt::RawTranscription;
    use serde_json::json;

    struct FakeRecognizer {
        output: RawTranscription,
    }

    impl SpeechToText for FakeRecognizer {
        fn transcribe(&mut self, _path: &Path) -> Result<RawTranscription, String> {
            Ok(self.output.clone())
        }
    }

    struct FailingRecognizer;

    impl SpeechToText for FailingRecognizer {
        fn transcribe(&mut self, _path: &Path) -> Result<RawTranscription, String> {
            Err("inference crashed".to_string())
        }
    }

    #[tokio::test]
    async fn test_transcription_with_diagnostics() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(dir.path(), "in.wav", 1, 16000, 2, &pcm16(&vec![1000i16; 1600]));

        let service = SttService::with_probe(|| {
            Ok(Box::new(FakeRecognizer {
                output: RawTranscription {
                    text: " hello ".to_string(),
                    language: Some("en".to_string()),
                    segments: vec![json!({"start": 0.0, "end": 0.1, "text": "hello"})],
                },
            }) as Box<dyn SpeechToText + Send>)
        })
        .await;

        let result = service.transcribe(&path).await;
        assert_eq!(result.text, "hello");
        assert!(result.model_loaded);
        assert!(result.error.is_none());
        let diag = result.diagnostics.expect("diagnostics should be attached");
        assert_eq!(diag.sample_rate, 16000);
        assert_eq!(result.file_size, Some(std::fs::metadata(&path).unwrap().len()));
    }

    #[tokio::test]
    async fn test_unavailable_backend_still_yields_result() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(dir.path(), "in.wav", 1, 16000, 2, &pcm16(&[0i16; 100]));

        let service = SttService::with_probe(|| Err("model not installed".to_string())).await;

        let result = service.transcribe(&path).await;
        assert!(result.text.is_empty());
        assert!(!result.model_loaded);
        assert_eq!(result.error.as_deref(), Some("model not installed"));
        // Diagnostics are independent of the recognition backend.
        assert!(result.diagnostics.is_some());
    }

    #[tokio::test]
    async fn test_backend_failure_is_absorbed() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(dir.path(), "in.wav", 1, 16000, 2, &pcm16(&[0i16; 100]));

        let service = SttService::with_probe(|| {
            Ok(Box::new(FailingRecognizer) as Box<dyn SpeechToText + Send>)
        })
        .await;

        let result = service.transcribe(&path).await;
        assert!(result.text.is_empty());
        assert!(result.model_loaded);
        assert_eq!(result.error.as_deref(), Some("inference crashed"));
    }

    #[tokio::test]
    async fn test_broken_audio_omits_diagnostics_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.wav");
        std::fs::write(&path, b"not a wav at all").unwrap();

        let service = SttService::with_probe(|| {
            Ok(Box::new(FakeRecognizer {
                output: RawTranscription {
                    text: "still works".to_string(),
                    language: None,
                    segments: vec![],
                },
            }) as Box<dyn SpeechToText + Send>)
        })
        .await;

        let result = service.transcribe(&path).await;
        // The fake backend does not read the file; the point is that the
        // diagnostics failure alone never fails the request.
        assert_eq!(result.text, "still works");
        assert!(result.diagnostics.is_none());
    }
}
