//! # Speech Synthesis
//!
//! Text-to-speech through an external synthesis command. Unlike generation,
//! synthesis has no sensible fallback: fabricated audio is worse than an
//! honest "unavailable", so the gate surfaces the probe reason instead.

pub mod piper;

use crate::capability::{no_fallback, CapabilityError, CapabilityHandle};
use piper::CommandBackend;

/// A loaded speech synthesis backend. Returns a complete WAV byte stream.
pub trait SpeechSynthesis: Send {
    fn synthesize(&mut self, text: &str) -> Result<Vec<u8>, String>;
}

/// Gated synthesis backend.
pub struct SynthService {
    handle: CapabilityHandle<Box<dyn SpeechSynthesis + Send>>,
}

impl SynthService {
    /// Build the service, eagerly probing the configured external command.
    pub async fn new(tts_command: String) -> Self {
        let handle = CapabilityHandle::new("speech-synthesis", move || {
            let backend = CommandBackend::probe(&tts_command)?;
            Ok(Box::new(backend) as Box<dyn SpeechSynthesis + Send>)
        })
        .await;
        Self { handle }
    }

    /// Build the service around an arbitrary backend probe (tests).
    #[cfg(test)]
    pub async fn with_probe<P>(probe: P) -> Self
    where
        P: Fn() -> Result<Box<dyn SpeechSynthesis + Send>, String> + Send + Sync + 'static,
    {
        Self {
            handle: CapabilityHandle::new("speech-synthesis", probe).await,
        }
    }

    /// Synthesize `text` to WAV bytes, or report why that is impossible.
    pub async fn synthesize(&self, text: &str) -> Result<Vec<u8>, CapabilityError> {
        let text = text.to_string();
        self.handle
            .invoke(move |backend| backend.synthesize(&text), no_fallback)
            .await
    }

    /// Whether a synthesis backend is currently available.
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

    struct FakeSynth;

    impl SpeechSynthesis for FakeSynth {
        fn synthesize(&mut self, text: &str) -> Result<Vec<u8>, String> {
            Ok(format!("WAV:{}", text).into_bytes())
        }
    }

    #[tokio::test]
    async fn test_synthesis_passes_through() {
        let service =
            SynthService::with_probe(|| Ok(Box::new(FakeSynth) as Box<dyn SpeechSynthesis + Send>))
                .await;
        let audio = service.synthesize("hello").await.unwrap();
        assert_eq!(audio, b"WAV:hello");
    }

    #[tokio::test]
    async fn test_unavailable_surfaces_reason() {
        let service = SynthService::with_probe(|| Err("no voice installed".to_string())).await;
        let err = service.synthesize("hello").await.unwrap_err();
        assert_eq!(
            err,
            CapabilityError::Unavailable("no voice installed".to_string())
        );
    }
}
