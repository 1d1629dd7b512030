//! # Audio Processing
//!
//! WAV container handling: loudness/structure diagnostics over the raw PCM
//! payload, and decoding to the mono 16 kHz float stream the speech
//! recognizer consumes.

pub mod decode;
pub mod diagnostics;

pub use diagnostics::{inspect, AudioDiagnostics, DiagnosticsError};
