//! # Transcription Result Normalization
//!
//! Recognition backends are treated as untrusted: their output is coerced
//! field-by-field into one stable response shape. Anything malformed is
//! coerced or defaulted, never propagated as an error — a bad segment list
//! must not cost the caller the transcribed text.

use serde::Serialize;
use serde_json::Value;

use crate::audio::AudioDiagnostics;
use crate::stt::RawTranscription;

/// One timed span of recognized speech.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Segment {
    /// Span start in seconds; absent when the backend gave none or garbage
    pub start: Option<f64>,

    /// Span end in seconds; absent when the backend gave none or garbage
    pub end: Option<f64>,

    /// Recognized text for the span, whitespace-trimmed
    pub text: String,
}

/// The stable transcription response shape.
///
/// Every transcription request yields one of these. Invariant: when `error`
/// is set, `text` is empty and `segments` is empty.
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptionResult {
    /// Full recognized text, whitespace-trimmed; empty on failure
    pub text: String,

    /// Detected language code, when the backend reported one
    pub language: Option<String>,

    /// Timed segments, in backend order
    pub segments: Vec<Segment>,

    /// Loudness/structure metrics for the input; omitted when diagnostics
    /// failed (their failure never fails the transcription)
    pub diagnostics: Option<AudioDiagnostics>,

    /// Whether a recognition model was actually loaded for this request
    pub model_loaded: bool,

    /// Failure description when recognition could not run
    pub error: Option<String>,

    /// Size of the uploaded audio file in bytes
    pub file_size: Option<u64>,
}

impl TranscriptionResult {
    /// Normalize raw backend output into the stable shape.
    pub fn from_raw(raw: RawTranscription) -> Self {
        let segments = raw.segments.iter().map(normalize_segment).collect();
        Self {
            text: raw.text.trim().to_string(),
            language: raw.language,
            segments,
            diagnostics: None,
            model_loaded: true,
            error: None,
            file_size: None,
        }
    }

    /// Result shape for "recognition never ran": empty text, reason recorded.
    pub fn unavailable(reason: &str) -> Self {
        Self {
            text: String::new(),
            language: None,
            segments: Vec::new(),
            diagnostics: None,
            model_loaded: false,
            error: Some(reason.to_string()),
            file_size: None,
        }
    }

    /// Result shape for "the loaded backend failed on this input".
    pub fn failed(reason: &str) -> Self {
        Self {
            model_loaded: true,
            ..Self::unavailable(reason)
        }
    }
}

/// Coerce one raw segment value. Well-formed `{start, end, text}` objects
/// pass through; anything malformed degrades field-by-field — bad timestamps
/// become absent, non-string payloads are stringified — but a segment is
/// never dropped and never raises.
fn normalize_segment(value: &Value) -> Segment {
    let Some(obj) = value.as_object() else {
        return Segment {
            start: None,
            end: None,
            text: stringify(value),
        };
    };

    let text = obj.get("text").map(stringify).unwrap_or_default();
    let start = obj.get("start").and_then(coerce_seconds);
    let mut end = obj.get("end").and_then(coerce_seconds);
    // A span cannot end before it starts.
    if let (Some(s), Some(e)) = (start, end) {
        if e < s {
            end = None;
        }
    }

    Segment { start, end, text }
}

/// Render a raw value as text: strings are trimmed, everything else is
/// serialized as-is.
fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

/// Accept finite, non-negative numbers only.
fn coerce_seconds(value: &Value) -> Option<f64> {
    let n = value.as_f64()?;
    (n.is_finite() && n >= 0.0).then_some(n)
}
