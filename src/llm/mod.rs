//! # Text Generation
//!
//! The reply-generation flow: a gated local GGUF model produces raw
//! completions; the orchestrator owns prompt assembly, stop handling and the
//! deterministic echo fallback used when no model is available.

pub mod generation;
pub mod gguf;

pub use generation::GenerationOrchestrator;

/// Sampling parameters for one generation call.
#[derive(Debug, Clone)]
pub struct SamplingParams {
    pub max_new_tokens: usize,
    pub temperature: f64,
    pub top_p: Option<f64>,
}

impl From<&crate::config::GenerationConfig> for SamplingParams {
    fn from(cfg: &crate::config::GenerationConfig) -> Self {
        Self {
            max_new_tokens: cfg.max_new_tokens,
            temperature: cfg.temperature,
            top_p: cfg.top_p,
        }
    }
}

/// A loaded text generation backend.
///
/// `stop` markers end generation early; the returned completion may still
/// contain a trailing marker, which the orchestrator strips.
pub trait TextGeneration: Send {
    fn generate(
        &mut self,
        prompt: &str,
        stop: &[&str],
        params: &SamplingParams,
    ) -> Result<String, String>;
}
