//! # Reply Generation Orchestrator
//!
//! Owns everything around the raw generation backend: assembling the chat
//! prompt from conversation history, cutting the completion at role
//! bleed-through, and degrading to a deterministic echo reply when no model
//! is available. Callers get a reply string for every input as long as the
//! backend itself does not fail mid-call.

use crate::capability::{CapabilityError, CapabilityHandle};
use crate::chat::history::ConversationTurn;
use crate::config::{GenerationConfig, ModelsConfig};
use crate::llm::gguf::GgufBackend;
use crate::llm::{SamplingParams, TextGeneration};

/// Markers that end a completion: the model starting to speak for the user,
/// or an explicit end-of-sequence.
const STOP_MARKERS: &[&str] = &["user:", "User:", "</s>"];

/// Gated generation backend plus prompt/reply shaping.
pub struct GenerationOrchestrator {
    handle: CapabilityHandle<Box<dyn TextGeneration + Send>>,
    params: SamplingParams,
}

impl GenerationOrchestrator {
    /// Build the orchestrator, eagerly probing the configured GGUF model.
    pub async fn new(models: &ModelsConfig, generation: &GenerationConfig) -> Self {
        let model_path = models.llm_model_path.clone();
        let tokenizer_path = models.llm_tokenizer_path.clone();
        let handle = CapabilityHandle::new("text-generation", move || {
            let backend = GgufBackend::load(&model_path, &tokenizer_path)?;
            Ok(Box::new(backend) as Box<dyn TextGeneration + Send>)
        })
        .await;
        Self {
            handle,
            params: generation.into(),
        }
    }

    /// Build the orchestrator around an arbitrary backend probe (tests).
    #[cfg(test)]
    pub async fn with_probe<P>(probe: P, params: SamplingParams) -> Self
    where
        P: Fn() -> Result<Box<dyn TextGeneration + Send>, String> + Send + Sync + 'static,
    {
        Self {
            handle: CapabilityHandle::new("text-generation", probe).await,
            params,
        }
    }

    /// Generate the assistant reply for `user_text` given prior history.
    ///
    /// When no model is available the reply degrades to a deterministic
    /// echo; a loaded backend failing mid-call is a real error.
    pub async fn reply(
        &self,
        history: &[ConversationTurn],
        user_text: &str,
    ) -> Result<String, CapabilityError> {
        let prompt = build_prompt(history, user_text);
        let params = self.params.clone();

        // The echo fallback is returned verbatim; only real completions go
        // through reply extraction.
        self.handle
            .invoke(
                move |backend| {
                    backend
                        .generate(&prompt, STOP_MARKERS, &params)
                        .map(|completion| extract_reply(&completion))
                },
                |_reason| Ok(format!("Echo: {}", user_text)),
            )
            .await
    }

    /// Whether a generation model is currently loaded.
    pub async fn available(&self) -> bool {
        self.handle.available().await
    }

    /// Probe failure reason, when unavailable.
    pub async fn unavailable_reason(&self) -> Option<String> {
        self.handle.unavailable_reason().await
    }
}

/// Assemble the chat prompt: prior turns as `role: text` lines, then the new
/// user line and a dangling `assistant:` for the model to complete.
fn build_prompt(history: &[ConversationTurn], user_text: &str) -> String {
    let mut prompt = String::new();
    for turn in history {
        prompt.push_str(&format!("{}: {}\n", turn.role, turn.text));
    }
    prompt.push_str(&format!("user: {}\nassistant:", user_text));
    prompt
}

/// Shape a raw completion into the final reply: keep only what follows the
/// last `assistant:` echo, cut at the first stop marker, trim.
fn extract_reply(completion: &str) -> String {
    let tail = match completion.rfind("assistant:") {
        Some(idx) => &completion[idx + "assistant:".len()..],
        None => completion,
    };

    let mut end = tail.len();
    for marker in STOP_MARKERS {
        if let Some(idx) = tail.find(marker) {
            end = end.min(idx);
        }
    }

    tail[..end].trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::history::Role;
    use std::sync::{Arc, Mutex};

    fn params() -> SamplingParams {
        SamplingParams {
            max_new_tokens: 64,
            temperature: 0.0,
            top_p: None,
        }
    }

    struct CannedBackend {
        completion: String,
        seen_prompts: Arc<Mutex<Vec<String>>>,
    }

    impl TextGeneration for CannedBackend {
        fn generate(
            &mut self,
            prompt: &str,
            _stop: &[&str],
            _params: &SamplingParams,
        ) -> Result<String, String> {
            self.seen_prompts.lock().unwrap().push(prompt.to_string());
            Ok(self.completion.clone())
        }
    }

    fn turn(role: Role, text: &str) -> ConversationTurn {
        ConversationTurn::new(role, text.to_string())
    }

    async fn orchestrator_with(
        completion: &str,
        seen: Arc<Mutex<Vec<String>>>,
    ) -> GenerationOrchestrator {
        let completion = completion.to_string();
        GenerationOrchestrator::with_probe(
            move || {
                Ok(Box::new(CannedBackend {
                    completion: completion.clone(),
                    seen_prompts: seen.clone(),
                }) as Box<dyn TextGeneration + Send>)
            },
            params(),
        )
        .await
    }

    #[tokio::test]
    async fn test_prompt_includes_history_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let orchestrator = orchestrator_with(" sure ", seen.clone()).await;

        let history = vec![
            turn(Role::User, "hello"),
            turn(Role::Assistant, "hi, how can I help?"),
        ];
        let reply = orchestrator.reply(&history, "what time is it").await.unwrap();
        assert_eq!(reply, "sure");

        let prompts = seen.lock().unwrap();
        assert_eq!(
            prompts[0],
            "user: hello\nassistant: hi, how can I help?\nuser: what time is it\nassistant:"
        );
    }

    #[tokio::test]
    async fn test_reply_cut_at_stop_marker() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let orchestrator =
            orchestrator_with(" It is noon.\nuser: and tomorrow?", seen).await;

        let reply = orchestrator.reply(&[], "time?").await.unwrap();
        assert_eq!(reply, "It is noon.");
    }

    #[tokio::test]
    async fn test_reply_keeps_text_after_last_assistant_echo() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let orchestrator =
            orchestrator_with("something\nassistant: the actual reply </s>", seen).await;

        let reply = orchestrator.reply(&[], "hi").await.unwrap();
        assert_eq!(reply, "the actual reply");
    }

    #[tokio::test]
    async fn test_echo_fallback_when_unavailable() {
        let orchestrator =
            GenerationOrchestrator::with_probe(|| Err("no weights".to_string()), params()).await;

        let reply = orchestrator.reply(&[], "repeat me").await.unwrap();
        assert_eq!(reply, "Echo: repeat me");
        assert!(!orchestrator.available().await);
    }

    #[tokio::test]
    async fn test_backend_failure_propagates() {
        struct Exploding;
        impl TextGeneration for Exploding {
            fn generate(
                &mut self,
                _prompt: &str,
                _stop: &[&str],
                _params: &SamplingParams,
            ) -> Result<String, String> {
                Err("out of memory".to_string())
            }
        }

        let orchestrator = GenerationOrchestrator::with_probe(
            || Ok(Box::new(Exploding) as Box<dyn TextGeneration + Send>),
            params(),
        )
        .await;

        let err = orchestrator.reply(&[], "hi").await.unwrap_err();
        assert_eq!(err, CapabilityError::Backend("out of memory".to_string()));
    }
}
