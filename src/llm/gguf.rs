//! # GGUF Generation Backend
//!
//! Runs a quantized llama-family model (Mistral GGUF) with Candle-rs for
//! local reply generation. Loading happens inside a capability probe; a
//! missing weights file is a probe failure, not a crash.

use candle_core::quantized::gguf_file;
use candle_core::{Device, Tensor};
use candle_transformers::generation::LogitsProcessor;
use candle_transformers::models::quantized_llama::ModelWeights;
use tokenizers::Tokenizer;

use anyhow::{anyhow, Result};
use std::path::Path;

use crate::llm::{SamplingParams, TextGeneration};

/// Fixed sampling seed so replies are reproducible across restarts.
const SAMPLING_SEED: u64 = 299792458;

pub struct GgufBackend {
    model: ModelWeights,
    tokenizer: Tokenizer,
    device: Device,
    eos_token: u32,
}

impl GgufBackend {
    /// Probe entry point: load GGUF weights and the matching tokenizer from
    /// local paths.
    pub fn load(model_path: &str, tokenizer_path: &str) -> std::result::Result<Self, String> {
        Self::load_inner(Path::new(model_path), Path::new(tokenizer_path))
            .map_err(|e| format!("{:#}", e))
    }

    fn load_inner(model_path: &Path, tokenizer_path: &Path) -> Result<Self> {
        tracing::info!("Loading GGUF model from {}...", model_path.display());
        let start_time = std::time::Instant::now();

        let mut file = std::fs::File::open(model_path)
            .map_err(|e| anyhow!("Cannot open model file {}: {}", model_path.display(), e))?;
        let content = gguf_file::Content::read(&mut file)
            .map_err(|e| anyhow!("Cannot parse GGUF container: {}", e))?;

        let device = Device::Cpu;
        let model = ModelWeights::from_gguf(content, &mut file, &device)?;

        let tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer {}: {}", tokenizer_path.display(), e))?;
        let eos_token = tokenizer.token_to_id("</s>").unwrap_or(2);

        tracing::info!(
            "GGUF model loaded in {:.2}s",
            start_time.elapsed().as_secs_f64()
        );

        Ok(Self {
            model,
            tokenizer,
            device,
            eos_token,
        })
    }

    fn decode(&self, tokens: &[u32]) -> Result<String> {
        self.tokenizer
            .decode(tokens, true)
            .map_err(|e| anyhow!("Tokenizer decode error: {}", e))
    }

    fn generate_inner(
        &mut self,
        prompt: &str,
        stop: &[&str],
        params: &SamplingParams,
    ) -> Result<String> {
        let encoding = self
            .tokenizer
            .encode(prompt, true)
            .map_err(|e| anyhow!("Tokenizer encode error: {}", e))?;
        let prompt_tokens = encoding.get_ids().to_vec();
        if prompt_tokens.is_empty() {
            return Err(anyhow!("Empty prompt after tokenization"));
        }

        // Temperature 0 means greedy decoding.
        let temperature = (params.temperature > 0.0).then_some(params.temperature);
        let mut logits_processor = LogitsProcessor::new(SAMPLING_SEED, temperature, params.top_p);

        // Feed the whole prompt once, then one token per step.
        let input = Tensor::new(prompt_tokens.as_slice(), &self.device)?.unsqueeze(0)?;
        let logits = self.model.forward(&input, 0)?.squeeze(0)?;
        let mut next_token = logits_processor.sample(&logits)?;

        let mut generated: Vec<u32> = Vec::new();
        if next_token != self.eos_token {
            generated.push(next_token);
        }

        for index in 1..params.max_new_tokens {
            if next_token == self.eos_token {
                break;
            }

            let input = Tensor::new(&[next_token], &self.device)?.unsqueeze(0)?;
            let logits = self
                .model
                .forward(&input, prompt_tokens.len() + index - 1)?
                .squeeze(0)?;
            next_token = logits_processor.sample(&logits)?;

            if next_token == self.eos_token {
                break;
            }
            generated.push(next_token);

            // Stop markers cut off role bleed-through mid-stream.
            let text = self.decode(&generated)?;
            if stop.iter().any(|marker| text.contains(marker)) {
                break;
            }
        }

        self.decode(&generated)
    }
}

impl TextGeneration for GgufBackend {
    fn generate(
        &mut self,
        prompt: &str,
        stop: &[&str],
        params: &SamplingParams,
    ) -> std::result::Result<String, String> {
        self.generate_inner(prompt, stop, params)
            .map_err(|e| format!("{:#}", e))
    }
}
