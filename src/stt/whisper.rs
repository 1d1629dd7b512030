//! # Whisper Recognition Backend
//!
//! Loads a Whisper model with Candle-rs and transcribes decoded PCM audio.
//!
//! ## Model Loading Process:
//! 1. Download model files from HuggingFace if not cached locally
//! 2. Load model weights and tokenizer
//! 3. Initialize model on the CPU device
//!
//! Loading happens inside a capability probe, so every failure here is a
//! reason string for the gate, never a crash.

use candle_core::{Device, IndexOp, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::whisper::{self as m, Config};
use serde_json::json;
use tokenizers::Tokenizer;

use anyhow::{anyhow, Result};
use std::path::Path;

use crate::audio::decode::{decode_to_mono_16k, RECOGNITION_SAMPLE_RATE};
use crate::stt::{RawTranscription, SpeechToText};

/// Samples per decode window (Whisper works on 30-second chunks).
const WINDOW_SAMPLES: usize = 30 * RECOGNITION_SAMPLE_RATE as usize;

/// Available Whisper model sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelSize {
    Tiny,
    Base,
    Small,
    Medium,
    Large,
}

impl ModelSize {
    /// Get the HuggingFace model repository name.
    pub fn repo_name(&self) -> &'static str {
        match self {
            ModelSize::Tiny => "openai/whisper-tiny",
            ModelSize::Base => "openai/whisper-base",
            ModelSize::Small => "openai/whisper-small",
            ModelSize::Medium => "openai/whisper-medium",
            ModelSize::Large => "openai/whisper-large-v2",
        }
    }
}

impl std::str::FromStr for ModelSize {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "tiny" => Ok(ModelSize::Tiny),
            "base" => Ok(ModelSize::Base),
            "small" => Ok(ModelSize::Small),
            "medium" => Ok(ModelSize::Medium),
            "large" => Ok(ModelSize::Large),
            _ => Err(anyhow!("Unknown model size: {}", s)),
        }
    }
}

/// A loaded Whisper model ready for transcription.
///
/// One instance per process; the capability gate serializes calls, so no
/// interior locking is needed here.
pub struct WhisperBackend {
    model: m::model::Whisper,
    config: Config,
    device: Device,
    tokenizer: Tokenizer,
}

impl WhisperBackend {
    /// Probe entry point: load the model named in configuration.
    ///
    /// Failures come back as a reason string for the capability gate.
    pub fn load(size_name: &str) -> std::result::Result<Self, String> {
        let size: ModelSize = size_name
            .parse()
            .map_err(|e: anyhow::Error| e.to_string())?;
        Self::load_size(size).map_err(|e| format!("{:#}", e))
    }

    fn load_size(size: ModelSize) -> Result<Self> {
        tracing::info!("Loading Whisper {} model...", size.repo_name());
        let start_time = std::time::Instant::now();

        let api = hf_hub::api::sync::ApiBuilder::new()
            .with_progress(false)
            .build()
            .map_err(|e| anyhow!("Failed to create HuggingFace API client: {}", e))?;
        let repo = api.model(size.repo_name().to_string());

        let config_filename = repo
            .get("config.json")
            .map_err(|e| anyhow!("Failed to download config.json from {}: {}", size.repo_name(), e))?;
        let tokenizer_filename = repo
            .get("tokenizer.json")
            .map_err(|e| anyhow!("Failed to download tokenizer.json from {}: {}", size.repo_name(), e))?;
        let model_filename = repo
            .get("model.safetensors")
            .map_err(|e| anyhow!("Failed to download model weights from {}: {}", size.repo_name(), e))?;

        let config: Config = serde_json::from_reader(std::fs::File::open(config_filename)?)?;

        let tokenizer = Tokenizer::from_file(tokenizer_filename)
            .map_err(|e| anyhow!("Failed to load tokenizer: {}", e))?;

        let device = Device::Cpu;
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[model_filename], m::DTYPE, &device)? };
        let model = m::model::Whisper::load(&vb, config.clone())?;

        let load_time = start_time.elapsed();
        tracing::info!(
            "Whisper {} model loaded in {:.2}s",
            size.repo_name(),
            load_time.as_secs_f64()
        );

        Ok(Self {
            model,
            config,
            device,
            tokenizer,
        })
    }

    /// Convert one PCM window to a log-mel spectrogram tensor.
    fn pcm_to_mel(&self, pcm_data: &[f32]) -> Result<Tensor> {
        // Pad or truncate to the 30-second window the model expects.
        let mut padded = vec![0.0f32; WINDOW_SAMPLES];
        let copy_len = pcm_data.len().min(WINDOW_SAMPLES);
        padded[..copy_len].copy_from_slice(&pcm_data[..copy_len]);

        let n_mels = self.config.num_mel_bins as usize;
        let n_frames = 3000;

        // Energy-based log-mel features with an -80 dB floor.
        let mut mel_data = vec![0.0f32; n_mels * n_frames];
        let frame_size = padded.len() / n_frames;
        for frame in 0..n_frames {
            let start = frame * frame_size;
            let end = (start + frame_size).min(padded.len());

            let mut energy = 0.0f32;
            for sample in &padded[start..end] {
                energy += sample.abs();
            }
            let value = (energy / frame_size as f32).ln().max(-11.5129);
            for mel_bin in 0..n_mels {
                mel_data[mel_bin * n_frames + frame] = value;
            }
        }

        Ok(Tensor::from_vec(mel_data, (n_mels, n_frames), &self.device)?)
    }

    /// Greedily decode one audio window to text.
    fn decode_window(&mut self, window: &[f32]) -> Result<String> {
        let mel = self.pcm_to_mel(window)?.unsqueeze(0)?;
        let encoder_output = self.model.encoder.forward(&mel, false)?;

        let mut tokens = vec![self.sot_token(), self.transcribe_token()];
        let mut output_tokens: Vec<u32> = Vec::new();

        const MAX_TOKENS: usize = 224;
        for _ in 0..MAX_TOKENS {
            let token_tensor = Tensor::new(&tokens[..], &self.device)?.unsqueeze(0)?;
            let logits = self
                .model
                .decoder
                .forward(&token_tensor, &encoder_output, false)?;
            let last_logits = logits.i((.., tokens.len() - 1, ..))?;
            let next_token = last_logits.squeeze(0)?.argmax(0)?.to_scalar::<u32>()?;

            if next_token == self.eot_token() {
                break;
            }
            if is_repetitive(&output_tokens, next_token) {
                break;
            }

            tokens.push(next_token);
            output_tokens.push(next_token);
        }

        self.decode_tokens(&output_tokens)
    }

    /// Start-of-transcription token.
    fn sot_token(&self) -> u32 {
        self.special_token("<|startoftranscript|>").unwrap_or(50258)
    }

    /// End-of-transcription token.
    fn eot_token(&self) -> u32 {
        self.special_token("<|endoftext|>").unwrap_or(50257)
    }

    /// Transcription task token.
    fn transcribe_token(&self) -> u32 {
        self.special_token("<|transcribe|>").unwrap_or(50359)
    }

    fn special_token(&self, token: &str) -> Option<u32> {
        self.tokenizer.token_to_id(token)
    }

    /// Decode tokens to text and strip control markers.
    fn decode_tokens(&self, tokens: &[u32]) -> Result<String> {
        let text = self
            .tokenizer
            .decode(tokens, true)
            .map_err(|e| anyhow!("Tokenizer decode error: {}", e))?;

        let cleaned = text
            .replace("<|startoftranscript|>", "")
            .replace("<|endoftext|>", "")
            .replace("<|notimestamps|>", "");

        Ok(cleaned.trim().to_string())
    }
}

/// Check whether appending `new_token` creates a degenerate repetition.
fn is_repetitive(tokens: &[u32], new_token: u32) -> bool {
    if tokens.len() >= 3 && tokens[tokens.len() - 3..] == [new_token, new_token, new_token] {
        return true;
    }
    if tokens.len() >= 6 {
        let last_3 = &tokens[tokens.len() - 3..];
        let prev_3 = &tokens[tokens.len() - 6..tokens.len() - 3];
        if last_3 == prev_3 {
            return true;
        }
    }
    false
}

impl SpeechToText for WhisperBackend {
    fn transcribe(&mut self, path: &Path) -> std::result::Result<RawTranscription, String> {
        let samples = decode_to_mono_16k(path).map_err(|e| e.to_string())?;
        if samples.is_empty() {
            return Ok(RawTranscription::default());
        }

        let start_time = std::time::Instant::now();
        let mut segments = Vec::new();
        let mut full_text = String::new();

        for (index, window) in samples.chunks(WINDOW_SAMPLES).enumerate() {
            let text = self
                .decode_window(window)
                .map_err(|e| format!("decode failed: {:#}", e))?;
            if text.is_empty() {
                continue;
            }

            let start = (index * WINDOW_SAMPLES) as f64 / RECOGNITION_SAMPLE_RATE as f64;
            let end = start + window.len() as f64 / RECOGNITION_SAMPLE_RATE as f64;
            segments.push(json!({ "start": start, "end": end, "text": text }));

            if !full_text.is_empty() {
                full_text.push(' ');
            }
            full_text.push_str(&text);
        }

        tracing::debug!(
            "Transcribed {:.2}s of audio in {:.2}s: '{}'",
            samples.len() as f64 / RECOGNITION_SAMPLE_RATE as f64,
            start_time.elapsed().as_secs_f64(),
            full_text
        );

        Ok(RawTranscription {
            text: full_text,
            language: None,
            segments,
        })
    }
}
