//! # Configuration Management
//!
//! Loads application configuration from multiple sources:
//! - TOML configuration file (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Environment variables (APP_SERVER_HOST, APP_MODELS_LLM_MODEL_PATH, ...)
//! 2. Configuration file (config.toml)
//! 3. Default values (defined in the Default impl)
//!
//! `HOST` and `PORT` without the prefix are honored as well, for deployment
//! platforms that inject them.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub models: ModelsConfig,
    pub generation: GenerationConfig,
}

/// Server bind address settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Backend model locations.
///
/// ## Fields:
/// - `whisper_model`: Whisper variant for speech recognition
///   ("tiny", "base", "small", "medium", "large")
/// - `llm_model_path`: local GGUF file holding the generation model weights
/// - `llm_tokenizer_path`: HF tokenizer.json matching the GGUF model
/// - `tts_command`: external synthesis command (reads text on stdin, writes
///   WAV to stdout); empty string disables synthesis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    pub whisper_model: String,
    pub llm_model_path: String,
    pub llm_tokenizer_path: String,
    pub tts_command: String,
}

/// Sampling parameters for the generation backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Upper bound on tokens produced per reply
    pub max_new_tokens: usize,

    /// Sampling temperature (0.0 = greedy)
    pub temperature: f64,

    /// Nucleus sampling cutoff; disabled when absent
    pub top_p: Option<f64>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            models: ModelsConfig {
                whisper_model: "small".to_string(),
                llm_model_path: "models/mistral-7b.gguf".to_string(),
                llm_tokenizer_path: "models/tokenizer.json".to_string(),
                tts_command: String::new(),
            },
            generation: GenerationConfig {
                max_new_tokens: 512,
                temperature: 0.7,
                top_p: None,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, config.toml and the environment.
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("_"));

        // Deployment platforms commonly inject bare HOST/PORT variables.
        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// Model *paths* are deliberately not checked here: a missing model file
    /// is a capability-probe failure (the service still starts and degrades),
    /// not a configuration error.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.generation.max_new_tokens == 0 {
            return Err(anyhow::anyhow!("max_new_tokens must be greater than 0"));
        }

        if self.generation.temperature < 0.0 {
            return Err(anyhow::anyhow!("temperature cannot be negative"));
        }

        if let Some(top_p) = self.generation.top_p {
            if !(0.0..=1.0).contains(&top_p) {
                return Err(anyhow::anyhow!("top_p must be within [0, 1]"));
            }
        }

        Ok(())
    }

    /// Update configuration from a JSON string (runtime partial updates).
    ///
    /// Only fields present in the JSON are touched; the merged result is
    /// re-validated before being accepted.
    pub fn update_from_json(&mut self, json_str: &str) -> Result<()> {
        let partial: serde_json::Value = serde_json::from_str(json_str)?;

        if let Some(server) = partial.get("server") {
            if let Some(host) = server.get("host").and_then(|v| v.as_str()) {
                self.server.host = host.to_string();
            }
            if let Some(port) = server.get("port").and_then(|v| v.as_u64()) {
                self.server.port = port as u16;
            }
        }

        if let Some(models) = partial.get("models") {
            if let Some(whisper) = models.get("whisper_model").and_then(|v| v.as_str()) {
                self.models.whisper_model = whisper.to_string();
            }
            if let Some(path) = models.get("llm_model_path").and_then(|v| v.as_str()) {
                self.models.llm_model_path = path.to_string();
            }
            if let Some(path) = models.get("llm_tokenizer_path").and_then(|v| v.as_str()) {
                self.models.llm_tokenizer_path = path.to_string();
            }
            if let Some(cmd) = models.get("tts_command").and_then(|v| v.as_str()) {
                self.models.tts_command = cmd.to_string();
            }
        }

        if let Some(generation) = partial.get("generation") {
            if let Some(max) = generation.get("max_new_tokens").and_then(|v| v.as_u64()) {
                self.generation.max_new_tokens = max as usize;
            }
            if let Some(temp) = generation.get("temperature").and_then(|v| v.as_f64()) {
                self.generation.temperature = temp;
            }
            if let Some(top_p) = generation.get("top_p").and_then(|v| v.as_f64()) {
                self.generation.top_p = Some(top_p);
            }
        }

        self.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.models.whisper_model, "small");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.generation.max_new_tokens = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.generation.top_p = Some(1.5);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_update() {
        let mut config = AppConfig::default();
        let json = r#"{"generation": {"max_new_tokens": 128}, "models": {"whisper_model": "tiny"}}"#;
        assert!(config.update_from_json(json).is_ok());
        assert_eq!(config.generation.max_new_tokens, 128);
        assert_eq!(config.models.whisper_model, "tiny");
        // Untouched fields keep their values
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_config_update_rejects_invalid() {
        let mut config = AppConfig::default();
        let json = r#"{"generation": {"temperature": -1.0}}"#;
        assert!(config.update_from_json(json).is_err());
    }
}
