//! Configuration management for the Janus CLI.
//!
//! Configuration is loaded from (in order of precedence):
//! 1. Command-line arguments
//! 2. Environment variables (JANUS_*)
//! 3. Config file (~/.config/janus/config.toml)
//! 4. Default values

use std::path::PathBuf;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// CLI configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Default model to use when --model is not specified.
    #[serde(default)]
    pub default_model: Option<String>,

    /// Default backend (ggml or onnx).
    #[serde(default = "default_backend")]
    pub default_backend: String,

    /// Default temperature for generation.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Concurrent sessions allowed per model.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_per_model: usize,

    /// Requests allowed to queue per model.
    #[serde(default = "default_max_queue")]
    pub max_queue_per_model: usize,

    /// llama-server compatible binary for GGML text/VLM models.
    #[serde(default = "default_ggml_llm_command")]
    pub ggml_llm_command: String,

    /// Image runner binary for GGML image models.
    #[serde(default = "default_ggml_image_command")]
    pub ggml_image_command: String,

    /// TTS runner binary for GGML speech models.
    #[serde(default = "default_ggml_tts_command")]
    pub ggml_tts_command: String,

    /// ONNX runner binary.
    #[serde(default = "default_onnx_command")]
    pub onnx_command: String,
}

fn default_backend() -> String {
    "ggml".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_concurrent() -> usize {
    1
}

fn default_max_queue() -> usize {
    32
}

fn default_ggml_llm_command() -> String {
    "llama-server".to_string()
}

fn default_ggml_image_command() -> String {
    "sd-server".to_string()
}

fn default_ggml_tts_command() -> String {
    "tts-server".to_string()
}

fn default_onnx_command() -> String {
    "janus-onnx-runner".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_model: None,
            default_backend: default_backend(),
            temperature: default_temperature(),
            max_concurrent_per_model: default_max_concurrent(),
            max_queue_per_model: default_max_queue(),
            ggml_llm_command: default_ggml_llm_command(),
            ggml_image_command: default_ggml_image_command(),
            ggml_tts_command: default_ggml_tts_command(),
            onnx_command: default_onnx_command(),
        }
    }
}

impl Config {
    /// Loads configuration from all sources.
    ///
    /// Reports configuration errors but falls back to defaults.
    pub fn load() -> Self {
        let config_path = Self::config_path();

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed("JANUS_"));

        match figment.extract::<Config>() {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: configuration error, using defaults");
                eprintln!("  Config file: {}", config_path.display());
                eprintln!("  Error: {e}");
                Config::default()
            }
        }
    }

    /// Returns the path to the config file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("janus")
            .join("config.toml")
    }

    /// Returns the path to the config directory.
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("janus")
    }

    /// Saves the current configuration to the config file.
    pub fn save(&self) -> Result<(), std::io::Error> {
        let config_dir = Self::config_dir();
        std::fs::create_dir_all(&config_dir)?;

        let toml_str = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(Self::config_path(), toml_str)?;
        Ok(())
    }

    /// Sets the default model and saves.
    pub fn set_default_model(&mut self, model: &str) -> Result<(), std::io::Error> {
        self.default_model = Some(model.to_string());
        self.save()
    }

    /// Clears the default model and saves.
    pub fn clear_default_model(&mut self) -> Result<(), std::io::Error> {
        self.default_model = None;
        self.save()
    }
}

/// Prints the current configuration and its sources.
pub fn show_config() {
    let config = Config::load();
    let config_path = Config::config_path();

    println!("Janus Configuration");
    println!("===================\n");

    println!("Config file: {}", config_path.display());
    if config_path.exists() {
        println!("Status: Found\n");
    } else {
        println!("Status: Not found (using defaults)\n");
    }

    println!("Current settings:");
    println!(
        "  default_model: {}",
        config.default_model.as_deref().unwrap_or("(not set)")
    );
    println!("  default_backend: {}", config.default_backend);
    println!("  temperature: {}", config.temperature);
    println!("  max_concurrent_per_model: {}", config.max_concurrent_per_model);
    println!("  max_queue_per_model: {}", config.max_queue_per_model);
    println!("  ggml_llm_command: {}", config.ggml_llm_command);
    println!("  ggml_image_command: {}", config.ggml_image_command);
    println!("  ggml_tts_command: {}", config.ggml_tts_command);
    println!("  onnx_command: {}", config.onnx_command);

    println!("\nEnvironment variables:");
    println!("  JANUS_DEFAULT_MODEL");
    println!("  JANUS_DEFAULT_BACKEND");
    println!("  JANUS_GGML_LLM_COMMAND");
    println!("  JANUS_ONNX_COMMAND");
}
