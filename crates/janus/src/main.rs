//! # Janus CLI
//!
//! One front door for two native inference runtimes: GGML-family and ONNX
//! Runtime, with an OpenAI-compatible server and direct generation
//! subcommands.

use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use std::path::PathBuf;

mod commands;
mod config;

#[derive(Parser)]
#[command(name = "janus")]
#[command(version)]
#[command(about = "Unified local inference over GGML and ONNX backends", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Enable JSON logging
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the OpenAI-compatible API server
    Serve {
        /// Host to bind to
        #[arg(short = 'H', long, default_value = "0.0.0.0")]
        host: String,

        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,

        /// Model to register at startup
        #[arg(short, long)]
        model: Option<String>,

        /// Backend for the startup model (ggml or onnx)
        #[arg(short, long)]
        backend: Option<String>,

        /// Modality for the startup model (text, vlm, image, tts)
        #[arg(long)]
        modality: Option<String>,
    },

    /// Download a model from the Hugging Face Hub
    Pull {
        /// Model repository ID
        model: String,

        /// Specific revision to download
        #[arg(short, long)]
        revision: Option<String>,
    },

    /// Generate text from a prompt
    GenText {
        /// The prompt to generate from
        prompt: String,

        /// Model to use
        #[arg(short, long)]
        model: Option<String>,

        /// Backend (ggml or onnx)
        #[arg(short, long)]
        backend: Option<String>,

        /// Maximum tokens to generate
        #[arg(short = 'n', long, default_value = "256")]
        max_tokens: u32,

        /// Temperature for sampling
        #[arg(short, long)]
        temperature: Option<f32>,

        /// Stop sequences (repeatable)
        #[arg(long)]
        stop: Vec<String>,

        /// Stream tokens as they are generated
        #[arg(short, long)]
        stream: bool,

        /// JSON Schema constraining the output (inline JSON or @file)
        #[arg(long)]
        schema: Option<String>,
    },

    /// Generate an image from a prompt
    GenImage {
        /// The prompt describing the image
        prompt: String,

        /// Model to use
        #[arg(short, long)]
        model: Option<String>,

        /// Backend (ggml or onnx)
        #[arg(short, long)]
        backend: Option<String>,

        /// Output width in pixels
        #[arg(long, default_value = "512")]
        width: u32,

        /// Output height in pixels
        #[arg(long, default_value = "512")]
        height: u32,

        /// Diffusion steps
        #[arg(long, default_value = "20")]
        steps: u32,

        /// Output file
        #[arg(short, long, default_value = "out.png")]
        output: PathBuf,
    },

    /// Ask a vision-language model about an image
    Vlm {
        /// The question or instruction
        prompt: String,

        /// Image file to attach
        #[arg(short, long)]
        image: PathBuf,

        /// Model to use
        #[arg(short, long)]
        model: Option<String>,

        /// Backend (ggml or onnx)
        #[arg(short, long)]
        backend: Option<String>,

        /// Maximum tokens to generate
        #[arg(short = 'n', long, default_value = "256")]
        max_tokens: u32,

        /// Stream tokens as they are generated
        #[arg(short, long)]
        stream: bool,
    },

    /// Synthesize speech from text
    GenVoice {
        /// Text to speak
        text: String,

        /// Model to use
        #[arg(short, long)]
        model: Option<String>,

        /// Backend (ggml or onnx)
        #[arg(short, long)]
        backend: Option<String>,

        /// Voice selection
        #[arg(long)]
        voice: Option<String>,

        /// Output file
        #[arg(short, long, default_value = "out.wav")]
        output: PathBuf,
    },

    /// Manage cached models
    Model {
        #[command(subcommand)]
        action: ModelAction,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ModelAction {
    /// List cached models
    List,

    /// Remove a cached model
    Remove {
        /// Model repository ID
        model: String,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,

    /// Set default model
    SetModel {
        /// Model identifier
        model: String,
    },

    /// Clear default model
    ClearModel,

    /// Show config file path
    Path,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    let telemetry_config = janus_telemetry::TelemetryConfig::new("janus")
        .with_log_level(&cli.log_level);
    let telemetry_config = if cli.json_logs {
        telemetry_config.with_json_logs()
    } else {
        telemetry_config
    };
    janus_telemetry::init_logging(&telemetry_config);

    let cfg = config::Config::load();

    match cli.command {
        Commands::Serve {
            host,
            port,
            model,
            backend,
            modality,
        } => {
            let model = model.or(cfg.default_model.clone());
            commands::serve(&cfg, host, port, model, backend, modality).await?;
        }

        Commands::GenText {
            prompt,
            model,
            backend,
            max_tokens,
            temperature,
            stop,
            stream,
            schema,
        } => {
            let model = model.or(cfg.default_model.clone());
            let temperature = temperature.unwrap_or(cfg.temperature);
            commands::gen_text(
                &cfg, prompt, model, backend, max_tokens, temperature, stop, stream, schema,
            )
            .await?;
        }

        Commands::GenImage {
            prompt,
            model,
            backend,
            width,
            height,
            steps,
            output,
        } => {
            let model = model.or(cfg.default_model.clone());
            commands::gen_image(&cfg, prompt, model, backend, width, height, steps, output)
                .await?;
        }

        Commands::Vlm {
            prompt,
            image,
            model,
            backend,
            max_tokens,
            stream,
        } => {
            let model = model.or(cfg.default_model.clone());
            commands::vlm(&cfg, prompt, image, model, backend, max_tokens, stream).await?;
        }

        Commands::GenVoice {
            text,
            model,
            backend,
            voice,
            output,
        } => {
            let model = model.or(cfg.default_model.clone());
            commands::gen_voice(&cfg, text, model, backend, voice, output).await?;
        }

        Commands::Pull { model, revision } => {
            commands::pull(model, revision).await?;
        }

        Commands::Model { action } => match action {
            ModelAction::List => commands::model_list()?,
            ModelAction::Remove { model } => commands::model_remove(model)?,
        },

        Commands::Config { action } => match action {
            ConfigAction::Show => config::show_config(),
            ConfigAction::SetModel { model } => {
                let mut cfg = config::Config::load();
                match cfg.set_default_model(&model) {
                    Ok(()) => {
                        println!("Default model set to: {model}");
                        println!("Config saved to: {}", config::Config::config_path().display());
                    }
                    Err(e) => eprintln!("Failed to save config: {e}"),
                }
            }
            ConfigAction::ClearModel => {
                let mut cfg = config::Config::load();
                match cfg.clear_default_model() {
                    Ok(()) => println!("Default model cleared."),
                    Err(e) => eprintln!("Failed to save config: {e}"),
                }
            }
            ConfigAction::Path => {
                println!("{}", config::Config::config_path().display());
            }
        },
    }

    Ok(())
}
