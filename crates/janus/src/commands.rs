//! CLI command implementations.

use std::io::{self, Write};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use color_eyre::eyre::{eyre, Result};
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};

use janus_core::{
    BackendKind, GenerationRequest, ImageOptions, Message, Modality, ModelDescriptor,
    SamplingParams, SpeechRequest,
};
use janus_gateway::{ModelRegistry, RegistryConfig, Router};
use janus_runtime::{GgmlRuntime, GgmlRuntimeConfig, OnnxRuntime, OnnxRuntimeConfig};

use crate::config::Config;

/// Wraps a gateway error with its category for the process diagnostics.
fn categorized(e: janus_core::Error) -> color_eyre::eyre::Report {
    eyre!("[{}] {}", e.category(), e)
}

/// Builds a router with both native runtimes wired from configuration.
fn build_router(cfg: &Config) -> Arc<Router> {
    let ggml = GgmlRuntime::new(GgmlRuntimeConfig {
        llm_command: PathBuf::from(&cfg.ggml_llm_command),
        image_command: PathBuf::from(&cfg.ggml_image_command),
        tts_command: PathBuf::from(&cfg.ggml_tts_command),
        ..GgmlRuntimeConfig::default()
    });
    let onnx = OnnxRuntime::new(OnnxRuntimeConfig {
        command: PathBuf::from(&cfg.onnx_command),
        ..OnnxRuntimeConfig::default()
    });

    let mut registry = ModelRegistry::new(RegistryConfig {
        max_concurrent_per_model: cfg.max_concurrent_per_model,
        max_queue_per_model: cfg.max_queue_per_model,
        allow_dynamic: true,
    });
    registry.register_runtime(Arc::new(ggml));
    registry.register_runtime(Arc::new(onnx));

    Arc::new(Router::new(Arc::new(registry)))
}

fn parse_backend(cfg: &Config, backend: Option<String>) -> Result<BackendKind> {
    let name = backend.unwrap_or_else(|| cfg.default_backend.clone());
    BackendKind::from_str(&name).map_err(categorized)
}

fn require_model(model: Option<String>) -> Result<String> {
    model.ok_or_else(|| eyre!("Model is required. Use --model <model> or set a default."))
}

fn load_spinner(model: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
        spinner.set_style(style);
    }
    spinner.set_message(format!("Loading model {model}..."));
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Start the OpenAI-compatible API server.
pub async fn serve(
    cfg: &Config,
    host: String,
    port: u16,
    model: Option<String>,
    backend: Option<String>,
    modality: Option<String>,
) -> Result<()> {
    use janus_server::{Server, ServerConfig};

    let router = build_router(cfg);

    if let Some(model) = model {
        let backend = parse_backend(cfg, backend)?;
        let modality = match modality {
            Some(m) => Modality::from_str(&m).map_err(categorized)?,
            None => Modality::Text,
        };
        router
            .registry()
            .register(ModelDescriptor::hub(model.as_str(), backend, modality));
        println!("Registered model: {model} ({backend}, {modality})");
    }

    let addr = format!("{host}:{port}").parse()?;
    let server = Server::new(ServerConfig { addr, cors: true }, router);

    println!("Server listening on http://{host}:{port}");
    println!("Press Ctrl+C to stop");
    server.run().await.map_err(categorized)
}

fn parse_schema(schema: Option<String>) -> Result<Option<serde_json::Value>> {
    let Some(schema) = schema else {
        return Ok(None);
    };
    let text = match schema.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)?,
        None => schema,
    };
    let value = serde_json::from_str(&text)
        .map_err(|e| eyre!("[invalid_request] schema is not valid JSON: {e}"))?;
    Ok(Some(value))
}

/// Generate text from a prompt.
#[allow(clippy::too_many_arguments)]
pub async fn gen_text(
    cfg: &Config,
    prompt: String,
    model: Option<String>,
    backend: Option<String>,
    max_tokens: u32,
    temperature: f32,
    stop: Vec<String>,
    stream: bool,
    schema: Option<String>,
) -> Result<()> {
    let model = require_model(model)?;
    let backend = parse_backend(cfg, backend)?;
    let schema = parse_schema(schema)?;
    let router = build_router(cfg);

    let mut sampling = SamplingParams::default()
        .with_max_tokens(max_tokens)
        .with_temperature(temperature);
    sampling.stop_sequences = stop;

    let mut request = GenerationRequest::new(model.as_str(), prompt)
        .with_backend(backend)
        .with_sampling(sampling);
    if let Some(schema) = schema {
        request = request.with_schema(schema);
    }
    if stream {
        request = request.with_stream();
    }

    let spinner = load_spinner(&model);
    let session = router.start_session(request).await.map_err(categorized)?;
    spinner.finish_and_clear();

    if stream {
        let chunk_stream = session.into_stream();
        futures::pin_mut!(chunk_stream);
        while let Some(result) = chunk_stream.next().await {
            let chunk = result.map_err(categorized)?;
            if let Some(delta) = &chunk.delta {
                print!("{delta}");
                io::stdout().flush()?;
            }
            if let Some(error) = &chunk.error {
                return Err(eyre!("[generation_failed] {error}"));
            }
        }
        println!();
    } else {
        let response = session.collect().await.map_err(categorized)?;
        println!("{}", response.text);
        println!(
            "\n[{} | {} prompt, {} completion tokens]",
            response.finish_reason.as_str(),
            response.usage.prompt_tokens,
            response.usage.completion_tokens
        );
    }

    Ok(())
}

/// Generate an image from a prompt.
#[allow(clippy::too_many_arguments)]
pub async fn gen_image(
    cfg: &Config,
    prompt: String,
    model: Option<String>,
    backend: Option<String>,
    width: u32,
    height: u32,
    steps: u32,
    output: PathBuf,
) -> Result<()> {
    let model = require_model(model)?;
    let backend = parse_backend(cfg, backend)?;
    let router = build_router(cfg);

    let request = GenerationRequest::new(model.as_str(), prompt)
        .with_backend(backend)
        .with_image_options(ImageOptions {
            width,
            height,
            steps,
        });

    let spinner = load_spinner(&model);
    let artifact = router.generate_image(request).await.map_err(categorized)?;
    spinner.finish_and_clear();

    std::fs::write(&output, &artifact.bytes)?;
    println!(
        "Wrote {}x{} image to {}",
        artifact.width,
        artifact.height,
        output.display()
    );
    Ok(())
}

/// Ask a vision-language model about an image.
pub async fn vlm(
    cfg: &Config,
    prompt: String,
    image: PathBuf,
    model: Option<String>,
    backend: Option<String>,
    max_tokens: u32,
    stream: bool,
) -> Result<()> {
    let model = require_model(model)?;
    let backend = parse_backend(cfg, backend)?;
    let router = build_router(cfg);

    let image_bytes = std::fs::read(&image)?;
    let encoded = base64::engine::general_purpose::STANDARD.encode(&image_bytes);

    let mut request = GenerationRequest::chat(
        model.as_str(),
        vec![Message::user_with_image(prompt, encoded)],
    )
    .with_backend(backend)
    .with_sampling(SamplingParams::default().with_max_tokens(max_tokens));
    if stream {
        request = request.with_stream();
    }

    let spinner = load_spinner(&model);
    let session = router.start_session(request).await.map_err(categorized)?;
    spinner.finish_and_clear();

    if stream {
        let chunk_stream = session.into_stream();
        futures::pin_mut!(chunk_stream);
        while let Some(result) = chunk_stream.next().await {
            let chunk = result.map_err(categorized)?;
            if let Some(delta) = &chunk.delta {
                print!("{delta}");
                io::stdout().flush()?;
            }
        }
        println!();
    } else {
        let response = session.collect().await.map_err(categorized)?;
        println!("{}", response.text);
    }
    Ok(())
}

/// Synthesize speech from text.
pub async fn gen_voice(
    cfg: &Config,
    text: String,
    model: Option<String>,
    backend: Option<String>,
    voice: Option<String>,
    output: PathBuf,
) -> Result<()> {
    let model = require_model(model)?;
    let backend = parse_backend(cfg, backend)?;
    let router = build_router(cfg);

    let mut request = SpeechRequest::new(model.as_str(), text);
    request.backend = Some(backend);
    request.voice = voice;

    let spinner = load_spinner(&model);
    let clip = router.synthesize_speech(request).await.map_err(categorized)?;
    spinner.finish_and_clear();

    std::fs::write(&output, &clip.bytes)?;
    println!(
        "Wrote {:.1}s of audio to {}",
        clip.duration_secs(),
        output.display()
    );
    Ok(())
}

/// Pull a model from the Hugging Face Hub.
pub async fn pull(model: String, revision: Option<String>) -> Result<()> {
    use hf_hub::api::sync::Api;

    println!("Downloading model: {model}");
    if let Some(rev) = &revision {
        println!("Revision: {rev}");
    }
    println!();

    let model_for_api = model.clone();
    let files = tokio::task::spawn_blocking(move || -> Result<Vec<String>> {
        let api = Api::new()?;
        let repo = if let Some(rev) = revision {
            api.repo(hf_hub::Repo::with_revision(
                model_for_api.clone(),
                hf_hub::RepoType::Model,
                rev,
            ))
        } else {
            api.model(model_for_api.clone())
        };

        let info = repo.info()?;
        let wanted: Vec<String> = info
            .siblings
            .iter()
            .map(|s| s.rfilename.clone())
            .filter(|name| {
                name.ends_with(".gguf")
                    || name.ends_with(".onnx")
                    || name.ends_with(".json")
            })
            .collect();

        let progress = ProgressBar::new(wanted.len() as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            progress.set_style(style.progress_chars("#>-"));
        }

        let mut fetched = Vec::new();
        for file in &wanted {
            progress.set_message(format!("Downloading {file}..."));
            match repo.get(file) {
                Ok(path) => {
                    tracing::debug!(file, path = %path.display(), "Downloaded");
                    fetched.push(file.clone());
                }
                Err(e) => {
                    tracing::debug!(file, error = %e, "Skipped");
                }
            }
            progress.inc(1);
        }
        progress.finish_with_message("Download complete");
        Ok(fetched)
    })
    .await??;

    if files.is_empty() {
        return Err(eyre!(
            "[model_not_found] no weight files found in repository {model}"
        ));
    }

    println!("\nModel {model} is now cached ({} files).", files.len());
    println!("Use 'janus gen-text --model {model}' to run inference.");
    Ok(())
}

/// List cached models.
pub fn model_list() -> Result<()> {
    println!("Cached models:\n");

    let cache_dir = dirs::cache_dir()
        .map(|p| p.join("huggingface").join("hub"))
        .unwrap_or_else(|| PathBuf::from("~/.cache/huggingface/hub"));

    let mut found = false;
    if cache_dir.exists() {
        for entry in std::fs::read_dir(&cache_dir)?.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(stripped) = name.strip_prefix("models--") {
                println!("  {}", stripped.replace("--", "/"));
                found = true;
            }
        }
    }
    if !found {
        println!("  (No models cached yet)");
    }

    println!("\nUse 'janus pull <model>' to download a model.");
    Ok(())
}

/// Remove a cached model.
pub fn model_remove(model: String) -> Result<()> {
    let cache_dir = dirs::cache_dir()
        .map(|p| p.join("huggingface").join("hub"))
        .unwrap_or_else(|| PathBuf::from("~/.cache/huggingface/hub"));

    let model_dir = cache_dir.join(format!("models--{}", model.replace('/', "--")));
    if model_dir.exists() {
        std::fs::remove_dir_all(&model_dir)?;
        println!("Removed cached model {model}");
    } else {
        println!("Model {model} is not cached.");
        println!("Expected path: {}", model_dir.display());
    }
    Ok(())
}
