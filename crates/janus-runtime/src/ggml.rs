//! GGML-family backend adapter.
//!
//! Drives llama.cpp-family runner binaries: a llama-server compatible
//! process for text and vision-language models, a stable-diffusion.cpp
//! style server for image models, and a TTS runner for speech models. One
//! runner process per live handle.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use janus_core::{
    AudioClip, AudioFormat, EmbedImageRequest, Error, FinishReason, GenerationOutput,
    GenerationRequest, GenerationResponse, ImageArtifact, ImageEmbedding, Modality,
    ModelDescriptor, Result, SamplingParams, SpeechRequest, Usage,
};
use serde_json::{json, Value};

use crate::handle::{unsupported, Capability, ModelHandle};
use crate::native::{NativeRuntime, NativeStream, TokenEvent};
use crate::proc::{RunnerProcess, SseLineReader};
use crate::prompt;
use crate::resolve::resolve_model_path;

const BACKEND: &str = "ggml";

/// Configuration for the GGML runtime.
#[derive(Debug, Clone)]
pub struct GgmlRuntimeConfig {
    /// llama-server compatible binary for text and VLM models.
    pub llm_command: PathBuf,
    /// Image generation server binary.
    pub image_command: PathBuf,
    /// TTS server binary.
    pub tts_command: PathBuf,
    /// Context size passed to the LLM runner.
    pub ctx_size: u32,
    /// GPU layers passed to the LLM runner (-1 offloads everything).
    pub gpu_layers: i32,
    /// Extra arguments appended to every runner invocation.
    pub extra_args: Vec<String>,
    /// How long to wait for a runner to report ready.
    pub startup_timeout: Duration,
}

impl Default for GgmlRuntimeConfig {
    fn default() -> Self {
        Self {
            llm_command: PathBuf::from("llama-server"),
            image_command: PathBuf::from("sd-server"),
            tts_command: PathBuf::from("tts-server"),
            ctx_size: 4096,
            gpu_layers: -1,
            extra_args: Vec::new(),
            startup_timeout: Duration::from_secs(120),
        }
    }
}

/// The GGML-family native runtime.
pub struct GgmlRuntime {
    config: GgmlRuntimeConfig,
    client: reqwest::Client,
}

impl GgmlRuntime {
    /// Creates a runtime with the given configuration.
    #[must_use]
    pub fn new(config: GgmlRuntimeConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }
}

impl Default for GgmlRuntime {
    fn default() -> Self {
        Self::new(GgmlRuntimeConfig::default())
    }
}

#[async_trait]
impl NativeRuntime for GgmlRuntime {
    fn backend(&self) -> janus_core::BackendKind {
        janus_core::BackendKind::Ggml
    }

    async fn load(&self, descriptor: &ModelDescriptor) -> Result<Arc<dyn ModelHandle>> {
        let model_path = resolve_model_path(descriptor)?;

        let (command, mut args) = match descriptor.modality {
            Modality::Text | Modality::Vlm => (
                &self.config.llm_command,
                vec![
                    "-m".to_string(),
                    model_path.display().to_string(),
                    "--ctx-size".to_string(),
                    self.config.ctx_size.to_string(),
                    "--n-gpu-layers".to_string(),
                    self.config.gpu_layers.to_string(),
                ],
            ),
            Modality::Image => (
                &self.config.image_command,
                vec!["-m".to_string(), model_path.display().to_string()],
            ),
            Modality::Tts => (
                &self.config.tts_command,
                vec!["-m".to_string(), model_path.display().to_string()],
            ),
        };
        args.extend(self.config.extra_args.iter().cloned());

        let runner = RunnerProcess::spawn(command, &args)
            .await
            .map_err(|e| Error::model_load(descriptor.id.as_str(), e.to_string()))?;
        runner
            .wait_ready(&self.client, "/health", self.config.startup_timeout)
            .await
            .map_err(|e| Error::model_load(descriptor.id.as_str(), e.to_string()))?;

        tracing::info!(model = %descriptor.id, modality = %descriptor.modality, "GGML model loaded");

        Ok(Arc::new(GgmlHandle {
            descriptor: descriptor.clone(),
            runner,
            client: self.client.clone(),
        }))
    }
}

/// A live GGML model served by a runner process.
pub struct GgmlHandle {
    descriptor: ModelDescriptor,
    runner: RunnerProcess,
    client: reqwest::Client,
}

/// Builds the runner /completion request body.
fn build_completion_body(request: &GenerationRequest) -> (String, Value) {
    let rendered = prompt::render(&request.prompt);
    let sampling = &request.sampling;
    let mut body = json!({
        "prompt": rendered.text,
        "n_predict": sampling.max_tokens,
        "temperature": sampling.temperature,
        "top_p": sampling.top_p,
        "top_k": sampling.top_k,
        "stream": true,
        "cache_prompt": true,
    });
    if let Some(seed) = sampling.seed {
        body["seed"] = json!(seed);
    }
    if !rendered.images.is_empty() {
        let image_data: Vec<Value> = rendered
            .images
            .iter()
            .enumerate()
            .map(|(i, data)| json!({"data": data, "id": i + 1}))
            .collect();
        body["image_data"] = json!(image_data);
    }
    (rendered.text, body)
}

impl GgmlHandle {
    async fn begin_completion(&self, body: &Value) -> Result<SseLineReader> {
        let response = self
            .client
            .post(format!("{}/completion", self.runner.base_url()))
            .json(body)
            .send()
            .await
            .map_err(|e| Error::adapter(BACKEND, format!("completion request failed: {e}")))?;
        if !response.status().is_success() {
            return Err(Error::adapter(
                BACKEND,
                format!("runner rejected completion: HTTP {}", response.status()),
            ));
        }
        Ok(SseLineReader::new(BACKEND, response))
    }

    async fn render_image(&self, request: &GenerationRequest) -> Result<ImageArtifact> {
        let options = request.image_options.clone().unwrap_or_default();
        let rendered = prompt::render(&request.prompt);
        let mut body = json!({
            "prompt": rendered.text,
            "width": options.width,
            "height": options.height,
            "steps": options.steps,
        });
        if let Some(seed) = request.sampling.seed {
            body["seed"] = json!(seed);
        }

        let response = self
            .client
            .post(format!("{}/txt2img", self.runner.base_url()))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::adapter(BACKEND, format!("image request failed: {e}")))?;
        if !response.status().is_success() {
            return Err(Error::adapter(
                BACKEND,
                format!("runner rejected image request: HTTP {}", response.status()),
            ));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| Error::adapter(BACKEND, format!("bad image response: {e}")))?;
        let encoded = payload["images"]
            .get(0)
            .and_then(Value::as_str)
            .ok_or_else(|| Error::adapter(BACKEND, "image response carried no images"))?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| Error::adapter(BACKEND, format!("image payload is not base64: {e}")))?;

        Ok(ImageArtifact {
            bytes,
            width: options.width,
            height: options.height,
        })
    }

    async fn collect_text(&self, request: &GenerationRequest) -> Result<GenerationResponse> {
        let mut stream = self.stream_generate(request).await?;
        let mut text = String::new();
        let mut tokens = 0u32;
        let mut finish = FinishReason::Stop;

        while let Some(event) = stream.next_token().await? {
            text.push_str(&event.text);
            tokens += 1;
            if tokens >= request.sampling.max_tokens {
                finish = FinishReason::Length;
                stream.cancel().await;
                break;
            }
        }

        Ok(GenerationResponse {
            request_id: request.request_id.clone(),
            model: self.descriptor.id.clone(),
            text,
            finish_reason: finish,
            usage: Usage::new(stream.prompt_tokens(), tokens),
        })
    }
}

#[async_trait]
impl ModelHandle for GgmlHandle {
    fn descriptor(&self) -> &ModelDescriptor {
        &self.descriptor
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationOutput> {
        match self.descriptor.modality {
            Modality::Text | Modality::Vlm => {
                Ok(GenerationOutput::Text(self.collect_text(request).await?))
            }
            Modality::Image => Ok(GenerationOutput::Image(self.render_image(request).await?)),
            Modality::Tts => Err(unsupported(&self.descriptor, Capability::Generate)),
        }
    }

    async fn stream_generate(&self, request: &GenerationRequest) -> Result<Box<dyn NativeStream>> {
        if !self.supports(Capability::StreamGenerate) {
            return Err(unsupported(&self.descriptor, Capability::StreamGenerate));
        }
        let (prompt_text, body) = build_completion_body(request);
        let reader = self.begin_completion(&body).await?;
        Ok(Box::new(GgmlStream {
            client: self.client.clone(),
            base_url: self.runner.base_url().to_string(),
            base_prompt: prompt_text,
            body,
            reader: Some(reader),
            sampling: request.sampling.clone(),
            resample_seed: request.sampling.seed.unwrap_or(0),
            prompt_tokens: 0,
            done: false,
        }))
    }

    async fn embed_image(&self, request: &EmbedImageRequest) -> Result<ImageEmbedding> {
        if !self.supports(Capability::EmbedImage) {
            return Err(unsupported(&self.descriptor, Capability::EmbedImage));
        }
        let encoded = base64::engine::general_purpose::STANDARD.encode(&request.image);
        let body = json!({
            "content": "[img-1]",
            "image_data": [{"data": encoded, "id": 1}],
        });

        let response = self
            .client
            .post(format!("{}/embedding", self.runner.base_url()))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::adapter(BACKEND, format!("embedding request failed: {e}")))?;
        let payload: Value = response
            .json()
            .await
            .map_err(|e| Error::adapter(BACKEND, format!("bad embedding response: {e}")))?;
        let vector = payload["embedding"]
            .as_array()
            .map(|values| {
                values
                    .iter()
                    .filter_map(Value::as_f64)
                    .map(|v| v as f32)
                    .collect::<Vec<f32>>()
            })
            .ok_or_else(|| Error::adapter(BACKEND, "embedding response carried no vector"))?;

        Ok(ImageEmbedding { vector })
    }

    async fn synthesize_speech(&self, request: &SpeechRequest) -> Result<AudioClip> {
        if !self.supports(Capability::SynthesizeSpeech) {
            return Err(unsupported(&self.descriptor, Capability::SynthesizeSpeech));
        }
        let mut body = json!({"text": request.input});
        if let Some(voice) = &request.voice {
            body["voice"] = json!(voice);
        }

        let response = self
            .client
            .post(format!("{}/tts", self.runner.base_url()))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::adapter(BACKEND, format!("tts request failed: {e}")))?;
        if !response.status().is_success() {
            return Err(Error::adapter(
                BACKEND,
                format!("runner rejected tts request: HTTP {}", response.status()),
            ));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::adapter(BACKEND, format!("bad tts response: {e}")))?
            .to_vec();

        let sample_rate = wav_sample_rate(&bytes).unwrap_or(0);
        Ok(AudioClip {
            bytes,
            format: AudioFormat::Wav,
            sample_rate,
        })
    }

    async fn unload(&self) -> Result<()> {
        self.runner.shutdown().await;
        tracing::info!(model = %self.descriptor.id, "GGML model unloaded");
        Ok(())
    }
}

/// Token stream over the runner's SSE wire.
struct GgmlStream {
    client: reqwest::Client,
    base_url: String,
    base_prompt: String,
    body: Value,
    reader: Option<SseLineReader>,
    sampling: SamplingParams,
    resample_seed: u64,
    prompt_tokens: u32,
    done: bool,
}

impl GgmlStream {
    fn parse_event(&mut self, payload: &str) -> Result<Option<TokenEvent>> {
        let event: Value = serde_json::from_str(payload)
            .map_err(|e| Error::adapter(BACKEND, format!("bad stream event: {e}")))?;

        if let Some(tokens) = event["tokens_evaluated"].as_u64() {
            self.prompt_tokens = tokens as u32;
        }
        if event["stop"].as_bool() == Some(true) {
            self.done = true;
            return Ok(None);
        }

        let text = event["content"].as_str().unwrap_or_default().to_string();
        Ok(Some(TokenEvent { text }))
    }
}

#[async_trait]
impl NativeStream for GgmlStream {
    async fn next_token(&mut self) -> Result<Option<TokenEvent>> {
        loop {
            if self.done {
                return Ok(None);
            }
            let Some(reader) = self.reader.as_mut() else {
                return Ok(None);
            };
            match reader.next_data().await? {
                Some(payload) => match self.parse_event(&payload)? {
                    // Skip empty deltas the runner interleaves.
                    Some(event) if event.text.is_empty() => continue,
                    other => return Ok(other),
                },
                None => {
                    self.done = true;
                    return Ok(None);
                }
            }
        }
    }

    async fn resample(&mut self, accepted: &str) -> Result<Option<TokenEvent>> {
        // No in-place resample hook on this wire: abort the stream and
        // restart from the accepted prefix with a perturbed seed.
        if let Some(reader) = self.reader.as_mut() {
            reader.close();
        }
        self.resample_seed = self.resample_seed.wrapping_add(1);

        let mut body = self.body.clone();
        body["prompt"] = Value::String(format!("{}{}", self.base_prompt, accepted));
        body["seed"] = serde_json::json!(self.resample_seed);
        // Never ask for a deterministic greedy redraw; it would loop.
        if self.sampling.temperature <= 0.0 {
            body["temperature"] = serde_json::json!(0.7);
        }

        let response = self
            .client
            .post(format!("{}/completion", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::adapter(BACKEND, format!("resample request failed: {e}")))?;
        if !response.status().is_success() {
            return Err(Error::adapter(
                BACKEND,
                format!("runner rejected resample: HTTP {}", response.status()),
            ));
        }
        self.reader = Some(SseLineReader::new(BACKEND, response));
        self.done = false;
        self.next_token().await
    }

    async fn cancel(&mut self) {
        if let Some(reader) = self.reader.as_mut() {
            reader.close();
        }
        self.reader = None;
        self.done = true;
    }

    fn prompt_tokens(&self) -> u32 {
        self.prompt_tokens
    }
}

/// Reads the sample rate out of a RIFF/WAVE header.
fn wav_sample_rate(bytes: &[u8]) -> Option<u32> {
    if bytes.len() < 28 || &bytes[..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return None;
    }
    Some(u32::from_le_bytes([bytes[24], bytes[25], bytes[26], bytes[27]]))
}
