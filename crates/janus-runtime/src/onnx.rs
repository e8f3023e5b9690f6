//! ONNX Runtime backend adapter.
//!
//! Drives a single ONNX runner binary that serves every modality behind a
//! small versioned HTTP surface: `/v1/generate` (SSE token stream),
//! `/v1/images`, `/v1/speech`, and `/v1/embeddings/image`. One runner
//! process per live handle, killed on unload.

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

const BACKEND: &str = "onnx";

/// Configuration for the ONNX runtime.
#[derive(Debug, Clone)]
pub struct OnnxRuntimeConfig {
    /// The ONNX runner binary.
    pub command: PathBuf,
    /// Extra arguments appended to every runner invocation.
    pub extra_args: Vec<String>,
    /// How long to wait for the runner to report ready.
    pub startup_timeout: Duration,
}

impl Default for OnnxRuntimeConfig {
    fn default() -> Self {
        Self {
            command: PathBuf::from("janus-onnx-runner"),
            extra_args: Vec::new(),
            startup_timeout: Duration::from_secs(120),
        }
    }
}

/// The ONNX native runtime.
pub struct OnnxRuntime {
    config: OnnxRuntimeConfig,
    client: reqwest::Client,
}

impl OnnxRuntime {
    /// Creates a runtime with the given configuration.
    #[must_use]
    pub fn new(config: OnnxRuntimeConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }
}

impl Default for OnnxRuntime {
    fn default() -> Self {
        Self::new(OnnxRuntimeConfig::default())
    }
}

#[async_trait]
impl NativeRuntime for OnnxRuntime {
    fn backend(&self) -> janus_core::BackendKind {
        janus_core::BackendKind::Onnx
    }

    async fn load(&self, descriptor: &ModelDescriptor) -> Result<Arc<dyn ModelHandle>> {
        let model_path = resolve_model_path(descriptor)?;

        let mut args = vec![
            "--model".to_string(),
            model_path.display().to_string(),
            "--modality".to_string(),
            descriptor.modality.as_str().to_string(),
        ];
        args.extend(self.config.extra_args.iter().cloned());

        let runner = RunnerProcess::spawn(&self.config.command, &args)
            .await
            .map_err(|e| Error::model_load(descriptor.id.as_str(), e.to_string()))?;
        runner
            .wait_ready(&self.client, "/v1/health", self.config.startup_timeout)
            .await
            .map_err(|e| Error::model_load(descriptor.id.as_str(), e.to_string()))?;

        tracing::info!(model = %descriptor.id, modality = %descriptor.modality, "ONNX model loaded");

        Ok(Arc::new(OnnxHandle {
            descriptor: descriptor.clone(),
            runner,
            client: self.client.clone(),
        }))
    }
}

/// A live ONNX model served by the runner process.
pub struct OnnxHandle {
    descriptor: ModelDescriptor,
    runner: RunnerProcess,
    client: reqwest::Client,
}

/// Builds the runner /v1/generate request body.
fn build_generate_body(request: &GenerationRequest) -> (String, Value) {
    let rendered = prompt::render(&request.prompt);
    let sampling = &request.sampling;
    let mut body = json!({
        "prompt": rendered.text,
        "max_tokens": sampling.max_tokens,
        "temperature": sampling.temperature,
        "top_p": sampling.top_p,
        "top_k": sampling.top_k,
        "stream": true,
    });
    if let Some(seed) = sampling.seed {
        body["seed"] = json!(seed);
    }
    if !rendered.images.is_empty() {
        body["images"] = json!(rendered.images);
    }
    (rendered.text, body)
}

impl OnnxHandle {
    async fn begin_generate(&self, body: &Value) -> Result<SseLineReader> {
        let response = self
            .client
            .post(format!("{}/v1/generate", self.runner.base_url()))
            .json(body)
            .send()
            .await
            .map_err(|e| Error::adapter(BACKEND, format!("generate request failed: {e}")))?;
        if !response.status().is_success() {
            return Err(Error::adapter(
                BACKEND,
                format!("runner rejected generate: HTTP {}", response.status()),
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
            .post(format!("{}/v1/images", self.runner.base_url()))
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
        let encoded = payload["image"]
            .as_str()
            .ok_or_else(|| Error::adapter(BACKEND, "image response carried no image"))?;
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
impl ModelHandle for OnnxHandle {
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
        let (prompt_text, body) = build_generate_body(request);
        let reader = self.begin_generate(&body).await?;
        Ok(Box::new(OnnxStream {
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
        let body = json!({"image": encoded});

        let response = self
            .client
            .post(format!("{}/v1/embeddings/image", self.runner.base_url()))
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
        let mut body = json!({"input": request.input});
        if let Some(voice) = &request.voice {
            body["voice"] = json!(voice);
        }

        let response = self
            .client
            .post(format!("{}/v1/speech", self.runner.base_url()))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::adapter(BACKEND, format!("speech request failed: {e}")))?;
        if !response.status().is_success() {
            return Err(Error::adapter(
                BACKEND,
                format!("runner rejected speech request: HTTP {}", response.status()),
            ));
        }
        let sample_rate = response
            .headers()
            .get("x-sample-rate")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::adapter(BACKEND, format!("bad speech response: {e}")))?
            .to_vec();

        Ok(AudioClip {
            bytes,
            format: AudioFormat::Wav,
            sample_rate,
        })
    }

    async fn unload(&self) -> Result<()> {
        self.runner.shutdown().await;
        tracing::info!(model = %self.descriptor.id, "ONNX model unloaded");
        Ok(())
    }
}

/// Token stream over the runner's SSE wire.
struct OnnxStream {
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

impl OnnxStream {
    fn parse_event(&mut self, payload: &str) -> Result<Option<TokenEvent>> {
        let event: Value = serde_json::from_str(payload)
            .map_err(|e| Error::adapter(BACKEND, format!("bad stream event: {e}")))?;

        if let Some(tokens) = event["prompt_tokens"].as_u64() {
            self.prompt_tokens = tokens as u32;
        }
        if event["done"].as_bool() == Some(true) {
            self.done = true;
            return Ok(None);
        }

        let text = event["token"].as_str().unwrap_or_default().to_string();
        Ok(Some(TokenEvent { text }))
    }
}

#[async_trait]
impl NativeStream for OnnxStream {
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
        if let Some(reader) = self.reader.as_mut() {
            reader.close();
        }
        self.resample_seed = self.resample_seed.wrapping_add(1);

        let mut body = self.body.clone();
        body["prompt"] = Value::String(format!("{}{}", self.base_prompt, accepted));
        body["seed"] = json!(self.resample_seed);
        if self.sampling.temperature <= 0.0 {
            body["temperature"] = json!(0.7);
        }

        let response = self
            .client
            .post(format!("{}/v1/generate", self.base_url))
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
