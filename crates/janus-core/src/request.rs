//! Request types for generation, speech synthesis, and embedding.

use serde::{Deserialize, Serialize};

use crate::sampling::SamplingParams;
use crate::types::{BackendKind, Message, ModelId, RequestId};

/// Input format for generation prompts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PromptInput {
    /// Raw text prompt.
    Text(String),
    /// Chat messages (rendered into the backend's prompt format).
    Messages(Vec<Message>),
}

impl PromptInput {
    /// Returns `true` if any message carries image attachments.
    #[must_use]
    pub fn has_images(&self) -> bool {
        match self {
            Self::Text(_) => false,
            Self::Messages(messages) => messages.iter().any(Message::has_images),
        }
    }
}

impl From<String> for PromptInput {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for PromptInput {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<Vec<Message>> for PromptInput {
    fn from(messages: Vec<Message>) -> Self {
        Self::Messages(messages)
    }
}

/// Image generation options (image-modality descriptors only).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageOptions {
    /// Output width in pixels.
    #[serde(default = "default_image_dim")]
    pub width: u32,
    /// Output height in pixels.
    #[serde(default = "default_image_dim")]
    pub height: u32,
    /// Diffusion steps.
    #[serde(default = "default_steps")]
    pub steps: u32,
}

fn default_image_dim() -> u32 {
    512
}

fn default_steps() -> u32 {
    20
}

impl Default for ImageOptions {
    fn default() -> Self {
        Self {
            width: default_image_dim(),
            height: default_image_dim(),
            steps: default_steps(),
        }
    }
}

/// Request for text, vision-language, or image generation.
///
/// Immutable once accepted by the router.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Unique request identifier.
    #[serde(default)]
    pub request_id: RequestId,

    /// Model to use for generation.
    pub model: ModelId,

    /// Backend to run on, when the model is not yet registered.
    #[serde(default)]
    pub backend: Option<BackendKind>,

    /// Input prompt.
    pub prompt: PromptInput,

    /// Sampling parameters.
    #[serde(default)]
    pub sampling: SamplingParams,

    /// JSON Schema constraining the output (function-calling style).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<serde_json::Value>,

    /// Whether to stream the response.
    #[serde(default)]
    pub stream: bool,

    /// Per-request generation timeout in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    /// Image generation options (image-modality models only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_options: Option<ImageOptions>,
}

impl GenerationRequest {
    /// Creates a new generation request for the given model and prompt.
    #[must_use]
    pub fn new(model: impl Into<ModelId>, prompt: impl Into<PromptInput>) -> Self {
        Self {
            request_id: RequestId::new(),
            model: model.into(),
            backend: None,
            prompt: prompt.into(),
            sampling: SamplingParams::default(),
            schema: None,
            stream: false,
            timeout_ms: None,
            image_options: None,
        }
    }

    /// Creates a chat request.
    #[must_use]
    pub fn chat(model: impl Into<ModelId>, messages: Vec<Message>) -> Self {
        Self::new(model, PromptInput::Messages(messages))
    }

    /// Pins the request to a backend.
    #[must_use]
    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Sets the sampling parameters.
    #[must_use]
    pub fn with_sampling(mut self, sampling: SamplingParams) -> Self {
        self.sampling = sampling;
        self
    }

    /// Attaches a JSON Schema constraining the output.
    #[must_use]
    pub fn with_schema(mut self, schema: serde_json::Value) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Enables streaming delivery.
    #[must_use]
    pub fn with_stream(mut self) -> Self {
        self.stream = true;
        self
    }

    /// Sets the per-request timeout.
    #[must_use]
    pub fn with_timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = Some(ms);
        self
    }

    /// Sets image generation options.
    #[must_use]
    pub fn with_image_options(mut self, options: ImageOptions) -> Self {
        self.image_options = Some(options);
        self
    }
}

/// Request for speech synthesis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechRequest {
    /// Unique request identifier.
    #[serde(default)]
    pub request_id: RequestId,

    /// Model to use.
    pub model: ModelId,

    /// Backend to run on, when the model is not yet registered.
    #[serde(default)]
    pub backend: Option<BackendKind>,

    /// Text to synthesize.
    pub input: String,

    /// Voice selection, when the model supports it.
    #[serde(default)]
    pub voice: Option<String>,
}

impl SpeechRequest {
    /// Creates a new speech request.
    #[must_use]
    pub fn new(model: impl Into<ModelId>, input: impl Into<String>) -> Self {
        Self {
            request_id: RequestId::new(),
            model: model.into(),
            backend: None,
            input: input.into(),
            voice: None,
        }
    }

    /// Sets the voice.
    #[must_use]
    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = Some(voice.into());
        self
    }
}

/// Request for embedding an image (VLM descriptors).
#[derive(Debug, Clone)]
pub struct EmbedImageRequest {
    /// Unique request identifier.
    pub request_id: RequestId,

    /// Model to use.
    pub model: ModelId,

    /// Backend to run on, when the model is not yet registered.
    pub backend: Option<BackendKind>,

    /// Raw image bytes.
    pub image: Vec<u8>,
}

impl EmbedImageRequest {
    /// Creates a new image embedding request.
    #[must_use]
    pub fn new(model: impl Into<ModelId>, image: Vec<u8>) -> Self {
        Self {
            request_id: RequestId::new(),
            model: model.into(),
            backend: None,
            image,
        }
    }
}
