//! OpenAI-compatible API types and their mapping onto gateway requests.
//!
//! These shapes mirror the OpenAI API for drop-in compatibility, plus a
//! non-standard `backend` field that pins a request to a runtime family.

use janus_core::{
    BackendKind, Error, GenerationRequest, ImageOptions, Message, PromptInput, Result, Role,
    SamplingParams, SpeechRequest, Usage,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// === Chat Completions ===

/// Chat completion request (OpenAI-compatible).
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionRequest {
    /// Model to use.
    pub model: String,
    /// Messages in the conversation.
    pub messages: Vec<ChatMessage>,
    /// Backend to run on (non-standard; `ggml` or `onnx`).
    #[serde(default)]
    pub backend: Option<String>,
    /// Temperature for sampling.
    #[serde(default)]
    pub temperature: Option<f32>,
    /// Top-p (nucleus) sampling.
    #[serde(default)]
    pub top_p: Option<f32>,
    /// Top-k sampling.
    #[serde(default)]
    pub top_k: Option<u32>,
    /// Whether to stream the response.
    #[serde(default)]
    pub stream: Option<bool>,
    /// Stop sequences.
    #[serde(default)]
    pub stop: Option<StringOrArray>,
    /// Maximum tokens to generate.
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// Presence penalty.
    #[serde(default)]
    pub presence_penalty: Option<f32>,
    /// Frequency penalty.
    #[serde(default)]
    pub frequency_penalty: Option<f32>,
    /// Random seed.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Structured output format (`json_schema`).
    #[serde(default)]
    pub response_format: Option<ResponseFormat>,
    /// Legacy function-calling declarations.
    #[serde(default)]
    pub functions: Option<Vec<FunctionDef>>,
    /// Per-request generation timeout in milliseconds (non-standard).
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// One or many strings, as OpenAI allows for `stop`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum StringOrArray {
    /// A single string.
    One(String),
    /// Several strings.
    Many(Vec<String>),
}

impl StringOrArray {
    /// Flattens into a vector.
    #[must_use]
    pub fn into_vec(self) -> Vec<String> {
        match self {
            Self::One(s) => vec![s],
            Self::Many(v) => v,
        }
    }
}

/// A chat message on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role (system, user, assistant).
    pub role: String,
    /// Message content: plain text or multi-part (text + images).
    pub content: MessageContent,
}

/// Chat message content: plain text or structured parts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Plain text content.
    Text(String),
    /// Multi-part content (text and image parts).
    Parts(Vec<ContentPart>),
}

/// One part of a multi-part message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// A text fragment.
    Text {
        /// The text.
        text: String,
    },
    /// An image reference.
    ImageUrl {
        /// The image location (data URIs are decoded locally).
        image_url: ImageUrl,
    },
}

/// Image reference inside a content part.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageUrl {
    /// URL or `data:` URI of the image.
    pub url: String,
}

/// Structured output format selector.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseFormat {
    /// Format kind: `text`, `json_object`, or `json_schema`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Schema payload when kind is `json_schema`.
    #[serde(default)]
    pub json_schema: Option<JsonSchemaSpec>,
}

/// The `json_schema` payload of a response format.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonSchemaSpec {
    /// Optional schema name.
    #[serde(default)]
    pub name: Option<String>,
    /// The JSON Schema itself.
    pub schema: Value,
}

/// A legacy function-calling declaration.
#[derive(Debug, Clone, Deserialize)]
pub struct FunctionDef {
    /// Function name.
    pub name: String,
    /// JSON Schema for the function arguments.
    #[serde(default)]
    pub parameters: Option<Value>,
}

/// Chat completion response.
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionResponse {
    /// Response ID.
    pub id: String,
    /// Object type ("chat.completion").
    pub object: String,
    /// Creation timestamp (Unix epoch).
    pub created: i64,
    /// Model used.
    pub model: String,
    /// Generated choices.
    pub choices: Vec<ChatChoice>,
    /// Token usage statistics.
    pub usage: Usage,
}

/// A chat completion choice.
#[derive(Debug, Clone, Serialize)]
pub struct ChatChoice {
    /// Choice index.
    pub index: u32,
    /// Generated message.
    pub message: ChatResponseMessage,
    /// Finish reason.
    pub finish_reason: String,
}

/// The assistant message in a response.
#[derive(Debug, Clone, Serialize)]
pub struct ChatResponseMessage {
    /// Always "assistant".
    pub role: String,
    /// Generated content.
    pub content: String,
}

/// Streaming chat completion chunk.
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionChunk {
    /// Response ID.
    pub id: String,
    /// Object type ("chat.completion.chunk").
    pub object: String,
    /// Creation timestamp.
    pub created: i64,
    /// Model used.
    pub model: String,
    /// Streaming choices.
    pub choices: Vec<ChatChunkChoice>,
    /// Usage totals, present on the terminal chunk.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// A streaming chat choice.
#[derive(Debug, Clone, Serialize)]
pub struct ChatChunkChoice {
    /// Choice index.
    pub index: u32,
    /// Incremental content.
    pub delta: ChatDelta,
    /// Finish reason (terminal chunk only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

/// Incremental chat content.
#[derive(Debug, Clone, Serialize, Default)]
pub struct ChatDelta {
    /// Role (first chunk only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Content fragment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

// === Text Completions ===

/// Text completion request (OpenAI-compatible).
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionRequest {
    /// Model to use.
    pub model: String,
    /// The prompt to complete.
    pub prompt: String,
    /// Backend to run on (non-standard).
    #[serde(default)]
    pub backend: Option<String>,
    /// Temperature for sampling.
    #[serde(default)]
    pub temperature: Option<f32>,
    /// Top-p sampling.
    #[serde(default)]
    pub top_p: Option<f32>,
    /// Stop sequences.
    #[serde(default)]
    pub stop: Option<StringOrArray>,
    /// Maximum tokens.
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// Random seed.
    #[serde(default)]
    pub seed: Option<u64>,
}

/// Text completion response.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionResponse {
    /// Response ID.
    pub id: String,
    /// Object type ("text_completion").
    pub object: String,
    /// Creation timestamp.
    pub created: i64,
    /// Model used.
    pub model: String,
    /// Generated choices.
    pub choices: Vec<CompletionChoice>,
    /// Token usage.
    pub usage: Usage,
}

/// A text completion choice.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionChoice {
    /// Generated text.
    pub text: String,
    /// Choice index.
    pub index: u32,
    /// Finish reason.
    pub finish_reason: String,
}

// === Images ===

/// Image generation request (OpenAI-compatible).
#[derive(Debug, Clone, Deserialize)]
pub struct ImagesRequest {
    /// Model to use.
    pub model: String,
    /// Prompt describing the image.
    pub prompt: String,
    /// Backend to run on (non-standard).
    #[serde(default)]
    pub backend: Option<String>,
    /// Output size as "WIDTHxHEIGHT".
    #[serde(default)]
    pub size: Option<String>,
    /// Diffusion steps (non-standard).
    #[serde(default)]
    pub steps: Option<u32>,
    /// Random seed.
    #[serde(default)]
    pub seed: Option<u64>,
}

/// Image generation response.
#[derive(Debug, Clone, Serialize)]
pub struct ImagesResponse {
    /// Creation timestamp.
    pub created: i64,
    /// Generated images.
    pub data: Vec<ImageDatum>,
}

/// One generated image.
#[derive(Debug, Clone, Serialize)]
pub struct ImageDatum {
    /// Base64-encoded PNG.
    pub b64_json: String,
}

// === Audio ===

/// Speech synthesis request (OpenAI-compatible).
#[derive(Debug, Clone, Deserialize)]
pub struct SpeechWireRequest {
    /// Model to use.
    pub model: String,
    /// Text to synthesize.
    pub input: String,
    /// Backend to run on (non-standard).
    #[serde(default)]
    pub backend: Option<String>,
    /// Voice selection.
    #[serde(default)]
    pub voice: Option<String>,
}

// === Embeddings ===

/// Image embedding request. The `input` carries a base64 image or a
/// `data:` URI (VLM descriptors only).
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingsRequest {
    /// Model to use.
    pub model: String,
    /// Base64 image payload or data URI.
    pub input: String,
    /// Backend to run on (non-standard).
    #[serde(default)]
    pub backend: Option<String>,
}

/// Embedding response.
#[derive(Debug, Clone, Serialize)]
pub struct EmbeddingsResponse {
    /// Object type ("list").
    pub object: String,
    /// Embedding data.
    pub data: Vec<EmbeddingDatum>,
    /// Model used.
    pub model: String,
}

/// A single embedding result.
#[derive(Debug, Clone, Serialize)]
pub struct EmbeddingDatum {
    /// Object type ("embedding").
    pub object: String,
    /// Index in the input array.
    pub index: u32,
    /// The embedding vector.
    pub embedding: Vec<f32>,
}

// === Models ===

/// Models list response.
#[derive(Debug, Clone, Serialize)]
pub struct ModelsResponse {
    /// Object type ("list").
    pub object: String,
    /// Available models.
    pub data: Vec<ModelObject>,
}

/// Model information.
#[derive(Debug, Clone, Serialize)]
pub struct ModelObject {
    /// Model ID.
    pub id: String,
    /// Object type ("model").
    pub object: String,
    /// Creation timestamp.
    pub created: i64,
    /// Owner.
    pub owned_by: String,
    /// Backend kind (non-standard).
    pub backend: String,
    /// Modality (non-standard).
    pub modality: String,
}

// === Mapping ===

fn parse_backend(backend: Option<&str>) -> Result<Option<BackendKind>> {
    backend.map(str::parse).transpose()
}

fn parse_role(role: &str) -> Role {
    match role {
        "system" => Role::System,
        "assistant" => Role::Assistant,
        _ => Role::User,
    }
}

/// Strips a `data:<mime>;base64,` prefix if present.
#[must_use]
pub fn strip_data_uri(input: &str) -> &str {
    match input.split_once(";base64,") {
        Some((prefix, payload)) if prefix.starts_with("data:") => payload,
        _ => input,
    }
}

fn convert_message(message: &ChatMessage) -> Message {
    let role = parse_role(&message.role);
    match &message.content {
        MessageContent::Text(text) => Message {
            role,
            content: text.clone(),
            images: Vec::new(),
        },
        MessageContent::Parts(parts) => {
            let mut content = String::new();
            let mut images = Vec::new();
            for part in parts {
                match part {
                    ContentPart::Text { text } => {
                        if !content.is_empty() {
                            content.push('\n');
                        }
                        content.push_str(text);
                    }
                    ContentPart::ImageUrl { image_url } => {
                        images.push(strip_data_uri(&image_url.url).to_string());
                    }
                }
            }
            Message {
                role,
                content,
                images,
            }
        }
    }
}

/// Extracts the constraint schema from `response_format`/`functions`.
///
/// # Errors
///
/// Returns [`Error::UnsupportedSchema`] for `json_object` (no schema to
/// compile) and for a `json_schema` format without a schema payload.
pub fn extract_schema(
    response_format: Option<&ResponseFormat>,
    functions: Option<&[FunctionDef]>,
) -> Result<Option<Value>> {
    if let Some(format) = response_format {
        match format.kind.as_str() {
            "json_schema" => {
                let spec = format.json_schema.as_ref().ok_or_else(|| {
                    Error::unsupported_schema("response_format json_schema needs a schema payload")
                })?;
                return Ok(Some(spec.schema.clone()));
            }
            "json_object" => {
                return Err(Error::unsupported_schema(
                    "json_object without a schema is not supported; use json_schema",
                ));
            }
            _ => {}
        }
    }
    if let Some(functions) = functions {
        if let Some(first) = functions.first() {
            if let Some(parameters) = &first.parameters {
                return Ok(Some(parameters.clone()));
            }
        }
    }
    Ok(None)
}

fn build_sampling(
    temperature: Option<f32>,
    top_p: Option<f32>,
    top_k: Option<u32>,
    max_tokens: Option<u32>,
    stop: Option<StringOrArray>,
    seed: Option<u64>,
    presence_penalty: Option<f32>,
    frequency_penalty: Option<f32>,
) -> SamplingParams {
    let mut sampling = SamplingParams::default();
    if let Some(temperature) = temperature {
        sampling.temperature = temperature;
    }
    if let Some(top_p) = top_p {
        sampling.top_p = top_p;
    }
    if let Some(top_k) = top_k {
        sampling.top_k = top_k;
    }
    if let Some(max_tokens) = max_tokens {
        sampling.max_tokens = max_tokens;
    }
    if let Some(stop) = stop {
        sampling.stop_sequences = stop.into_vec();
    }
    if let Some(seed) = seed {
        sampling.seed = Some(seed);
    }
    if let Some(presence) = presence_penalty {
        sampling.presence_penalty = presence;
    }
    if let Some(frequency) = frequency_penalty {
        sampling.frequency_penalty = frequency;
    }
    sampling
}

impl ChatCompletionRequest {
    /// Converts the wire request into a gateway request.
    ///
    /// # Errors
    ///
    /// Returns invalid-request or unsupported-schema errors.
    pub fn into_generation_request(self) -> Result<GenerationRequest> {
        if self.messages.is_empty() {
            return Err(Error::invalid_request("messages must be non-empty"));
        }
        let backend = parse_backend(self.backend.as_deref())?;
        let schema = extract_schema(self.response_format.as_ref(), self.functions.as_deref())?;
        let messages: Vec<Message> = self.messages.iter().map(convert_message).collect();
        let sampling = build_sampling(
            self.temperature,
            self.top_p,
            self.top_k,
            self.max_tokens,
            self.stop,
            self.seed,
            self.presence_penalty,
            self.frequency_penalty,
        );

        let mut request = GenerationRequest::chat(self.model, messages).with_sampling(sampling);
        request.backend = backend;
        request.schema = schema;
        request.stream = self.stream.unwrap_or(false);
        request.timeout_ms = self.timeout_ms;
        Ok(request)
    }
}

impl CompletionRequest {
    /// Converts the wire request into a gateway request.
    ///
    /// # Errors
    ///
    /// Returns invalid-request errors.
    pub fn into_generation_request(self) -> Result<GenerationRequest> {
        let backend = parse_backend(self.backend.as_deref())?;
        let sampling = build_sampling(
            self.temperature,
            self.top_p,
            None,
            self.max_tokens,
            self.stop,
            self.seed,
            None,
            None,
        );
        let mut request =
            GenerationRequest::new(self.model, PromptInput::Text(self.prompt)).with_sampling(sampling);
        request.backend = backend;
        Ok(request)
    }
}

impl ImagesRequest {
    /// Converts the wire request into a gateway request.
    ///
    /// # Errors
    ///
    /// Returns invalid-request errors (bad size, bad backend).
    pub fn into_generation_request(self) -> Result<GenerationRequest> {
        let backend = parse_backend(self.backend.as_deref())?;

        let mut options = ImageOptions::default();
        if let Some(size) = &self.size {
            let (width, height) = size
                .split_once('x')
                .and_then(|(w, h)| Some((w.parse().ok()?, h.parse().ok()?)))
                .ok_or_else(|| {
                    Error::invalid_request(format!("size must look like 512x512, got {size}"))
                })?;
            options.width = width;
            options.height = height;
        }
        if let Some(steps) = self.steps {
            options.steps = steps;
        }

        let mut sampling = SamplingParams::default();
        sampling.seed = self.seed;

        let mut request = GenerationRequest::new(self.model, PromptInput::Text(self.prompt))
            .with_sampling(sampling)
            .with_image_options(options);
        request.backend = backend;
        Ok(request)
    }
}

impl SpeechWireRequest {
    /// Converts the wire request into a gateway request.
    ///
    /// # Errors
    ///
    /// Returns invalid-request errors.
    pub fn into_speech_request(self) -> Result<SpeechRequest> {
        let backend = parse_backend(self.backend.as_deref())?;
        let mut request = SpeechRequest::new(self.model, self.input);
        request.backend = backend;
        request.voice = self.voice;
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn chat_request_with_unknown_fields_is_accepted() {
        let raw = json!({
            "model": "gemma",
            "messages": [{"role": "user", "content": "Hello"}],
            "some_future_field": {"ignored": true},
            "temperature": 0.2
        });
        let request: ChatCompletionRequest = serde_json::from_value(raw).unwrap();
        let request = request.into_generation_request().unwrap();
        assert!((request.sampling.temperature - 0.2).abs() < f32::EPSILON);
        assert!(!request.stream);
    }

    #[test]
    fn multipart_content_extracts_images() {
        let raw = json!({
            "model": "llava",
            "messages": [{
                "role": "user",
                "content": [
                    {"type": "text", "text": "What is in this image?"},
                    {"type": "image_url", "image_url": {"url": "data:image/png;base64,aGVsbG8="}}
                ]
            }]
        });
        let request: ChatCompletionRequest = serde_json::from_value(raw).unwrap();
        let request = request.into_generation_request().unwrap();
        assert!(request.prompt.has_images());
        match &request.prompt {
            PromptInput::Messages(messages) => {
                assert_eq!(messages[0].images, vec!["aGVsbG8=".to_string()]);
            }
            PromptInput::Text(_) => panic!("expected messages"),
        }
    }

    #[test]
    fn response_format_json_schema_is_extracted() {
        let format = ResponseFormat {
            kind: "json_schema".to_string(),
            json_schema: Some(JsonSchemaSpec {
                name: Some("person".to_string()),
                schema: json!({"type": "object"}),
            }),
        };
        let schema = extract_schema(Some(&format), None).unwrap();
        assert_eq!(schema, Some(json!({"type": "object"})));
    }

    #[test]
    fn json_object_without_schema_is_rejected() {
        let format = ResponseFormat {
            kind: "json_object".to_string(),
            json_schema: None,
        };
        let err = extract_schema(Some(&format), None).unwrap_err();
        assert_eq!(err.category(), "unsupported_schema");
    }

    #[test]
    fn legacy_functions_supply_the_schema() {
        let functions = vec![FunctionDef {
            name: "get_weather".to_string(),
            parameters: Some(json!({"type": "object", "properties": {}})),
        }];
        let schema = extract_schema(None, Some(&functions)).unwrap();
        assert!(schema.is_some());
    }

    #[test]
    fn stop_accepts_string_or_array() {
        let raw = json!({
            "model": "gemma",
            "messages": [{"role": "user", "content": "x"}],
            "stop": "END"
        });
        let request: ChatCompletionRequest = serde_json::from_value(raw).unwrap();
        let request = request.into_generation_request().unwrap();
        assert_eq!(request.sampling.stop_sequences, vec!["END".to_string()]);
    }

    #[test]
    fn image_size_parsing() {
        let request = ImagesRequest {
            model: "sdxl".to_string(),
            prompt: "a cat".to_string(),
            backend: None,
            size: Some("640x480".to_string()),
            steps: None,
            seed: None,
        };
        let request = request.into_generation_request().unwrap();
        let options = request.image_options.unwrap();
        assert_eq!((options.width, options.height), (640, 480));

        let bad = ImagesRequest {
            model: "sdxl".to_string(),
            prompt: "a cat".to_string(),
            backend: None,
            size: Some("huge".to_string()),
            steps: None,
            seed: None,
        };
        assert!(bad.into_generation_request().is_err());
    }

    #[test]
    fn data_uri_stripping() {
        assert_eq!(strip_data_uri("data:image/png;base64,QUJD"), "QUJD");
        assert_eq!(strip_data_uri("QUJD"), "QUJD");
    }
}
