//! Handler-level tests of the OpenAI-compatible API over a mock runtime.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use janus_core::{
    BackendKind, GenerationRequest, Modality, ModelDescriptor, ModelSource, Result,
};
use janus_gateway::{ModelRegistry, RegistryConfig, Router as GatewayRouter};
use janus_runtime::{ModelHandle, NativeRuntime, NativeStream, TokenEvent};
use janus_server::{Server, ServerConfig};
use serde_json::{json, Value};
use tower::ServiceExt;

struct ScriptRuntime {
    tokens: Vec<String>,
    alternates: Vec<String>,
}

#[async_trait]
impl NativeRuntime for ScriptRuntime {
    fn backend(&self) -> BackendKind {
        BackendKind::Ggml
    }

    async fn load(&self, descriptor: &ModelDescriptor) -> Result<Arc<dyn ModelHandle>> {
        Ok(Arc::new(ScriptHandle {
            descriptor: descriptor.clone(),
            tokens: self.tokens.clone(),
            alternates: self.alternates.clone(),
        }))
    }
}

struct ScriptHandle {
    descriptor: ModelDescriptor,
    tokens: Vec<String>,
    alternates: Vec<String>,
}

#[async_trait]
impl ModelHandle for ScriptHandle {
    fn descriptor(&self) -> &ModelDescriptor {
        &self.descriptor
    }

    async fn stream_generate(&self, _request: &GenerationRequest) -> Result<Box<dyn NativeStream>> {
        Ok(Box::new(ScriptStream {
            active: self.tokens.clone().into(),
            alternates: self.alternates.clone().into(),
            swapped: false,
        }))
    }
}

struct ScriptStream {
    active: VecDeque<String>,
    alternates: VecDeque<String>,
    swapped: bool,
}

#[async_trait]
impl NativeStream for ScriptStream {
    async fn next_token(&mut self) -> Result<Option<TokenEvent>> {
        Ok(self.active.pop_front().map(|text| TokenEvent { text }))
    }

    async fn resample(&mut self, _accepted: &str) -> Result<Option<TokenEvent>> {
        if !self.swapped {
            self.active = std::mem::take(&mut self.alternates);
            self.swapped = true;
        }
        self.active.pop_front().map(|text| Ok(TokenEvent { text })).transpose()
    }

    async fn cancel(&mut self) {
        self.active.clear();
    }

    fn prompt_tokens(&self) -> u32 {
        4
    }
}

fn app_with(tokens: &[&str], alternates: &[&str]) -> axum::Router {
    let runtime = Arc::new(ScriptRuntime {
        tokens: tokens.iter().map(ToString::to_string).collect(),
        alternates: alternates.iter().map(ToString::to_string).collect(),
    });
    let mut registry = ModelRegistry::new(RegistryConfig {
        allow_dynamic: false,
        ..RegistryConfig::default()
    });
    registry.register_runtime(runtime);
    let registry = Arc::new(registry);
    registry.register(ModelDescriptor::new(
        "gemma",
        BackendKind::Ggml,
        Modality::Text,
        ModelSource::local("/unused"),
    ));
    registry.register(ModelDescriptor::new(
        "voice",
        BackendKind::Ggml,
        Modality::Tts,
        ModelSource::local("/unused"),
    ));

    let router = Arc::new(GatewayRouter::new(registry));
    Server::new(ServerConfig::default(), router).app()
}

async fn post_json(app: axum::Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::post(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn chat_completion_returns_content_and_stop() {
    let app = app_with(&["Hello", ", world"], &[]);
    let (status, body) = post_json(
        app,
        "/v1/chat/completions",
        json!({
            "model": "gemma",
            "messages": [{"role": "user", "content": "Hi"}]
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["object"], "chat.completion");
    assert_eq!(body["choices"][0]["message"]["content"], "Hello, world");
    assert_eq!(body["choices"][0]["finish_reason"], "stop");
    assert_eq!(body["usage"]["completion_tokens"], 2);
}

#[tokio::test]
async fn streaming_chat_emits_chunks_and_done_sentinel() {
    let app = app_with(&["Hel", "lo"], &[]);
    let response = app
        .oneshot(
            Request::post("/v1/chat/completions")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({
                        "model": "gemma",
                        "messages": [{"role": "user", "content": "Hi"}],
                        "stream": true
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.starts_with("text/event-stream"));

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8_lossy(&body);

    let deltas: Vec<&str> = text
        .lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .collect();
    assert!(deltas.len() >= 3);
    assert_eq!(*deltas.last().unwrap(), "[DONE]");
    assert!(deltas[0].contains("\"role\":\"assistant\""));
    assert!(text.contains("\"finish_reason\":\"stop\""));
    assert!(text.contains("chat.completion.chunk"));
}

#[tokio::test]
async fn response_format_schema_produces_valid_json() {
    let app = app_with(
        &["I would love to help!"],
        &["{\"name\"", ": \"Ada\"", "}"],
    );
    let (status, body) = post_json(
        app,
        "/v1/chat/completions",
        json!({
            "model": "gemma",
            "messages": [{"role": "user", "content": "Name?"}],
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": "person",
                    "schema": {
                        "type": "object",
                        "properties": {"name": {"type": "string"}},
                        "required": ["name"]
                    }
                }
            }
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["choices"][0]["finish_reason"], "schema_complete");
    let content: Value =
        serde_json::from_str(body["choices"][0]["message"]["content"].as_str().unwrap()).unwrap();
    assert_eq!(content["name"], "Ada");
}

#[tokio::test]
async fn unsupported_schema_is_a_400() {
    let app = app_with(&["x"], &[]);
    let (status, body) = post_json(
        app,
        "/v1/chat/completions",
        json!({
            "model": "gemma",
            "messages": [{"role": "user", "content": "Hi"}],
            "response_format": {"type": "json_object"}
        }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], "unsupported_schema");
}

#[tokio::test]
async fn chat_against_tts_descriptor_is_a_400_modality_mismatch() {
    let app = app_with(&["x"], &[]);
    let (status, body) = post_json(
        app,
        "/v1/chat/completions",
        json!({
            "model": "voice",
            "messages": [{"role": "user", "content": "Hi"}]
        }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], "modality_mismatch");
}

#[tokio::test]
async fn unknown_model_is_a_404() {
    let app = app_with(&["x"], &[]);
    let (status, body) = post_json(
        app,
        "/v1/chat/completions",
        json!({
            "model": "missing",
            "messages": [{"role": "user", "content": "Hi"}]
        }),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["type"], "model_not_found");
}

#[tokio::test]
async fn completions_endpoint_works() {
    let app = app_with(&["42"], &[]);
    let (status, body) = post_json(
        app,
        "/v1/completions",
        json!({"model": "gemma", "prompt": "The answer is"}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["object"], "text_completion");
    assert_eq!(body["choices"][0]["text"], "42");
}

#[tokio::test]
async fn models_are_listed() {
    let app = app_with(&["x"], &[]);
    let response = app
        .oneshot(Request::get("/v1/models").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    let ids: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|m| m["id"].as_str())
        .collect();
    assert!(ids.contains(&"gemma"));
    assert!(ids.contains(&"voice"));
}

#[tokio::test]
async fn health_and_status() {
    let app = app_with(&["x"], &[]);
    let response = app
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(Request::get("/api/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], "running");
    assert_eq!(body["models"], 2);
}
