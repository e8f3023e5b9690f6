//! HTTP server with OpenAI-compatible endpoints over the Janus gateway.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::sse::{Event, KeepAlive};
use axum::response::{IntoResponse, Response, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine as _;
use futures::StreamExt;
use janus_core::{EmbedImageRequest, Error, ModelDescriptor, ModelSource};
use janus_gateway::Router as GatewayRouter;
use janus_telemetry::GatewayMetrics;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::openai::{
    ChatChoice, ChatChunkChoice, ChatCompletionChunk, ChatCompletionRequest,
    ChatCompletionResponse, ChatDelta, ChatResponseMessage, CompletionChoice, CompletionRequest,
    CompletionResponse, EmbeddingDatum, EmbeddingsRequest, EmbeddingsResponse, ImageDatum,
    ImagesRequest, ImagesResponse, ModelObject, ModelsResponse, SpeechWireRequest,
};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address.
    pub addr: SocketAddr,
    /// Enable permissive CORS.
    pub cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            cors: true,
        }
    }
}

/// Shared application state.
pub struct AppState {
    /// The gateway router.
    pub router: Arc<GatewayRouter>,
    /// Request metrics.
    pub metrics: GatewayMetrics,
    /// Server start time.
    pub start_time: Instant,
}

/// The HTTP server.
pub struct Server {
    config: ServerConfig,
    state: Arc<AppState>,
}

impl Server {
    /// Creates a server over a gateway router.
    #[must_use]
    pub fn new(config: ServerConfig, router: Arc<GatewayRouter>) -> Self {
        let state = Arc::new(AppState {
            router,
            metrics: GatewayMetrics::default(),
            start_time: Instant::now(),
        });
        Self { config, state }
    }

    /// Builds the axum application (exposed for embedding and tests).
    #[must_use]
    pub fn app(&self) -> Router {
        let mut app = Router::new()
            .route("/health", get(health))
            .route("/ready", get(ready))
            .route("/v1/models", get(list_models))
            .route("/v1/chat/completions", post(chat_completions))
            .route("/v1/completions", post(completions))
            .route("/v1/images/generations", post(images_generations))
            .route("/v1/audio/speech", post(audio_speech))
            .route("/v1/embeddings", post(embeddings))
            .route("/api/status", get(server_status))
            .route("/api/models/load", post(load_model))
            .route("/api/models/reload", post(reload_model))
            .route("/api/models/unload", post(unload_model))
            .with_state(Arc::clone(&self.state));

        app = app.layer(TraceLayer::new_for_http());
        if self.config.cors {
            app = app.layer(CorsLayer::permissive());
        }
        app
    }

    /// Runs the server until SIGINT/SIGTERM, then unloads every model.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot bind or the server fails.
    pub async fn run(self) -> janus_core::Result<()> {
        let app = self.app();

        tracing::info!(addr = %self.config.addr, "Starting Janus server");
        let listener = tokio::net::TcpListener::bind(self.config.addr)
            .await
            .map_err(Error::Io)?;

        let shutdown_signal = async {
            let ctrl_c = async {
                if tokio::signal::ctrl_c().await.is_err() {
                    std::future::pending::<()>().await;
                }
            };

            #[cfg(unix)]
            let terminate = async {
                match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(mut signal) => {
                        signal.recv().await;
                    }
                    Err(_) => std::future::pending::<()>().await,
                }
            };

            #[cfg(not(unix))]
            let terminate = std::future::pending::<()>();

            tokio::select! {
                () = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
                () = terminate => tracing::info!("Received SIGTERM, shutting down"),
            }
        };

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| Error::internal(e.to_string()))?;

        self.state.router.registry().shutdown().await;
        tracing::info!("Server shutdown complete");
        Ok(())
    }
}

// === Error mapping ===

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    message: String,
    #[serde(rename = "type")]
    error_type: String,
}

/// Maps the error taxonomy onto HTTP status codes, 1:1 per category.
fn status_for(error: &Error) -> StatusCode {
    match error {
        Error::ModelNotFound { .. } => StatusCode::NOT_FOUND,
        Error::InvalidRequest { .. }
        | Error::ModalityMismatch { .. }
        | Error::UnsupportedCapability { .. }
        | Error::UnsupportedSchema { .. } => StatusCode::BAD_REQUEST,
        Error::Overloaded { .. } => StatusCode::TOO_MANY_REQUESTS,
        Error::Cancelled => {
            StatusCode::from_u16(499).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
        }
        Error::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        Error::Adapter { .. } => StatusCode::BAD_GATEWAY,
        Error::ModelLoad { .. }
        | Error::SchemaUnsatisfiable { .. }
        | Error::Io(_)
        | Error::Serialization(_)
        | Error::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(state: &AppState, error: &Error) -> Response {
    state
        .metrics
        .record_error(matches!(error, Error::Overloaded { .. }));
    let body = Json(ErrorResponse {
        error: ErrorDetail {
            message: error.to_string(),
            error_type: error.category().to_string(),
        },
    });
    (status_for(error), body).into_response()
}

// === Health and status ===

async fn health() -> &'static str {
    "OK"
}

async fn ready(State(state): State<Arc<AppState>>) -> Response {
    if state.router.registry().list().is_empty() {
        (StatusCode::SERVICE_UNAVAILABLE, "No models registered").into_response()
    } else {
        (StatusCode::OK, "Ready").into_response()
    }
}

#[derive(Debug, Serialize)]
struct ServerStatus {
    status: String,
    uptime_seconds: u64,
    models: usize,
    sessions_started: u64,
    tokens_generated: u64,
}

async fn server_status(State(state): State<Arc<AppState>>) -> Json<ServerStatus> {
    Json(ServerStatus {
        status: "running".to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        models: state.router.registry().list().len(),
        sessions_started: state.metrics.sessions(),
        tokens_generated: state.metrics.tokens(),
    })
}

// === Model management ===

#[derive(Debug, Deserialize)]
struct LoadModelRequest {
    model: String,
    #[serde(default)]
    backend: Option<String>,
    #[serde(default)]
    modality: Option<String>,
    #[serde(default)]
    path: Option<String>,
}

async fn load_model(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoadModelRequest>,
) -> Response {
    let backend = match req.backend.as_deref().map(str::parse).transpose() {
        Ok(backend) => backend.unwrap_or(janus_core::BackendKind::Ggml),
        Err(e) => return error_response(&state, &e),
    };
    let modality = match req.modality.as_deref().map(str::parse).transpose() {
        Ok(modality) => modality.unwrap_or(janus_core::Modality::Text),
        Err(e) => return error_response(&state, &e),
    };
    let source = match &req.path {
        Some(path) => ModelSource::local(path),
        None => ModelSource::huggingface(&req.model),
    };

    let entry = state
        .router
        .registry()
        .register(ModelDescriptor::new(req.model.as_str(), backend, modality, source));
    match state.router.registry().handle(&entry).await {
        Ok(_) => (
            StatusCode::OK,
            Json(serde_json::json!({"status": "loaded", "model": req.model})),
        )
            .into_response(),
        Err(e) => error_response(&state, &e),
    }
}

#[derive(Debug, Deserialize)]
struct ModelActionRequest {
    model: String,
}

async fn reload_model(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ModelActionRequest>,
) -> Response {
    match state.router.registry().reload(&req.model).await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({"status": "reloaded", "model": req.model})),
        )
            .into_response(),
        Err(e) => error_response(&state, &e),
    }
}

async fn unload_model(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ModelActionRequest>,
) -> Response {
    match state.router.registry().unregister(&req.model).await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({"status": "unloaded", "model": req.model})),
        )
            .into_response(),
        Err(e) => error_response(&state, &e),
    }
}

// === OpenAI-compatible endpoints ===

async fn list_models(State(state): State<Arc<AppState>>) -> Json<ModelsResponse> {
    let data = state
        .router
        .registry()
        .list()
        .into_iter()
        .map(|descriptor| ModelObject {
            id: descriptor.id.to_string(),
            object: "model".to_string(),
            created: chrono::Utc::now().timestamp(),
            owned_by: "janus".to_string(),
            backend: descriptor.backend.to_string(),
            modality: descriptor.modality.to_string(),
        })
        .collect();

    Json(ModelsResponse {
        object: "list".to_string(),
        data,
    })
}

async fn chat_completions(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatCompletionRequest>,
) -> Response {
    let request = match req.into_generation_request() {
        Ok(request) => request,
        Err(e) => return error_response(&state, &e),
    };

    let id = format!("chatcmpl-{}", uuid::Uuid::new_v4());
    let created = chrono::Utc::now().timestamp();
    let model = request.model.to_string();
    tracing::debug!(request_id = %request.request_id, model = %model, stream = request.stream, "Chat completion request");
    state.metrics.record_session();

    if request.stream {
        let session = match state.router.start_session(request).await {
            Ok(session) => session,
            Err(e) => return error_response(&state, &e),
        };

        let chunk_stream = session.into_stream();
        let sse = async_stream::stream! {
            futures::pin_mut!(chunk_stream);
            let mut first = true;
            while let Some(item) = chunk_stream.next().await {
                let chunk = match item {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        let payload = serde_json::json!({
                            "error": {"message": e.to_string(), "type": e.category()}
                        });
                        yield Ok::<_, Infallible>(
                            Event::default().data(payload.to_string()),
                        );
                        break;
                    }
                };
                if let Some(message) = &chunk.error {
                    // Failed sessions still terminate the stream cleanly,
                    // with the error detail in the final data event.
                    let payload = serde_json::json!({
                        "error": {"message": message, "type": "generation_error"}
                    });
                    yield Ok::<_, Infallible>(Event::default().data(payload.to_string()));
                    break;
                }
                let payload = ChatCompletionChunk {
                    id: id.clone(),
                    object: "chat.completion.chunk".to_string(),
                    created,
                    model: model.clone(),
                    choices: vec![ChatChunkChoice {
                        index: 0,
                        delta: ChatDelta {
                            role: first.then(|| "assistant".to_string()),
                            content: chunk.delta.clone(),
                        },
                        finish_reason: chunk
                            .finish_reason
                            .map(|reason| reason.as_str().to_string()),
                    }],
                    usage: chunk.usage,
                };
                first = false;
                let data = serde_json::to_string(&payload).unwrap_or_default();
                yield Ok::<_, Infallible>(Event::default().data(data));
            }
            yield Ok::<_, Infallible>(Event::default().data("[DONE]"));
        };

        Sse::new(sse).keep_alive(KeepAlive::default()).into_response()
    } else {
        match state.router.generate(request).await {
            Ok(response) => {
                state.metrics.record_tokens(response.usage.completion_tokens);
                Json(ChatCompletionResponse {
                    id,
                    object: "chat.completion".to_string(),
                    created,
                    model,
                    choices: vec![ChatChoice {
                        index: 0,
                        message: ChatResponseMessage {
                            role: "assistant".to_string(),
                            content: response.text,
                        },
                        finish_reason: response.finish_reason.as_str().to_string(),
                    }],
                    usage: response.usage,
                })
                .into_response()
            }
            Err(e) => error_response(&state, &e),
        }
    }
}

async fn completions(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CompletionRequest>,
) -> Response {
    let request = match req.into_generation_request() {
        Ok(request) => request,
        Err(e) => return error_response(&state, &e),
    };

    let id = format!("cmpl-{}", uuid::Uuid::new_v4());
    let created = chrono::Utc::now().timestamp();
    let model = request.model.to_string();
    state.metrics.record_session();

    match state.router.generate(request).await {
        Ok(response) => {
            state.metrics.record_tokens(response.usage.completion_tokens);
            Json(CompletionResponse {
                id,
                object: "text_completion".to_string(),
                created,
                model,
                choices: vec![CompletionChoice {
                    text: response.text,
                    index: 0,
                    finish_reason: response.finish_reason.as_str().to_string(),
                }],
                usage: response.usage,
            })
            .into_response()
        }
        Err(e) => error_response(&state, &e),
    }
}

async fn images_generations(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ImagesRequest>,
) -> Response {
    let request = match req.into_generation_request() {
        Ok(request) => request,
        Err(e) => return error_response(&state, &e),
    };
    state.metrics.record_session();

    match state.router.generate_image(request).await {
        Ok(artifact) => Json(ImagesResponse {
            created: chrono::Utc::now().timestamp(),
            data: vec![ImageDatum {
                b64_json: base64::engine::general_purpose::STANDARD.encode(&artifact.bytes),
            }],
        })
        .into_response(),
        Err(e) => error_response(&state, &e),
    }
}

async fn audio_speech(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SpeechWireRequest>,
) -> Response {
    let request = match req.into_speech_request() {
        Ok(request) => request,
        Err(e) => return error_response(&state, &e),
    };
    state.metrics.record_session();

    match state.router.synthesize_speech(request).await {
        Ok(clip) => {
            let mut response = Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, clip.format.content_type());
            if clip.sample_rate > 0 {
                response = response.header("X-Sample-Rate", clip.sample_rate.to_string());
            }
            response
                .body(axum::body::Body::from(clip.bytes))
                .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
        }
        Err(e) => error_response(&state, &e),
    }
}

async fn embeddings(
    State(state): State<Arc<AppState>>,
    Json(req): Json<EmbeddingsRequest>,
) -> Response {
    let payload = crate::openai::strip_data_uri(&req.input);
    let image = match base64::engine::general_purpose::STANDARD.decode(payload) {
        Ok(image) => image,
        Err(e) => {
            return error_response(
                &state,
                &Error::invalid_request(format!("input must be base64 image data: {e}")),
            );
        }
    };
    let backend = match req.backend.as_deref().map(str::parse).transpose() {
        Ok(backend) => backend,
        Err(e) => return error_response(&state, &e),
    };

    let mut request = EmbedImageRequest::new(req.model.clone(), image);
    request.backend = backend;
    state.metrics.record_session();

    match state.router.embed_image(request).await {
        Ok(embedding) => Json(EmbeddingsResponse {
            object: "list".to_string(),
            data: vec![EmbeddingDatum {
                object: "embedding".to_string(),
                index: 0,
                embedding: embedding.vector,
            }],
            model: req.model,
        })
        .into_response(),
        Err(e) => error_response(&state, &e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_map_one_to_one() {
        assert_eq!(
            status_for(&Error::ModelNotFound {
                model_id: "m".into()
            }),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&Error::Overloaded {
                model_id: "m".into()
            }),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            status_for(&Error::unsupported_schema("x")),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status_for(&Error::Cancelled).as_u16(), 499);
        assert_eq!(
            status_for(&Error::adapter("ggml", "boom")),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_for(&Error::Timeout {
                duration: std::time::Duration::from_secs(1)
            }),
            StatusCode::GATEWAY_TIMEOUT
        );
    }
}
