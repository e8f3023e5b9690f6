//! The request router.
//!
//! Maps an incoming operation plus declared backend/model onto a registry
//! entry, validates the operation against the descriptor's modality before
//! any native call, enforces admission, and hands off to a session or a
//! one-shot handle capability.

use std::sync::Arc;

use janus_core::{
    AudioClip, EmbedImageRequest, Error, GenerationRequest, GenerationResponse, ImageArtifact,
    ImageEmbedding, Modality, Result, SpeechRequest,
};
use janus_schema::SchemaCache;

use crate::registry::{ModelEntry, ModelRegistry};
use crate::session::{GenerationSession, SessionConfig};

/// Routes requests to model handles and sessions.
pub struct Router {
    registry: Arc<ModelRegistry>,
    schemas: SchemaCache,
    session_config: SessionConfig,
}

impl Router {
    /// Creates a router over a registry.
    #[must_use]
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self {
            registry,
            schemas: SchemaCache::new(),
            session_config: SessionConfig::default(),
        }
    }

    /// Overrides the session policy.
    #[must_use]
    pub fn with_session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    /// The registry this router serves.
    #[must_use]
    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    fn check_modality(entry: &ModelEntry, requested: Modality) -> Result<()> {
        let declared = entry.descriptor.modality;
        let compatible = match requested {
            // A VLM descriptor also serves plain text generation.
            Modality::Text => declared.is_token_streaming(),
            other => declared == other,
        };
        if compatible {
            Ok(())
        } else {
            Err(Error::ModalityMismatch {
                model_id: entry.descriptor.id.to_string(),
                modality: declared,
                requested,
            })
        }
    }

    /// Starts a generation session for a text/VLM request.
    ///
    /// Validation order matters: modality and schema problems are rejected
    /// before any native load or admission, so a bad request never touches
    /// a runner.
    ///
    /// # Errors
    ///
    /// Propagates validation, admission, load, and adapter errors.
    pub async fn start_session(&self, request: GenerationRequest) -> Result<GenerationSession> {
        request.sampling.validate()?;

        let requested = if request.prompt.has_images() {
            Modality::Vlm
        } else {
            Modality::Text
        };
        let entry =
            self.registry
                .resolve(request.model.as_str(), request.backend, requested)?;
        Self::check_modality(&entry, requested)?;

        let automaton = match &request.schema {
            Some(schema) => Some(self.schemas.get_or_compile(schema)?),
            None => None,
        };

        let permit = entry.gate.admit(request.model.as_str()).await?;
        let handle = self.registry.handle(&entry).await?;
        let stream = handle.stream_generate(&request).await?;

        tracing::debug!(
            request_id = %request.request_id,
            model = %request.model,
            constrained = automaton.is_some(),
            stream = request.stream,
            "Session started"
        );

        Ok(GenerationSession::new(
            &request,
            stream,
            automaton,
            Some(permit),
            &self.session_config,
        ))
    }

    /// Runs a text/VLM request to completion, buffered.
    ///
    /// # Errors
    ///
    /// Propagates session errors.
    pub async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse> {
        self.start_session(request).await?.collect().await
    }

    /// Generates an image on an image-modality descriptor.
    ///
    /// # Errors
    ///
    /// Propagates validation, admission, load, and adapter errors.
    pub async fn generate_image(&self, request: GenerationRequest) -> Result<ImageArtifact> {
        let entry = self.registry.resolve(
            request.model.as_str(),
            request.backend,
            Modality::Image,
        )?;
        Self::check_modality(&entry, Modality::Image)?;

        let _permit = entry.gate.admit(request.model.as_str()).await?;
        let handle = self.registry.handle(&entry).await?;
        handle.generate(&request).await?.into_image()
    }

    /// Synthesizes speech on a TTS descriptor.
    ///
    /// # Errors
    ///
    /// Propagates validation, admission, load, and adapter errors.
    pub async fn synthesize_speech(&self, request: SpeechRequest) -> Result<AudioClip> {
        if request.input.is_empty() {
            return Err(Error::invalid_request("speech input must be non-empty"));
        }
        let entry =
            self.registry
                .resolve(request.model.as_str(), request.backend, Modality::Tts)?;
        Self::check_modality(&entry, Modality::Tts)?;

        let _permit = entry.gate.admit(request.model.as_str()).await?;
        let handle = self.registry.handle(&entry).await?;
        handle.synthesize_speech(&request).await
    }

    /// Embeds an image on a VLM descriptor.
    ///
    /// # Errors
    ///
    /// Propagates validation, admission, load, and adapter errors.
    pub async fn embed_image(&self, request: EmbedImageRequest) -> Result<ImageEmbedding> {
        if request.image.is_empty() {
            return Err(Error::invalid_request("image payload must be non-empty"));
        }
        let entry =
            self.registry
                .resolve(request.model.as_str(), request.backend, Modality::Vlm)?;
        Self::check_modality(&entry, Modality::Vlm)?;

        let _permit = entry.gate.admit(request.model.as_str()).await?;
        let handle = self.registry.handle(&entry).await?;
        handle.embed_image(&request).await
    }
}
