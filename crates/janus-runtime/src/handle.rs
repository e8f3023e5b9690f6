//! The uniform model handle capability interface.

use async_trait::async_trait;
use janus_core::{
    AudioClip, EmbedImageRequest, Error, GenerationOutput, GenerationRequest, ImageEmbedding,
    Modality, ModelDescriptor, Result, SpeechRequest,
};

use crate::native::NativeStream;

/// The capability set a handle can implement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// One-shot generation returning full text or image bytes.
    Generate,
    /// Lazy, cancelable token streaming.
    StreamGenerate,
    /// Image → embedding vector.
    EmbedImage,
    /// Text → audio bytes.
    SynthesizeSpeech,
}

impl Capability {
    /// Name used in error messages.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Generate => "generate",
            Self::StreamGenerate => "stream_generate",
            Self::EmbedImage => "embed_image",
            Self::SynthesizeSpeech => "synthesize_speech",
        }
    }
}

/// Returns the capabilities a modality implies.
#[must_use]
pub fn modality_capabilities(modality: Modality) -> &'static [Capability] {
    match modality {
        Modality::Text => &[Capability::Generate, Capability::StreamGenerate],
        Modality::Vlm => &[
            Capability::Generate,
            Capability::StreamGenerate,
            Capability::EmbedImage,
        ],
        Modality::Image => &[Capability::Generate],
        Modality::Tts => &[Capability::SynthesizeSpeech],
    }
}

pub(crate) fn unsupported(descriptor: &ModelDescriptor, capability: Capability) -> Error {
    Error::UnsupportedCapability {
        model_id: descriptor.id.to_string(),
        modality: descriptor.modality,
        capability: capability.as_str(),
    }
}

/// A loaded model, polymorphic over the capability set.
///
/// Adapters implement exactly the subset their modality requires; the
/// defaults fail with `UnsupportedCapability`.
#[async_trait]
pub trait ModelHandle: Send + Sync {
    /// The descriptor this handle was loaded from.
    fn descriptor(&self) -> &ModelDescriptor;

    /// Returns `true` if the handle implements the capability.
    fn supports(&self, capability: Capability) -> bool {
        modality_capabilities(self.descriptor().modality).contains(&capability)
    }

    /// One-shot generation: full text for text/VLM models, image bytes for
    /// image models.
    async fn generate(&self, _request: &GenerationRequest) -> Result<GenerationOutput> {
        Err(unsupported(self.descriptor(), Capability::Generate))
    }

    /// Begins a lazy, cancelable token stream.
    async fn stream_generate(&self, _request: &GenerationRequest) -> Result<Box<dyn NativeStream>> {
        Err(unsupported(self.descriptor(), Capability::StreamGenerate))
    }

    /// Embeds an image into a vector (VLM models).
    async fn embed_image(&self, _request: &EmbedImageRequest) -> Result<ImageEmbedding> {
        Err(unsupported(self.descriptor(), Capability::EmbedImage))
    }

    /// Synthesizes speech from text (TTS models).
    async fn synthesize_speech(&self, _request: &SpeechRequest) -> Result<AudioClip> {
        Err(unsupported(self.descriptor(), Capability::SynthesizeSpeech))
    }

    /// Releases native resources deterministically.
    async fn unload(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use janus_core::{BackendKind, ModelSource};

    struct Bare(ModelDescriptor);

    #[async_trait]
    impl ModelHandle for Bare {
        fn descriptor(&self) -> &ModelDescriptor {
            &self.0
        }
    }

    #[tokio::test]
    async fn defaults_fail_with_unsupported_capability() {
        let handle = Bare(ModelDescriptor::new(
            "tts-model",
            BackendKind::Onnx,
            Modality::Tts,
            ModelSource::local("/tmp/voice.onnx"),
        ));

        assert!(handle.supports(Capability::SynthesizeSpeech));
        assert!(!handle.supports(Capability::StreamGenerate));

        let req = GenerationRequest::new("tts-model", "hello");
        let err = handle.generate(&req).await.unwrap_err();
        assert_eq!(err.category(), "unsupported_capability");
    }

    #[test]
    fn modality_capability_sets() {
        assert!(modality_capabilities(Modality::Vlm).contains(&Capability::EmbedImage));
        assert!(!modality_capabilities(Modality::Text).contains(&Capability::EmbedImage));
        assert_eq!(modality_capabilities(Modality::Tts).len(), 1);
    }
}
