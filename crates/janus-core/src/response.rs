//! Response types for generation, speech, and embedding operations.

use serde::{Deserialize, Serialize};

use crate::types::{FinishReason, ModelId, RequestId, Usage};

/// Response from a completed (non-streaming) generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResponse {
    /// Request identifier.
    pub request_id: RequestId,

    /// Model used for generation.
    pub model: ModelId,

    /// Generated text.
    pub text: String,

    /// Reason generation stopped.
    pub finish_reason: FinishReason,

    /// Token usage statistics.
    pub usage: Usage,
}

/// Audio output formats the speech path produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    /// RIFF/WAVE container.
    Wav,
    /// Raw signed 16-bit PCM.
    Pcm16,
}

impl AudioFormat {
    /// HTTP content type for this format.
    #[must_use]
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Wav => "audio/wav",
            Self::Pcm16 => "audio/pcm",
        }
    }
}

/// Synthesized speech audio.
#[derive(Debug, Clone)]
pub struct AudioClip {
    /// Encoded audio bytes.
    pub bytes: Vec<u8>,
    /// Encoding of `bytes`.
    pub format: AudioFormat,
    /// Sample rate in Hz.
    pub sample_rate: u32,
}

impl AudioClip {
    /// Approximate duration in seconds, assuming mono 16-bit samples for PCM.
    #[must_use]
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        let sample_bytes = match self.format {
            // WAV carries a 44-byte header before the PCM payload.
            AudioFormat::Wav => self.bytes.len().saturating_sub(44),
            AudioFormat::Pcm16 => self.bytes.len(),
        };
        (sample_bytes / 2) as f32 / self.sample_rate as f32
    }
}

/// A generated image.
#[derive(Debug, Clone)]
pub struct ImageArtifact {
    /// PNG-encoded image bytes.
    pub bytes: Vec<u8>,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

/// Output of the one-shot `generate` capability: text for text/VLM
/// descriptors, image bytes for image descriptors.
#[derive(Debug, Clone)]
pub enum GenerationOutput {
    /// A completed text generation.
    Text(GenerationResponse),
    /// A generated image.
    Image(ImageArtifact),
}

impl GenerationOutput {
    /// Unwraps the text response.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the output is an image.
    pub fn into_text(self) -> crate::Result<GenerationResponse> {
        match self {
            Self::Text(response) => Ok(response),
            Self::Image(_) => Err(crate::Error::internal("expected text output, got image")),
        }
    }

    /// Unwraps the image artifact.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the output is text.
    pub fn into_image(self) -> crate::Result<ImageArtifact> {
        match self {
            Self::Image(artifact) => Ok(artifact),
            Self::Text(_) => Err(crate::Error::internal("expected image output, got text")),
        }
    }
}

/// Embedding vector produced from an image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageEmbedding {
    /// The embedding vector.
    pub vector: Vec<f32>,
}

impl ImageEmbedding {
    /// Returns the dimensionality of the embedding.
    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.vector.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_duration() {
        // 1 second of 16kHz mono PCM16.
        let clip = AudioClip {
            bytes: vec![0; 32_000],
            format: AudioFormat::Pcm16,
            sample_rate: 16_000,
        };
        assert!((clip.duration_secs() - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn content_types() {
        assert_eq!(AudioFormat::Wav.content_type(), "audio/wav");
        assert_eq!(AudioFormat::Pcm16.content_type(), "audio/pcm");
    }
}
