//! # Janus Core
//!
//! Core types shared across the Janus inference gateway:
//! - The unified error taxonomy
//! - Model descriptors (backend kind, modality, source)
//! - Generation/speech/embedding request structures
//! - Response structures and streamed chunk types
//! - Sampling parameters

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod descriptor;
pub mod error;
pub mod request;
pub mod response;
pub mod sampling;
pub mod streaming;
pub mod types;

pub use descriptor::{ModelDescriptor, ModelSource};
pub use error::{Error, Result};
pub use request::{EmbedImageRequest, GenerationRequest, ImageOptions, PromptInput, SpeechRequest};
pub use response::{
    AudioClip, AudioFormat, GenerationOutput, GenerationResponse, ImageArtifact, ImageEmbedding,
};
pub use sampling::SamplingParams;
pub use streaming::{StreamChunk, TokenStream};
pub use types::*;
