//! # Janus Runtime
//!
//! The model handle abstraction and the two native runtime adapters.
//!
//! A [`ModelHandle`] exposes the uniform capability set (`generate`,
//! `stream_generate`, `embed_image`, `synthesize_speech`); the GGML and ONNX
//! adapters implement the subset their descriptor's modality requires and
//! fail everything else with `UnsupportedCapability`.
//!
//! The native tensor engines are external collaborators. Each adapter owns a
//! runner child process (a llama.cpp-family server for GGML, the ONNX runner
//! for ONNX), reached over a localhost HTTP/SSE wire; unloading a handle
//! kills the runner, releasing native resources deterministically.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ggml;
pub mod handle;
pub mod native;
pub mod onnx;
pub mod prompt;
pub mod resolve;

mod proc;

pub use ggml::{GgmlRuntime, GgmlRuntimeConfig};
pub use handle::{modality_capabilities, Capability, ModelHandle};
pub use native::{NativeRuntime, NativeStream, TokenEvent, TokenMask};
pub use onnx::{OnnxRuntime, OnnxRuntimeConfig};
pub use resolve::{resolve_model_path, ModelFormat};
