//! # Janus Server
//!
//! The wire adapter and HTTP server: parses OpenAI-compatible requests into
//! gateway requests, serializes session output into incremental SSE chunks
//! or aggregated JSON responses, and maps the error taxonomy onto HTTP
//! status codes.
//!
//! Compatibility policy: unknown JSON fields are ignored; absent sampling
//! parameters take server defaults; malformed or unsupported schemas are
//! rejected with HTTP 400 before they reach the constraint engine.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod openai;
pub mod server;

pub use server::{AppState, Server, ServerConfig};
