//! # Janus Gateway
//!
//! The orchestration layer between the wire adapter and the native
//! runtimes: the model registry (with serialized first loads), per-model
//! admission control, the request router, and the streaming session
//! manager.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod admission;
pub mod registry;
pub mod router;
pub mod session;

pub use admission::AdmissionGate;
pub use registry::{ModelEntry, ModelRegistry, RegistryConfig};
pub use router::Router;
pub use session::{CancelHandle, GenerationSession, SessionConfig, SessionStatus};
