//! Error types for the Janus ecosystem.

use std::time::Duration;
use thiserror::Error;

use crate::types::Modality;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the Janus ecosystem.
#[derive(Error, Debug)]
pub enum Error {
    /// Model was not found in the registry.
    #[error("Model not found: {model_id}")]
    ModelNotFound {
        /// The requested model identifier.
        model_id: String,
    },

    /// Native model initialization failed. Fatal for the descriptor until an
    /// explicit reload clears the failure.
    #[error("Failed to load model {model_id}: {message}")]
    ModelLoad {
        /// The model whose load failed.
        model_id: String,
        /// Error message from the native runtime.
        message: String,
    },

    /// The handle does not implement the invoked capability.
    #[error("Model {model_id} ({modality}) does not support {capability}")]
    UnsupportedCapability {
        /// The model identifier.
        model_id: String,
        /// The modality of the descriptor.
        modality: Modality,
        /// Name of the capability that was invoked.
        capability: &'static str,
    },

    /// The request type does not fit the descriptor's modality.
    #[error("Modality mismatch for model {model_id}: descriptor is {modality}, request needs {requested}")]
    ModalityMismatch {
        /// The model identifier.
        model_id: String,
        /// The descriptor's declared modality.
        modality: Modality,
        /// The modality the request requires.
        requested: Modality,
    },

    /// The JSON Schema uses constructs the constraint engine cannot compile.
    #[error("Unsupported schema: {message}")]
    UnsupportedSchema {
        /// What made the schema unsupportable.
        message: String,
    },

    /// Constrained generation could not produce schema-valid output.
    #[error("Schema unsatisfiable: {message}")]
    SchemaUnsatisfiable {
        /// Description of the failure point.
        message: String,
    },

    /// The per-model concurrency cap and wait queue are both full.
    #[error("Model {model_id} is overloaded, try again later")]
    Overloaded {
        /// The model identifier.
        model_id: String,
    },

    /// The client cancelled the request.
    #[error("Request cancelled by client")]
    Cancelled,

    /// Operation timed out.
    #[error("Operation timed out after {duration:?}")]
    Timeout {
        /// Duration before timeout.
        duration: Duration,
    },

    /// Opaque native runtime failure, surfaced verbatim.
    #[error("{backend} runtime error: {message}")]
    Adapter {
        /// Backend name (ggml, onnx).
        backend: String,
        /// Error message from the runtime.
        message: String,
    },

    /// Malformed or out-of-range request.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Description of the request error.
        message: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error (unexpected state).
    #[error("Internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },
}

impl Error {
    /// Returns `true` if this error is scoped to a single request and the
    /// process can keep serving others.
    #[must_use]
    pub fn is_request_scoped(&self) -> bool {
        matches!(
            self,
            Self::ModalityMismatch { .. }
                | Self::UnsupportedCapability { .. }
                | Self::UnsupportedSchema { .. }
                | Self::SchemaUnsatisfiable { .. }
                | Self::Overloaded { .. }
                | Self::Cancelled
                | Self::Timeout { .. }
                | Self::InvalidRequest { .. }
        )
    }

    /// Returns `true` if retrying the same request later might succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Overloaded { .. } | Self::Timeout { .. })
    }

    /// Short machine-readable category name for diagnostics and wire errors.
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            Self::ModelNotFound { .. } => "model_not_found",
            Self::ModelLoad { .. } => "model_load_error",
            Self::UnsupportedCapability { .. } => "unsupported_capability",
            Self::ModalityMismatch { .. } => "modality_mismatch",
            Self::UnsupportedSchema { .. } => "unsupported_schema",
            Self::SchemaUnsatisfiable { .. } => "schema_unsatisfiable",
            Self::Overloaded { .. } => "overloaded",
            Self::Cancelled => "cancelled",
            Self::Timeout { .. } => "timeout",
            Self::Adapter { .. } => "adapter_error",
            Self::InvalidRequest { .. } => "invalid_request",
            Self::Io(_) => "io_error",
            Self::Serialization(_) => "serialization_error",
            Self::Internal { .. } => "internal_error",
        }
    }

    /// Creates a model load error.
    #[must_use]
    pub fn model_load(model_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ModelLoad {
            model_id: model_id.into(),
            message: message.into(),
        }
    }

    /// Creates an adapter error for the given backend.
    #[must_use]
    pub fn adapter(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Adapter {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid request error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Creates an unsupported schema error.
    #[must_use]
    pub fn unsupported_schema(message: impl Into<String>) -> Self {
        Self::UnsupportedSchema {
            message: message.into(),
        }
    }

    /// Creates an internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_scoped_errors_do_not_include_native_failures() {
        assert!(Error::Cancelled.is_request_scoped());
        assert!(Error::invalid_request("bad").is_request_scoped());
        assert!(!Error::model_load("m", "boom").is_request_scoped());
        assert!(!Error::adapter("ggml", "segfault").is_request_scoped());
    }

    #[test]
    fn categories_are_stable() {
        assert_eq!(
            Error::Overloaded {
                model_id: "m".into()
            }
            .category(),
            "overloaded"
        );
        assert_eq!(Error::unsupported_schema("$ref").category(), "unsupported_schema");
    }
}
