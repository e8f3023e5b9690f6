//! Model descriptors: registry entries identifying a loadable model.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::types::{BackendKind, Modality, ModelId};

/// Source location for a model's weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModelSource {
    /// HuggingFace Hub model, resolved through the local HF cache.
    HuggingFace {
        /// Repository ID (e.g., "gemma-2b-gguf").
        repo_id: String,
        /// Optional revision (branch, tag, or commit).
        revision: Option<String>,
    },
    /// Local filesystem path to the model file.
    LocalPath {
        /// Path to the model file.
        path: PathBuf,
    },
}

impl ModelSource {
    /// Creates a HuggingFace source.
    #[must_use]
    pub fn huggingface(repo_id: impl Into<String>) -> Self {
        Self::HuggingFace {
            repo_id: repo_id.into(),
            revision: None,
        }
    }

    /// Creates a local path source.
    #[must_use]
    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self::LocalPath { path: path.into() }
    }
}

/// A registry entry identifying a loadable model and how to run it.
///
/// At most one live native handle exists per descriptor; the registry
/// materializes it lazily and caches it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Unique model identifier.
    pub id: ModelId,
    /// Which native runtime executes this model.
    pub backend: BackendKind,
    /// What the model produces.
    pub modality: Modality,
    /// Where the weights live.
    pub source: ModelSource,
}

impl ModelDescriptor {
    /// Creates a new descriptor.
    #[must_use]
    pub fn new(
        id: impl Into<ModelId>,
        backend: BackendKind,
        modality: Modality,
        source: ModelSource,
    ) -> Self {
        Self {
            id: id.into(),
            backend,
            modality,
            source,
        }
    }

    /// Creates a descriptor whose weights are resolved from the HF cache
    /// using the model id as repository id.
    #[must_use]
    pub fn hub(id: impl Into<ModelId>, backend: BackendKind, modality: Modality) -> Self {
        let id = id.into();
        let source = ModelSource::huggingface(id.as_str());
        Self {
            id,
            backend,
            modality,
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hub_descriptor_uses_id_as_repo() {
        let d = ModelDescriptor::hub("gemma", BackendKind::Ggml, Modality::Text);
        match &d.source {
            ModelSource::HuggingFace { repo_id, .. } => assert_eq!(repo_id, "gemma"),
            ModelSource::LocalPath { .. } => panic!("expected hub source"),
        }
    }

    #[test]
    fn source_round_trips_through_serde() {
        let s = ModelSource::local("/models/gemma.gguf");
        let json = serde_json::to_string(&s).unwrap();
        assert!(json.contains("local_path"));
        let back: ModelSource = serde_json::from_str(&json).unwrap();
        matches!(back, ModelSource::LocalPath { .. });
    }
}
