//! Model file resolution and on-disk format detection.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use janus_core::{BackendKind, Error, ModelDescriptor, ModelSource, Result};

/// On-disk weight formats Janus recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFormat {
    /// GGUF container (GGML family).
    Gguf,
    /// ONNX protobuf graph.
    Onnx,
}

impl ModelFormat {
    /// The format a backend expects.
    #[must_use]
    pub fn for_backend(backend: BackendKind) -> Self {
        match backend {
            BackendKind::Ggml => Self::Gguf,
            BackendKind::Onnx => Self::Onnx,
        }
    }

    /// File extension for this format.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Gguf => "gguf",
            Self::Onnx => "onnx",
        }
    }
}

/// Resolves a descriptor's weights to a local file and verifies the format
/// matches the declared backend.
///
/// # Errors
///
/// Returns [`Error::ModelLoad`] when the file cannot be found or its format
/// does not match the backend.
pub fn resolve_model_path(descriptor: &ModelDescriptor) -> Result<PathBuf> {
    let expected = ModelFormat::for_backend(descriptor.backend);

    let path = match &descriptor.source {
        ModelSource::LocalPath { path } => {
            if !path.is_file() {
                return Err(Error::model_load(
                    descriptor.id.as_str(),
                    format!("model file not found: {}", path.display()),
                ));
            }
            path.clone()
        }
        ModelSource::HuggingFace { repo_id, revision } => {
            find_in_hf_cache(descriptor, repo_id, revision.as_deref(), expected)?
        }
    };

    verify_format(descriptor, &path, expected)?;
    Ok(path)
}

/// Scans the local HuggingFace hub cache for a weight file of the expected
/// format. Models are fetched into this cache by `janus pull`.
fn find_in_hf_cache(
    descriptor: &ModelDescriptor,
    repo_id: &str,
    revision: Option<&str>,
    format: ModelFormat,
) -> Result<PathBuf> {
    let cache_root = dirs::cache_dir()
        .map(|p| p.join("huggingface").join("hub"))
        .ok_or_else(|| Error::model_load(descriptor.id.as_str(), "no cache directory available"))?;

    let repo_dir = cache_root.join(format!("models--{}", repo_id.replace('/', "--")));
    let snapshots = repo_dir.join("snapshots");
    if !snapshots.is_dir() {
        return Err(Error::model_load(
            descriptor.id.as_str(),
            format!(
                "model {repo_id} is not cached; run `janus pull {repo_id}` first"
            ),
        ));
    }

    let mut candidates: Vec<PathBuf> = Vec::new();
    for snapshot in std::fs::read_dir(&snapshots)?.flatten() {
        if revision.is_some_and(|rev| snapshot.file_name().to_string_lossy() != *rev) {
            continue;
        }
        collect_with_extension(&snapshot.path(), format.extension(), &mut candidates)?;
    }
    candidates.sort();

    candidates.into_iter().next().ok_or_else(|| {
        Error::model_load(
            descriptor.id.as_str(),
            format!(
                "no .{} file found in cached snapshots of {repo_id}",
                format.extension()
            ),
        )
    })
}

fn collect_with_extension(dir: &Path, extension: &str, out: &mut Vec<PathBuf>) -> Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }
    for entry in std::fs::read_dir(dir)?.flatten() {
        let path = entry.path();
        if path.is_file() && path.extension().is_some_and(|e| e == extension) {
            out.push(path);
        }
    }
    Ok(())
}

/// Verifies the file's magic bytes match the expected format.
fn verify_format(descriptor: &ModelDescriptor, path: &Path, expected: ModelFormat) -> Result<()> {
    match expected {
        ModelFormat::Gguf => {
            let mut header = [0u8; 8];
            let mut file = File::open(path)?;
            file.read_exact(&mut header).map_err(|_| {
                Error::model_load(
                    descriptor.id.as_str(),
                    format!("{} is too short to be a GGUF file", path.display()),
                )
            })?;
            if &header[..4] != b"GGUF" {
                return Err(Error::model_load(
                    descriptor.id.as_str(),
                    format!("{} is not a GGUF file (bad magic)", path.display()),
                ));
            }
            let version = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
            if !(1..=3).contains(&version) {
                return Err(Error::model_load(
                    descriptor.id.as_str(),
                    format!("unsupported GGUF version {version}"),
                ));
            }
        }
        ModelFormat::Onnx => {
            if path.extension().is_none_or(|e| e != "onnx") {
                return Err(Error::model_load(
                    descriptor.id.as_str(),
                    format!("{} does not look like an ONNX graph", path.display()),
                ));
            }
            if std::fs::metadata(path)?.len() == 0 {
                return Err(Error::model_load(
                    descriptor.id.as_str(),
                    format!("{} is empty", path.display()),
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use janus_core::Modality;
    use std::io::Write;

    fn descriptor(backend: BackendKind, path: &Path) -> ModelDescriptor {
        ModelDescriptor::new("m", backend, Modality::Text, ModelSource::local(path))
    }

    #[test]
    fn accepts_valid_gguf_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.gguf");
        let mut f = File::create(&path).unwrap();
        f.write_all(b"GGUF").unwrap();
        f.write_all(&3u32.to_le_bytes()).unwrap();

        let resolved = resolve_model_path(&descriptor(BackendKind::Ggml, &path)).unwrap();
        assert_eq!(resolved, path);
    }

    #[test]
    fn rejects_bad_gguf_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.gguf");
        std::fs::write(&path, b"NOTGGUF0").unwrap();

        let err = resolve_model_path(&descriptor(BackendKind::Ggml, &path)).unwrap_err();
        assert_eq!(err.category(), "model_load_error");
    }

    #[test]
    fn rejects_missing_file() {
        let err =
            resolve_model_path(&descriptor(BackendKind::Ggml, Path::new("/nonexistent.gguf")))
                .unwrap_err();
        assert_eq!(err.category(), "model_load_error");
    }

    #[test]
    fn onnx_requires_extension_and_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.onnx");
        std::fs::write(&path, [0x08, 0x07]).unwrap();
        resolve_model_path(&descriptor(BackendKind::Onnx, &path)).unwrap();

        let empty = dir.path().join("empty.onnx");
        std::fs::write(&empty, []).unwrap();
        let err = resolve_model_path(&descriptor(BackendKind::Onnx, &empty)).unwrap_err();
        assert_eq!(err.category(), "model_load_error");
    }
}
