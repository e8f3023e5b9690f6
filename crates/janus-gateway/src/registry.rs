//! Model registry: descriptors, cached handles, serialized first loads.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use janus_core::{BackendKind, Error, Modality, ModelDescriptor, Result};
use janus_runtime::{ModelHandle, NativeRuntime};
use tokio::sync::Mutex;

use crate::admission::AdmissionGate;

/// Registry configuration.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Concurrent sessions allowed per model.
    pub max_concurrent_per_model: usize,
    /// Sessions allowed to wait per model before `Overloaded`.
    pub max_queue_per_model: usize,
    /// Register unknown models on demand from request parameters.
    pub allow_dynamic: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_concurrent_per_model: 1,
            max_queue_per_model: 32,
            allow_dynamic: true,
        }
    }
}

/// Lifecycle of a descriptor's native handle.
enum LoadSlot {
    /// Never loaded, or explicitly reset.
    Empty,
    /// Live handle; at most one exists per descriptor.
    Ready(Arc<dyn ModelHandle>),
    /// Native init failed; latched until an explicit reload.
    Failed(String),
}

/// One registered model and its lifecycle state.
pub struct ModelEntry {
    /// The descriptor this entry was registered with.
    pub descriptor: ModelDescriptor,
    /// Admission gate for this model.
    pub gate: AdmissionGate,
    slot: Mutex<LoadSlot>,
    load_attempts: AtomicU64,
}

impl ModelEntry {
    fn new(descriptor: ModelDescriptor, config: &RegistryConfig) -> Self {
        Self {
            descriptor,
            gate: AdmissionGate::new(config.max_concurrent_per_model, config.max_queue_per_model),
            slot: Mutex::new(LoadSlot::Empty),
            load_attempts: AtomicU64::new(0),
        }
    }

    /// How many native load calls this entry has made.
    #[must_use]
    pub fn load_attempts(&self) -> u64 {
        self.load_attempts.load(Ordering::SeqCst)
    }

    /// Returns `true` if a live handle is cached.
    pub async fn is_loaded(&self) -> bool {
        matches!(*self.slot.lock().await, LoadSlot::Ready(_))
    }
}

/// Process-wide registry of model descriptors.
///
/// Owned by the server (or CLI invocation) for its lifetime and injected
/// into the router; not ambient global state.
pub struct ModelRegistry {
    entries: DashMap<String, Arc<ModelEntry>>,
    runtimes: HashMap<BackendKind, Arc<dyn NativeRuntime>>,
    config: RegistryConfig,
}

impl ModelRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            entries: DashMap::new(),
            runtimes: HashMap::new(),
            config,
        }
    }

    /// Registers the native runtime serving a backend kind.
    pub fn register_runtime(&mut self, runtime: Arc<dyn NativeRuntime>) {
        self.runtimes.insert(runtime.backend(), runtime);
    }

    /// Registers a descriptor, returning the (possibly pre-existing) entry.
    pub fn register(&self, descriptor: ModelDescriptor) -> Arc<ModelEntry> {
        let key = descriptor.id.to_string();
        let entry = self
            .entries
            .entry(key)
            .or_insert_with(|| Arc::new(ModelEntry::new(descriptor, &self.config)));
        Arc::clone(&entry)
    }

    /// Gets an entry by model id.
    #[must_use]
    pub fn get(&self, model_id: &str) -> Option<Arc<ModelEntry>> {
        self.entries.get(model_id).map(|e| Arc::clone(&e))
    }

    /// Resolves a model id to an entry, registering it dynamically from
    /// request parameters when allowed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ModelNotFound`] for unknown models when dynamic
    /// registration is off, and [`Error::InvalidRequest`] when the declared
    /// backend contradicts the registered descriptor.
    pub fn resolve(
        &self,
        model_id: &str,
        backend: Option<BackendKind>,
        modality: Modality,
    ) -> Result<Arc<ModelEntry>> {
        if let Some(entry) = self.get(model_id) {
            if let Some(requested) = backend {
                if requested != entry.descriptor.backend {
                    return Err(Error::invalid_request(format!(
                        "model {model_id} is registered on the {} backend, not {requested}",
                        entry.descriptor.backend
                    )));
                }
            }
            return Ok(entry);
        }

        if !self.config.allow_dynamic {
            return Err(Error::ModelNotFound {
                model_id: model_id.to_string(),
            });
        }

        let descriptor = ModelDescriptor::hub(
            model_id,
            backend.unwrap_or(BackendKind::Ggml),
            modality,
        );
        tracing::info!(model = model_id, backend = %descriptor.backend, modality = %modality, "Registering model on demand");
        Ok(self.register(descriptor))
    }

    /// Returns the cached handle for an entry, loading it on first use.
    ///
    /// Concurrent first loads are serialized on the entry's slot lock, so
    /// exactly one native load happens; the others wait and share the
    /// resulting handle. A failed load latches until [`Self::reload`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::ModelLoad`] on (possibly latched) load failure.
    pub async fn handle(&self, entry: &Arc<ModelEntry>) -> Result<Arc<dyn ModelHandle>> {
        let mut slot = entry.slot.lock().await;
        match &*slot {
            LoadSlot::Ready(handle) => Ok(Arc::clone(handle)),
            LoadSlot::Failed(message) => Err(Error::model_load(
                entry.descriptor.id.as_str(),
                format!("{message} (reload to retry)"),
            )),
            LoadSlot::Empty => {
                let runtime = self.runtimes.get(&entry.descriptor.backend).ok_or_else(|| {
                    Error::internal(format!(
                        "no runtime registered for backend {}",
                        entry.descriptor.backend
                    ))
                })?;

                entry.load_attempts.fetch_add(1, Ordering::SeqCst);
                match runtime.load(&entry.descriptor).await {
                    Ok(handle) => {
                        *slot = LoadSlot::Ready(Arc::clone(&handle));
                        Ok(handle)
                    }
                    Err(e) => {
                        tracing::error!(model = %entry.descriptor.id, error = %e, "Model load failed");
                        *slot = LoadSlot::Failed(e.to_string());
                        Err(e)
                    }
                }
            }
        }
    }

    /// Unloads an entry's handle (if any) and clears a latched failure,
    /// allowing the next request to retry the native load.
    ///
    /// # Errors
    ///
    /// Returns the error from the handle's unload.
    pub async fn reload(&self, model_id: &str) -> Result<()> {
        let entry = self.get(model_id).ok_or_else(|| Error::ModelNotFound {
            model_id: model_id.to_string(),
        })?;
        let mut slot = entry.slot.lock().await;
        if let LoadSlot::Ready(handle) = &*slot {
            handle.unload().await?;
        }
        *slot = LoadSlot::Empty;
        Ok(())
    }

    /// Removes a model, releasing its native resources.
    ///
    /// # Errors
    ///
    /// Returns the error from the handle's unload.
    pub async fn unregister(&self, model_id: &str) -> Result<()> {
        if let Some((_, entry)) = self.entries.remove(model_id) {
            let slot = entry.slot.lock().await;
            if let LoadSlot::Ready(handle) = &*slot {
                handle.unload().await?;
            }
        }
        Ok(())
    }

    /// Lists all registered descriptors.
    #[must_use]
    pub fn list(&self) -> Vec<ModelDescriptor> {
        self.entries
            .iter()
            .map(|e| e.descriptor.clone())
            .collect()
    }

    /// Unloads every loaded handle (server shutdown).
    pub async fn shutdown(&self) {
        for entry in self.entries.iter() {
            let mut slot = entry.slot.lock().await;
            if let LoadSlot::Ready(handle) = &*slot {
                if let Err(e) = handle.unload().await {
                    tracing::warn!(model = %entry.descriptor.id, error = %e, "Unload failed during shutdown");
                }
            }
            *slot = LoadSlot::Empty;
        }
    }

    /// The registry configuration.
    #[must_use]
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }
}
