//! Deterministic in-process mock of the native-runtime boundary.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use janus_core::{
    BackendKind, Error, GenerationRequest, ModelDescriptor, Result,
};
use janus_gateway::{ModelRegistry, RegistryConfig, Router};
use janus_runtime::{ModelHandle, NativeRuntime, NativeStream, TokenEvent, TokenMask};

/// Scripted behavior for mock streams.
#[derive(Clone, Default)]
pub struct MockBehavior {
    /// Tokens served by `next_token`.
    pub tokens: Vec<String>,
    /// Replacement script activated by the first `resample` call.
    pub alternates: Vec<String>,
    /// Delay before every token pull.
    pub token_delay: Option<Duration>,
    /// Delay inside `load`.
    pub load_delay: Option<Duration>,
    /// Fail every `load` call.
    pub fail_load: bool,
    /// Advertise a masking hook.
    pub masking: bool,
}

impl MockBehavior {
    pub fn tokens(tokens: &[&str]) -> Self {
        Self {
            tokens: tokens.iter().map(ToString::to_string).collect(),
            ..Self::default()
        }
    }

    pub fn with_alternates(mut self, alternates: &[&str]) -> Self {
        self.alternates = alternates.iter().map(ToString::to_string).collect();
        self
    }
}

pub struct MockRuntime {
    behavior: MockBehavior,
    pub load_calls: Arc<AtomicUsize>,
    pub pulls: Arc<AtomicUsize>,
}

impl MockRuntime {
    pub fn new(behavior: MockBehavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            load_calls: Arc::new(AtomicUsize::new(0)),
            pulls: Arc::new(AtomicUsize::new(0)),
        })
    }
}

#[async_trait]
impl NativeRuntime for MockRuntime {
    fn backend(&self) -> BackendKind {
        BackendKind::Ggml
    }

    async fn load(&self, descriptor: &ModelDescriptor) -> Result<Arc<dyn ModelHandle>> {
        if let Some(delay) = self.behavior.load_delay {
            tokio::time::sleep(delay).await;
        }
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        if self.behavior.fail_load {
            return Err(Error::model_load(descriptor.id.as_str(), "mock load failure"));
        }
        Ok(Arc::new(MockHandle {
            descriptor: descriptor.clone(),
            behavior: self.behavior.clone(),
            pulls: Arc::clone(&self.pulls),
        }))
    }
}

pub struct MockHandle {
    descriptor: ModelDescriptor,
    behavior: MockBehavior,
    pulls: Arc<AtomicUsize>,
}

#[async_trait]
impl ModelHandle for MockHandle {
    fn descriptor(&self) -> &ModelDescriptor {
        &self.descriptor
    }

    async fn stream_generate(&self, _request: &GenerationRequest) -> Result<Box<dyn NativeStream>> {
        Ok(Box::new(MockStream {
            active: self.behavior.tokens.clone().into(),
            alternates: self.behavior.alternates.clone().into(),
            swapped: false,
            token_delay: self.behavior.token_delay,
            masking: self.behavior.masking,
            mask: None,
            pulls: Arc::clone(&self.pulls),
            cancelled: AtomicBool::new(false),
        }))
    }
}

pub struct MockStream {
    active: VecDeque<String>,
    alternates: VecDeque<String>,
    swapped: bool,
    token_delay: Option<Duration>,
    masking: bool,
    mask: Option<TokenMask>,
    pulls: Arc<AtomicUsize>,
    cancelled: AtomicBool,
}

#[async_trait]
impl NativeStream for MockStream {
    async fn next_token(&mut self) -> Result<Option<TokenEvent>> {
        if self.cancelled.load(Ordering::SeqCst) {
            return Ok(None);
        }
        if let Some(delay) = self.token_delay {
            tokio::time::sleep(delay).await;
        }
        self.pulls.fetch_add(1, Ordering::SeqCst);

        // A masking-capable backend drops masked-out candidates natively.
        if let Some(mask) = &self.mask {
            while let Some(candidate) = self.active.front() {
                if mask(candidate) {
                    break;
                }
                self.active.pop_front();
            }
        }

        Ok(self.active.pop_front().map(|text| TokenEvent { text }))
    }

    async fn resample(&mut self, _accepted: &str) -> Result<Option<TokenEvent>> {
        if !self.swapped {
            self.active = std::mem::take(&mut self.alternates);
            self.swapped = true;
        }
        self.pulls.fetch_add(1, Ordering::SeqCst);
        Ok(self.active.pop_front().map(|text| TokenEvent { text }))
    }

    fn supports_masking(&self) -> bool {
        self.masking
    }

    fn set_mask(&mut self, mask: Option<TokenMask>) {
        self.mask = mask;
    }

    async fn cancel(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    fn prompt_tokens(&self) -> u32 {
        3
    }
}

/// Builds a router over one mock-backed text model named `gemma`.
pub fn router_with(behavior: MockBehavior, config: RegistryConfig) -> (Router, Arc<MockRuntime>) {
    let runtime = MockRuntime::new(behavior);
    let mut registry = ModelRegistry::new(config);
    registry.register_runtime(runtime.clone());
    let registry = Arc::new(registry);
    registry.register(ModelDescriptor::new(
        "gemma",
        BackendKind::Ggml,
        janus_core::Modality::Text,
        janus_core::ModelSource::local("/unused"),
    ));
    (Router::new(registry), runtime)
}
