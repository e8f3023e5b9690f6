//! The boundary between Janus and the native runtimes.
//!
//! Everything below this boundary is an external collaborator: a runtime
//! loads descriptors into handles, and a handle's token stream is a finite,
//! single-pass, cancelable sequence.

use std::sync::Arc;

use async_trait::async_trait;
use janus_core::{BackendKind, ModelDescriptor, Result};

use crate::handle::ModelHandle;

/// One unit of streamed native output.
#[derive(Debug, Clone)]
pub struct TokenEvent {
    /// Decoded text for this token (may span several model tokens).
    pub text: String,
}

/// Predicate installed into masking-capable streams: returns `true` when a
/// candidate token keeps the output schema-valid.
pub type TokenMask = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// A live native token stream.
///
/// Finite and single-pass: after `next_token` returns `Ok(None)` the stream
/// is exhausted. Cancelling (or dropping) the stream stops native
/// computation within one token-generation step.
#[async_trait]
pub trait NativeStream: Send {
    /// Pulls the next token, or `None` at end-of-sequence.
    async fn next_token(&mut self) -> Result<Option<TokenEvent>>;

    /// Re-draws the last token. `accepted` is the full text the caller has
    /// accepted so far; runtimes without a native resample hook restart
    /// generation from that prefix with a perturbed seed.
    async fn resample(&mut self, accepted: &str) -> Result<Option<TokenEvent>>;

    /// Whether the runtime can mask the next-token distribution in place.
    fn supports_masking(&self) -> bool {
        false
    }

    /// Installs or clears the token mask (masking-capable runtimes only).
    fn set_mask(&mut self, _mask: Option<TokenMask>) {}

    /// Stops the stream; no further native work happens after this returns.
    async fn cancel(&mut self);

    /// Prompt token count, once the runtime has reported it.
    fn prompt_tokens(&self) -> u32 {
        0
    }
}

/// A native runtime: loads descriptors into model handles.
#[async_trait]
pub trait NativeRuntime: Send + Sync {
    /// The backend family this runtime executes.
    fn backend(&self) -> BackendKind;

    /// Loads the descriptor, materializing a native context.
    ///
    /// # Errors
    ///
    /// Returns [`janus_core::Error::ModelLoad`] when native initialization
    /// fails; the caller latches the failure for the descriptor until an
    /// explicit retry.
    async fn load(&self, descriptor: &ModelDescriptor) -> Result<Arc<dyn ModelHandle>>;
}
