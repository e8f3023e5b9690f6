//! Per-model admission control.
//!
//! Each descriptor carries a concurrency cap (a model's native context is
//! not safe for concurrent generation steps) and a bounded wait queue.
//! When both are full, new requests fail fast with `Overloaded` instead of
//! queuing without bound.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use janus_core::{Error, Result};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Bounded admission gate for one model.
pub struct AdmissionGate {
    permits: Arc<Semaphore>,
    max_concurrent: usize,
    waiting: AtomicUsize,
    max_waiting: usize,
}

impl AdmissionGate {
    /// Creates a gate allowing `max_concurrent` active sessions and at most
    /// `max_waiting` queued ones.
    #[must_use]
    pub fn new(max_concurrent: usize, max_waiting: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            max_concurrent: max_concurrent.max(1),
            waiting: AtomicUsize::new(0),
            max_waiting,
        }
    }

    /// Admits a session, waiting in the bounded queue if the cap is reached.
    ///
    /// The returned permit must be held for the session's whole lifetime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Overloaded`] when the queue is full.
    pub async fn admit(&self, model_id: &str) -> Result<OwnedSemaphorePermit> {
        if let Ok(permit) = Arc::clone(&self.permits).try_acquire_owned() {
            return Ok(permit);
        }

        let joined = self
            .waiting
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |waiting| {
                (waiting < self.max_waiting).then_some(waiting + 1)
            });
        if joined.is_err() {
            tracing::warn!(model = model_id, "Admission queue full, rejecting request");
            return Err(Error::Overloaded {
                model_id: model_id.to_string(),
            });
        }

        let result = Arc::clone(&self.permits).acquire_owned().await;
        self.waiting.fetch_sub(1, Ordering::SeqCst);
        result.map_err(|_| Error::internal("admission gate closed"))
    }

    /// Number of sessions currently waiting for a permit.
    #[must_use]
    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }

    /// Number of sessions that could start immediately.
    #[must_use]
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Number of sessions currently holding a permit.
    #[must_use]
    pub fn active(&self) -> usize {
        self.max_concurrent - self.permits.available_permits()
    }
}
