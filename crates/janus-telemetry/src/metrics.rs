//! Process-local metrics for gateway activity.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for gateway activity, cheap enough to update on every request.
#[derive(Default)]
pub struct GatewayMetrics {
    /// Sessions started.
    pub sessions_started: AtomicU64,
    /// Tokens streamed to clients.
    pub tokens_generated: AtomicU64,
    /// Requests that ended in an error.
    pub errors: AtomicU64,
    /// Requests rejected with `Overloaded`.
    pub overload_rejections: AtomicU64,
}

impl GatewayMetrics {
    /// Records a started session.
    pub fn record_session(&self) {
        self.sessions_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Records generated tokens.
    pub fn record_tokens(&self, count: u32) {
        self.tokens_generated
            .fetch_add(u64::from(count), Ordering::Relaxed);
    }

    /// Records a request error, tracking overload rejections separately.
    pub fn record_error(&self, overloaded: bool) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        if overloaded {
            self.overload_rejections.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Sessions started since process start.
    #[must_use]
    pub fn sessions(&self) -> u64 {
        self.sessions_started.load(Ordering::Relaxed)
    }

    /// Tokens generated since process start.
    #[must_use]
    pub fn tokens(&self) -> u64 {
        self.tokens_generated.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let metrics = GatewayMetrics::default();
        metrics.record_session();
        metrics.record_tokens(12);
        metrics.record_tokens(8);
        metrics.record_error(true);

        assert_eq!(metrics.sessions(), 1);
        assert_eq!(metrics.tokens(), 20);
        assert_eq!(metrics.errors.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.overload_rejections.load(Ordering::Relaxed), 1);
    }
}
