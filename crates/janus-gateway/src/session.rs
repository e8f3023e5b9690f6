//! The streaming session manager.
//!
//! One `GenerationSession` per in-flight request. The session owns the
//! native token stream and its admission permit, runs a strictly sequential
//! token loop, applies the constraint automaton, matches stop sequences,
//! enforces the deadline, and emits protocol chunks in strict order.
//! Non-streaming callers drive the identical loop through
//! [`GenerationSession::collect`], so both delivery modes share one
//! correctness path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use janus_core::{
    Error, FinishReason, GenerationRequest, GenerationResponse, ModelId, RequestId, Result,
    StreamChunk, TokenStream, Usage,
};
use janus_runtime::NativeStream;
use janus_schema::{ConstraintAutomaton, StateId, Step};
use tokio::sync::OwnedSemaphorePermit;
use tokio::time::Instant;

/// Session manager policy knobs.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Rejected samples tolerated per generation step before the session
    /// fails with `SchemaUnsatisfiable`.
    pub max_resample_attempts: u32,
    /// Timeout applied when the request does not carry one.
    pub default_timeout: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_resample_attempts: 8,
            default_timeout: None,
        }
    }
}

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Created, no token pulled yet.
    Pending,
    /// Token loop running.
    Active,
    /// Terminal: finished normally (stop, length, schema, timeout).
    Completed,
    /// Terminal: client cancelled or disconnected.
    Cancelled,
    /// Terminal: adapter or constraint failure.
    Failed,
}

impl SessionStatus {
    /// Returns `true` for terminal states.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

/// Handle for cancelling a session from outside the token loop.
#[derive(Clone)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    /// Requests cancellation; the loop observes it within one token step.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

struct Constraint {
    automaton: Arc<ConstraintAutomaton>,
    state: StateId,
}

/// The live state of one in-flight generation request.
pub struct GenerationSession {
    request_id: RequestId,
    model: ModelId,
    stream: Box<dyn NativeStream>,
    constraint: Option<Constraint>,
    stop_sequences: Vec<String>,
    max_stop_len: usize,
    max_tokens: u32,
    deadline: Option<Instant>,
    status: SessionStatus,
    /// Text already delivered to the consumer.
    emitted: String,
    /// Accepted text held back while a stop sequence might still complete.
    holdback: String,
    tokens_out: u32,
    resamples_left: u32,
    masking: bool,
    cancel_flag: Arc<AtomicBool>,
    error_slot: Option<Error>,
    _permit: Option<OwnedSemaphorePermit>,
}

impl std::fmt::Debug for GenerationSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationSession")
            .field("request_id", &self.request_id)
            .field("model", &self.model)
            .field("stop_sequences", &self.stop_sequences)
            .field("max_stop_len", &self.max_stop_len)
            .field("max_tokens", &self.max_tokens)
            .field("status", &self.status)
            .field("tokens_out", &self.tokens_out)
            .field("resamples_left", &self.resamples_left)
            .field("masking", &self.masking)
            .field("error_slot", &self.error_slot)
            .finish_non_exhaustive()
    }
}

impl GenerationSession {
    /// Creates a session over an already-opened native stream.
    #[must_use]
    pub fn new(
        request: &GenerationRequest,
        stream: Box<dyn NativeStream>,
        automaton: Option<Arc<ConstraintAutomaton>>,
        permit: Option<OwnedSemaphorePermit>,
        config: &SessionConfig,
    ) -> Self {
        let timeout = request
            .timeout_ms
            .map(Duration::from_millis)
            .or(config.default_timeout);
        let masking = stream.supports_masking() && automaton.is_some();
        let stop_sequences = request.sampling.stop_sequences.clone();
        let max_stop_len = stop_sequences.iter().map(String::len).max().unwrap_or(0);

        Self {
            request_id: request.request_id.clone(),
            model: request.model.clone(),
            stream,
            constraint: automaton.map(|automaton| {
                let state = automaton.start_state();
                Constraint { automaton, state }
            }),
            stop_sequences,
            max_stop_len,
            max_tokens: request.sampling.max_tokens,
            deadline: timeout.map(|t| Instant::now() + t),
            status: SessionStatus::Pending,
            emitted: String::new(),
            holdback: String::new(),
            tokens_out: 0,
            resamples_left: config.max_resample_attempts,
            masking,
            cancel_flag: Arc::new(AtomicBool::new(false)),
            error_slot: None,
            _permit: permit,
        }
    }

    /// Returns a handle that cancels this session.
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(Arc::clone(&self.cancel_flag))
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    fn usage(&self) -> Usage {
        Usage::new(self.stream.prompt_tokens(), self.tokens_out)
    }

    async fn finish(&mut self, reason: FinishReason) -> StreamChunk {
        self.stream.cancel().await;
        self.status = match reason {
            FinishReason::Cancelled => SessionStatus::Cancelled,
            FinishReason::Error => SessionStatus::Failed,
            _ => SessionStatus::Completed,
        };
        let trailing = std::mem::take(&mut self.holdback);
        self.emitted.push_str(&trailing);
        tracing::debug!(
            request_id = %self.request_id,
            reason = reason.as_str(),
            tokens = self.tokens_out,
            "Session finished"
        );
        StreamChunk::finish(
            self.request_id.clone(),
            self.model.clone(),
            Some(trailing),
            reason,
            self.usage(),
        )
    }

    async fn fail(&mut self, error: Error) -> StreamChunk {
        self.stream.cancel().await;
        self.status = SessionStatus::Failed;
        tracing::warn!(request_id = %self.request_id, error = %error, "Session failed");
        let chunk = StreamChunk::error(
            self.request_id.clone(),
            self.model.clone(),
            error.to_string(),
            self.usage(),
        );
        self.error_slot = Some(error);
        chunk
    }

    /// Flushes holdback up to the last position that cannot be a prefix of
    /// a stop sequence.
    fn emit_safe_delta(&mut self) -> Option<String> {
        if self.holdback.is_empty() {
            return None;
        }
        let keep = if self.stop_sequences.is_empty() {
            0
        } else {
            self.max_stop_len.saturating_sub(1)
        };
        if self.holdback.len() <= keep {
            return None;
        }
        let mut cut = self.holdback.len() - keep;
        while cut > 0 && !self.holdback.is_char_boundary(cut) {
            cut -= 1;
        }
        if cut == 0 {
            return None;
        }
        let delta: String = self.holdback.drain(..cut).collect();
        self.emitted.push_str(&delta);
        Some(delta)
    }

    /// Finds the earliest stop-sequence match in the holdback window.
    fn find_stop(&self) -> Option<usize> {
        self.stop_sequences
            .iter()
            .filter_map(|stop| self.holdback.find(stop.as_str()))
            .min()
    }

    /// Advances the session by one emission.
    ///
    /// Returns `None` once the terminal chunk has been delivered. The loop
    /// observes cancellation and the deadline between every token pull, so
    /// both propagate within one generation step.
    pub async fn next_chunk(&mut self) -> Option<StreamChunk> {
        if self.status.is_terminal() {
            return None;
        }
        self.status = SessionStatus::Active;

        loop {
            if self.cancel_flag.load(Ordering::SeqCst) {
                return Some(self.finish(FinishReason::Cancelled).await);
            }

            let remaining = match self.deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Some(self.finish(FinishReason::Timeout).await);
                    }
                    Some(deadline - now)
                }
                None => None,
            };

            if self.masking {
                if let Some(constraint) = &self.constraint {
                    let automaton = Arc::clone(&constraint.automaton);
                    let state = constraint.state;
                    self.stream
                        .set_mask(Some(Arc::new(move |token: &str| automaton.admits(state, token))));
                }
            }

            let pulled = match remaining {
                Some(budget) => match tokio::time::timeout(budget, self.stream.next_token()).await {
                    Ok(result) => result,
                    Err(_) => return Some(self.finish(FinishReason::Timeout).await),
                },
                None => self.stream.next_token().await,
            };

            let event = match pulled {
                Ok(event) => event,
                Err(e) => return Some(self.fail(e).await),
            };

            let Some(event) = event else {
                // Natural end-of-sequence.
                if let Some(constraint) = &self.constraint {
                    if !constraint.automaton.is_accepting(constraint.state) {
                        let err = Error::SchemaUnsatisfiable {
                            message: "generation ended before the output satisfied the schema"
                                .to_string(),
                        };
                        return Some(self.fail(err).await);
                    }
                    return Some(self.finish(FinishReason::SchemaComplete).await);
                }
                return Some(self.finish(FinishReason::Stop).await);
            };

            let mut text = event.text;
            let mut completed_schema = false;

            if let Some(constraint) = self.constraint.as_mut() {
                let accepted = format!("{}{}", self.emitted, self.holdback);
                let outcome = apply_constraint(
                    constraint,
                    &mut self.stream,
                    &mut self.resamples_left,
                    &accepted,
                    &mut text,
                )
                .await;
                match outcome {
                    Ok(ConstraintOutcome::Advanced) => {}
                    Ok(ConstraintOutcome::Complete) => completed_schema = true,
                    Err(e) => return Some(self.fail(e).await),
                }
            }

            self.holdback.push_str(&text);
            self.tokens_out += 1;

            if completed_schema {
                return Some(self.finish(FinishReason::SchemaComplete).await);
            }

            if let Some(stop_idx) = self.find_stop() {
                self.holdback.truncate(stop_idx);
                return Some(self.finish(FinishReason::Stop).await);
            }

            if self.tokens_out >= self.max_tokens {
                return Some(self.finish(FinishReason::Length).await);
            }

            if let Some(delta) = self.emit_safe_delta() {
                return Some(StreamChunk::delta(
                    self.request_id.clone(),
                    self.model.clone(),
                    delta,
                ));
            }
        }
    }

    /// Drives the whole session and buffers it into a single response.
    ///
    /// # Errors
    ///
    /// Returns the session's error for failed sessions, and
    /// [`Error::Cancelled`] for cancelled ones.
    pub async fn collect(mut self) -> Result<GenerationResponse> {
        let mut text = String::new();
        let mut finish = FinishReason::Stop;
        let mut usage = Usage::default();

        while let Some(chunk) = self.next_chunk().await {
            if let Some(delta) = &chunk.delta {
                text.push_str(delta);
            }
            if let Some(chunk_usage) = chunk.usage {
                usage = chunk_usage;
            }
            if let Some(reason) = chunk.finish_reason {
                finish = reason;
            }
        }

        match self.status {
            SessionStatus::Failed => Err(self
                .error_slot
                .take()
                .unwrap_or_else(|| Error::internal("session failed without a recorded error"))),
            SessionStatus::Cancelled => Err(Error::Cancelled),
            _ => Ok(GenerationResponse {
                request_id: self.request_id,
                model: self.model,
                text,
                finish_reason: finish,
                usage,
            }),
        }
    }

    /// Converts the session into a chunk stream for streaming delivery.
    ///
    /// Dropping the stream drops the session and with it the native stream,
    /// which stops native computation within one token step.
    #[must_use]
    pub fn into_stream(mut self) -> TokenStream {
        TokenStream::new(async_stream::stream! {
            while let Some(chunk) = self.next_chunk().await {
                let terminal = chunk.is_terminal();
                yield Ok(chunk);
                if terminal {
                    break;
                }
            }
        })
    }
}

enum ConstraintOutcome {
    Advanced,
    Complete,
}

/// Applies the constraint automaton to the pulled text, resampling on
/// rejection. Mutates `text` in place (replacement draw or completion
/// truncation) and advances the automaton state. `accepted` is the text
/// accepted so far, used as the restart prefix for resampling.
async fn apply_constraint(
    constraint: &mut Constraint,
    stream: &mut Box<dyn NativeStream>,
    resamples_left: &mut u32,
    accepted: &str,
    text: &mut String,
) -> Result<ConstraintOutcome> {
    loop {
        match constraint.automaton.advance(constraint.state, text) {
            Step::Advanced(state) => {
                constraint.state = state;
                return Ok(ConstraintOutcome::Advanced);
            }
            Step::Complete { state, consumed } => {
                constraint.state = state;
                text.truncate(consumed);
                return Ok(ConstraintOutcome::Complete);
            }
            Step::Rejected => {
                if *resamples_left == 0 {
                    return Err(Error::SchemaUnsatisfiable {
                        message: format!(
                            "no schema-valid continuation after {:?} (resample budget exhausted)",
                            tail(accepted)
                        ),
                    });
                }
                *resamples_left -= 1;
                match stream.resample(accepted).await? {
                    Some(event) => *text = event.text,
                    None => {
                        // The redraw ended the sequence; fall back to the
                        // end-of-stream acceptance rule.
                        if constraint.automaton.is_accepting(constraint.state) {
                            text.clear();
                            return Ok(ConstraintOutcome::Complete);
                        }
                        return Err(Error::SchemaUnsatisfiable {
                            message: "generation ended before the output satisfied the schema"
                                .to_string(),
                        });
                    }
                }
            }
        }
    }
}

/// Last few characters of the accepted text, for error context.
fn tail(accepted: &str) -> &str {
    let start = accepted
        .char_indices()
        .rev()
        .nth(24)
        .map_or(0, |(idx, _)| idx);
    &accepted[start..]
}
