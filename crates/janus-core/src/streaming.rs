//! Streaming types for incremental generation output.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{FinishReason, ModelId, RequestId, Usage};

/// One incremental unit of streamed response content.
///
/// Chunks are produced in strict emission order per session and never
/// reordered. Exactly one chunk per session carries a `finish_reason`; it is
/// always the last.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Request identifier.
    pub request_id: RequestId,

    /// Model used for generation.
    pub model: ModelId,

    /// New text content, absent on pure finish chunks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta: Option<String>,

    /// Present on the terminal chunk only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,

    /// Error detail when `finish_reason` is [`FinishReason::Error`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Usage totals, present on the terminal chunk only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl StreamChunk {
    /// Creates a content chunk.
    #[must_use]
    pub fn delta(request_id: RequestId, model: ModelId, content: impl Into<String>) -> Self {
        Self {
            request_id,
            model,
            delta: Some(content.into()),
            finish_reason: None,
            error: None,
            usage: None,
        }
    }

    /// Creates a terminal chunk, optionally carrying trailing content.
    #[must_use]
    pub fn finish(
        request_id: RequestId,
        model: ModelId,
        trailing: Option<String>,
        reason: FinishReason,
        usage: Usage,
    ) -> Self {
        Self {
            request_id,
            model,
            delta: trailing.filter(|t| !t.is_empty()),
            finish_reason: Some(reason),
            error: None,
            usage: Some(usage),
        }
    }

    /// Creates a terminal error chunk. Streams must end with this rather
    /// than dropping the connection.
    #[must_use]
    pub fn error(request_id: RequestId, model: ModelId, message: impl Into<String>, usage: Usage) -> Self {
        Self {
            request_id,
            model,
            delta: None,
            finish_reason: Some(FinishReason::Error),
            error: Some(message.into()),
            usage: Some(usage),
        }
    }

    /// Returns `true` if this is the session's terminal chunk.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.finish_reason.is_some()
    }
}

/// A stream of [`StreamChunk`]s from one generation session.
pub struct TokenStream {
    inner: Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send>>,
}

impl TokenStream {
    /// Creates a new `TokenStream` from a boxed stream.
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<StreamChunk>> + Send + 'static,
    {
        Self {
            inner: Box::pin(stream),
        }
    }

    /// Creates a stream from a single chunk.
    #[must_use]
    pub fn once(chunk: StreamChunk) -> Self {
        Self::new(futures::stream::once(async move { Ok(chunk) }))
    }

    /// Collects all chunks into a vector.
    ///
    /// # Errors
    ///
    /// Returns an error if any chunk fails.
    pub async fn collect(self) -> Result<Vec<StreamChunk>> {
        use futures::StreamExt;
        let mut chunks = Vec::new();
        let mut stream = self;
        while let Some(result) = stream.next().await {
            chunks.push(result?);
        }
        Ok(chunks)
    }

    /// Collects all delta text into a single string.
    ///
    /// # Errors
    ///
    /// Returns an error if any chunk fails.
    pub async fn collect_text(self) -> Result<String> {
        let chunks = self.collect().await?;
        let mut text = String::new();
        for chunk in chunks {
            if let Some(delta) = chunk.delta {
                text.push_str(&delta);
            }
        }
        Ok(text)
    }
}

impl Stream for TokenStream {
    type Item = Result<StreamChunk>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}
