//! Session manager behavior over a deterministic mock backend.

mod common;

use std::time::Duration;

use common::{router_with, MockBehavior};
use futures::StreamExt;
use janus_core::{FinishReason, GenerationRequest, SamplingParams};
use janus_gateway::RegistryConfig;

fn text_request(prompt: &str) -> GenerationRequest {
    GenerationRequest::new("gemma", prompt)
}

#[tokio::test]
async fn streaming_yields_nonempty_deltas_then_stop() {
    let (router, _) = router_with(
        MockBehavior::tokens(&["Hello", ", ", "world", "!"]),
        RegistryConfig::default(),
    );

    let session = router
        .start_session(text_request("Hello").with_stream())
        .await
        .unwrap();
    let chunks = session.into_stream().collect().await.unwrap();

    let (terminal, content): (Vec<_>, Vec<_>) =
        chunks.iter().partition(|c| c.is_terminal());
    assert!(!content.is_empty());
    for chunk in &content {
        assert!(!chunk.delta.as_deref().unwrap_or_default().is_empty());
    }
    assert_eq!(terminal.len(), 1);
    assert_eq!(terminal[0].finish_reason, Some(FinishReason::Stop));
    assert!(terminal[0].usage.is_some());
}

#[tokio::test]
async fn streaming_and_buffered_outputs_are_equivalent() {
    let behavior = MockBehavior::tokens(&["The ", "answer ", "is ", "42."]);

    let (router, _) = router_with(behavior.clone(), RegistryConfig::default());
    let buffered = router.generate(text_request("q")).await.unwrap();

    let (router, _) = router_with(behavior, RegistryConfig::default());
    let session = router
        .start_session(text_request("q").with_stream())
        .await
        .unwrap();
    let streamed = session.into_stream().collect_text().await.unwrap();

    assert_eq!(buffered.text, streamed);
    assert_eq!(buffered.finish_reason, FinishReason::Stop);
}

#[tokio::test]
async fn stop_sequence_ends_session_without_leaking_it() {
    let (router, _) = router_with(
        MockBehavior::tokens(&["Hello wo", "rld STOP more text"]),
        RegistryConfig::default(),
    );

    let request = text_request("hi")
        .with_sampling(SamplingParams::default().with_stop("STOP"));
    let response = router.generate(request).await.unwrap();

    assert_eq!(response.text, "Hello world ");
    assert_eq!(response.finish_reason, FinishReason::Stop);
}

#[tokio::test]
async fn stop_sequence_split_across_tokens_is_caught() {
    let (router, _) = router_with(
        MockBehavior::tokens(&["before ST", "OP after"]),
        RegistryConfig::default(),
    );

    let request = text_request("hi")
        .with_sampling(SamplingParams::default().with_stop("STOP"));
    let response = router.generate(request).await.unwrap();

    assert_eq!(response.text, "before ");
    assert_eq!(response.finish_reason, FinishReason::Stop);
}

#[tokio::test]
async fn max_tokens_finishes_with_length() {
    let (router, _) = router_with(
        MockBehavior::tokens(&["a", "b", "c", "d", "e"]),
        RegistryConfig::default(),
    );

    let request =
        text_request("hi").with_sampling(SamplingParams::default().with_max_tokens(3));
    let response = router.generate(request).await.unwrap();

    assert_eq!(response.text, "abc");
    assert_eq!(response.finish_reason, FinishReason::Length);
    assert_eq!(response.usage.completion_tokens, 3);
}

#[tokio::test]
async fn timeout_finishes_with_timeout_reason() {
    let (router, _) = router_with(
        MockBehavior {
            tokens: vec!["slow".into(); 50],
            token_delay: Some(Duration::from_millis(30)),
            ..MockBehavior::default()
        },
        RegistryConfig::default(),
    );

    let response = router
        .generate(text_request("hi").with_timeout_ms(45))
        .await
        .unwrap();
    assert_eq!(response.finish_reason, FinishReason::Timeout);
}

#[tokio::test]
async fn cancellation_stops_pulls_within_one_step() {
    let (router, runtime) = router_with(
        MockBehavior::tokens(&["one", "two", "three", "four"]),
        RegistryConfig::default(),
    );

    let mut session = router.start_session(text_request("hi")).await.unwrap();
    let cancel = session.cancel_handle();

    let first = session.next_chunk().await.unwrap();
    assert_eq!(first.delta.as_deref(), Some("one"));
    let pulls_before = runtime.pulls.load(std::sync::atomic::Ordering::SeqCst);

    cancel.cancel();
    let terminal = session.next_chunk().await.unwrap();
    assert_eq!(terminal.finish_reason, Some(FinishReason::Cancelled));
    assert!(session.next_chunk().await.is_none());

    // No further native pulls happened after cancellation.
    let pulls_after = runtime.pulls.load(std::sync::atomic::Ordering::SeqCst);
    assert_eq!(pulls_before, pulls_after);
}

#[tokio::test]
async fn empty_stream_still_terminates_cleanly() {
    let (router, _) = router_with(MockBehavior::tokens(&[]), RegistryConfig::default());
    let session = router
        .start_session(text_request("hi").with_stream())
        .await
        .unwrap();
    let mut stream = session.into_stream();

    let only = stream.next().await.unwrap().unwrap();
    assert_eq!(only.finish_reason, Some(FinishReason::Stop));
    assert!(stream.next().await.is_none());
}
