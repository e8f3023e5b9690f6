//! Router and registry behavior: modality validation, first-load
//! serialization, failure latching, and admission control.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::{router_with, MockBehavior, MockRuntime};
use janus_core::{
    BackendKind, GenerationRequest, Modality, ModelDescriptor, ModelSource, SamplingParams,
    SpeechRequest,
};
use janus_gateway::{ModelRegistry, RegistryConfig, Router};

#[tokio::test]
async fn chat_against_tts_descriptor_is_modality_mismatch_without_native_call() {
    let runtime = MockRuntime::new(MockBehavior::tokens(&["x"]));
    let mut registry = ModelRegistry::new(RegistryConfig::default());
    registry.register_runtime(runtime.clone());
    let registry = Arc::new(registry);
    registry.register(ModelDescriptor::new(
        "piper-voice",
        BackendKind::Ggml,
        Modality::Tts,
        ModelSource::local("/unused"),
    ));
    let router = Router::new(registry);

    let err = router
        .generate(GenerationRequest::new("piper-voice", "hello"))
        .await
        .unwrap_err();

    assert_eq!(err.category(), "modality_mismatch");
    assert_eq!(runtime.load_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn speech_against_text_descriptor_is_modality_mismatch() {
    let (router, runtime) = router_with(
        MockBehavior::tokens(&["x"]),
        RegistryConfig::default(),
    );

    let err = router
        .synthesize_speech(SpeechRequest::new("gemma", "say this"))
        .await
        .unwrap_err();

    assert_eq!(err.category(), "modality_mismatch");
    assert_eq!(runtime.load_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unknown_model_without_dynamic_registration_is_not_found() {
    let (router, _) = router_with(
        MockBehavior::tokens(&["x"]),
        RegistryConfig {
            allow_dynamic: false,
            ..RegistryConfig::default()
        },
    );

    let err = router
        .generate(GenerationRequest::new("mystery", "hello"))
        .await
        .unwrap_err();
    assert_eq!(err.category(), "model_not_found");
}

#[tokio::test]
async fn concurrent_first_loads_perform_exactly_one_native_load() {
    let (router, runtime) = router_with(
        MockBehavior {
            tokens: vec!["ok".to_string()],
            load_delay: Some(Duration::from_millis(40)),
            ..MockBehavior::default()
        },
        RegistryConfig {
            max_concurrent_per_model: 8,
            ..RegistryConfig::default()
        },
    );
    let router = Arc::new(router);

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let router = Arc::clone(&router);
        tasks.push(tokio::spawn(async move {
            router.generate(GenerationRequest::new("gemma", "hi")).await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(runtime.load_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn load_failure_latches_until_reload() {
    let (router, runtime) = router_with(
        MockBehavior {
            tokens: vec!["ok".to_string()],
            fail_load: true,
            ..MockBehavior::default()
        },
        RegistryConfig::default(),
    );

    let err = router
        .generate(GenerationRequest::new("gemma", "hi"))
        .await
        .unwrap_err();
    assert_eq!(err.category(), "model_load_error");

    // Latched: the second request fails without another native attempt.
    let err = router
        .generate(GenerationRequest::new("gemma", "hi"))
        .await
        .unwrap_err();
    assert_eq!(err.category(), "model_load_error");
    assert_eq!(runtime.load_calls.load(Ordering::SeqCst), 1);

    // An explicit reload clears the latch and retries the native load.
    router.registry().reload("gemma").await.unwrap();
    let _ = router.generate(GenerationRequest::new("gemma", "hi")).await;
    assert_eq!(runtime.load_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn exceeding_concurrency_and_queue_yields_overloaded() {
    let (router, _) = router_with(
        MockBehavior {
            tokens: vec!["slow".to_string(); 100],
            token_delay: Some(Duration::from_millis(20)),
            ..MockBehavior::default()
        },
        RegistryConfig {
            max_concurrent_per_model: 1,
            max_queue_per_model: 0,
            ..RegistryConfig::default()
        },
    );

    // Holds the only permit for its whole lifetime.
    let busy = router
        .start_session(GenerationRequest::new("gemma", "hi"))
        .await
        .unwrap();

    let err = router
        .start_session(GenerationRequest::new("gemma", "hi"))
        .await
        .unwrap_err();
    assert_eq!(err.category(), "overloaded");

    // Permit is released with the session; the next request is admitted.
    drop(busy);
    router
        .start_session(GenerationRequest::new("gemma", "hi"))
        .await
        .unwrap();
}

#[tokio::test]
async fn invalid_sampling_is_rejected_before_admission() {
    let (router, runtime) = router_with(
        MockBehavior::tokens(&["x"]),
        RegistryConfig::default(),
    );

    let request = GenerationRequest::new("gemma", "hi")
        .with_sampling(SamplingParams::default().with_top_p(2.0));
    let err = router.generate(request).await.unwrap_err();

    assert_eq!(err.category(), "invalid_request");
    assert_eq!(runtime.load_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn declared_backend_must_match_registered_descriptor() {
    let (router, _) = router_with(
        MockBehavior::tokens(&["x"]),
        RegistryConfig::default(),
    );

    let request = GenerationRequest::new("gemma", "hi").with_backend(BackendKind::Onnx);
    let err = router.generate(request).await.unwrap_err();
    assert_eq!(err.category(), "invalid_request");
}
