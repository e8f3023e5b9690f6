//! Schema-constrained generation through the full session path.

mod common;

use common::{router_with, MockBehavior};
use janus_core::{FinishReason, GenerationRequest};
use janus_gateway::RegistryConfig;
use serde_json::json;

fn schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {"name": {"type": "string"}},
        "required": ["name"]
    })
}

#[tokio::test]
async fn free_text_backend_is_steered_to_schema_valid_output() {
    // The primary script is chatty free text; the reject-and-resample path
    // swaps to the alternate draw, which produces JSON.
    let behavior = MockBehavior::tokens(&["Sure, here you go: "])
        .with_alternates(&["{\"na", "me\":", " \"Ada\"", "}"]);
    let (router, _) = router_with(behavior, RegistryConfig::default());

    let request = GenerationRequest::new("gemma", "Give me a name").with_schema(schema());
    let response = router.generate(request).await.unwrap();

    assert_eq!(response.finish_reason, FinishReason::SchemaComplete);
    let parsed: serde_json::Value = serde_json::from_str(&response.text).unwrap();
    assert_eq!(parsed["name"], "Ada");
}

#[tokio::test]
async fn masking_backend_skips_invalid_candidates_natively() {
    let behavior = MockBehavior {
        tokens: vec![
            "I'd rather chat".to_string(),
            "{\"name\":".to_string(),
            " nope".to_string(),
            "\"Grace\"".to_string(),
            "}".to_string(),
        ],
        masking: true,
        ..MockBehavior::default()
    };
    let (router, _) = router_with(behavior, RegistryConfig::default());

    let request = GenerationRequest::new("gemma", "name?").with_schema(schema());
    let response = router.generate(request).await.unwrap();

    assert_eq!(response.finish_reason, FinishReason::SchemaComplete);
    let parsed: serde_json::Value = serde_json::from_str(&response.text).unwrap();
    assert_eq!(parsed["name"], "Grace");
}

#[tokio::test]
async fn exhausted_resample_budget_fails_schema_unsatisfiable() {
    // Both scripts produce schema-invalid text, so the budget runs out.
    let behavior = MockBehavior::tokens(&["free text"]).with_alternates(&[
        "still not json",
        "nope",
        "nah",
        "no",
        "not it",
        "negative",
        "sorry",
        "pass",
        "give up",
        "done",
    ]);
    let (router, _) = router_with(behavior, RegistryConfig::default());

    let request = GenerationRequest::new("gemma", "name?").with_schema(schema());
    let err = router.generate(request).await.unwrap_err();
    assert_eq!(err.category(), "schema_unsatisfiable");
}

#[tokio::test]
async fn truncated_document_fails_schema_unsatisfiable() {
    // Valid prefix, then the stream ends before the object closes.
    let behavior = MockBehavior::tokens(&["{\"name\": \"Ada\""]);
    let (router, _) = router_with(behavior, RegistryConfig::default());

    let request = GenerationRequest::new("gemma", "name?").with_schema(schema());
    let err = router.generate(request).await.unwrap_err();
    assert_eq!(err.category(), "schema_unsatisfiable");
}

#[tokio::test]
async fn trailing_garbage_after_completion_is_truncated() {
    let behavior = MockBehavior::tokens(&["{\"name\": \"Ada\"} and then some"]);
    let (router, _) = router_with(behavior, RegistryConfig::default());

    let request = GenerationRequest::new("gemma", "name?").with_schema(schema());
    let response = router.generate(request).await.unwrap();

    assert_eq!(response.finish_reason, FinishReason::SchemaComplete);
    assert_eq!(response.text, "{\"name\": \"Ada\"}");
}

#[tokio::test]
async fn unsupported_schema_is_rejected_before_any_native_call() {
    let (router, runtime) = router_with(
        MockBehavior::tokens(&["{}"]),
        RegistryConfig::default(),
    );

    let request = GenerationRequest::new("gemma", "hi")
        .with_schema(json!({"$ref": "#/definitions/thing"}));
    let err = router.generate(request).await.unwrap_err();

    assert_eq!(err.category(), "unsupported_schema");
    assert_eq!(
        runtime
            .load_calls
            .load(std::sync::atomic::Ordering::SeqCst),
        0
    );
}
