//! OpenRouter client against a mocked upstream.

use futures::StreamExt;
use secrecy::Secret;
use service_core::providers::{
    ChatMessage, ChatProvider, GenerationParams, OpenRouterConfig, OpenRouterProvider,
    ProviderError, StreamChunk,
};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn provider_for(server: &MockServer) -> OpenRouterProvider {
    OpenRouterProvider::new(OpenRouterConfig {
        base_url: format!("{}/api/v1", server.uri()),
        api_key: Some(Secret::new("test-key".to_string())),
        model: "test/model".to_string(),
        referer: Some("http://localhost:3000".to_string()),
        app_title: Some("Story Maker App".to_string()),
        timeout_secs: 5,
    })
    .expect("Failed to build provider")
}

#[tokio::test]
async fn complete_returns_first_choice() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .and(header("HTTP-Referer", "http://localhost:3000"))
        .and(header("X-Title", "Story Maker App"))
        .and(body_partial_json(json!({
            "model": "test/model",
            "max_tokens": 50,
            "messages": [{"role": "user", "content": "title please"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "message": {"role": "assistant", "content": "  The Moon Picnic \n"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 12, "completion_tokens": 4}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let completion = provider_for(&server)
        .complete(
            &[ChatMessage::user("title please")],
            &GenerationParams::new(50, 0.9),
        )
        .await
        .expect("completion should succeed");

    assert_eq!(completion.text.as_deref(), Some("  The Moon Picnic \n"));
    assert_eq!(completion.input_tokens, 12);
    assert_eq!(completion.output_tokens, 4);
}

#[tokio::test]
async fn rate_limit_status_is_distinguished() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let err = provider_for(&server)
        .complete(&[ChatMessage::user("x")], &GenerationParams::default())
        .await
        .unwrap_err();

    assert!(matches!(err, ProviderError::RateLimited));
    assert!(err.is_unavailable());
}

#[tokio::test]
async fn auth_failure_is_an_api_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("No auth credentials found"))
        .mount(&server)
        .await;

    let err = provider_for(&server)
        .complete(&[ChatMessage::user("x")], &GenerationParams::default())
        .await
        .unwrap_err();

    match err {
        ProviderError::ApiError(msg) => assert!(msg.contains("401")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn non_json_body_is_malformed() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let err = provider_for(&server)
        .complete(&[ChatMessage::user("x")], &GenerationParams::default())
        .await
        .unwrap_err();

    assert!(err.is_malformed());
    assert_eq!(err.category(), "malformed");
}

#[tokio::test]
async fn stream_yields_deltas_in_order() {
    let server = MockServer::start().await;

    let body = concat!(
        ": OPENROUTER PROCESSING\n\n",
        "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\",\"content\":\"\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"Once \"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"upon \"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"a time...\"},\"finish_reason\":\"stop\"}],",
        "\"usage\":{\"prompt_tokens\":30,\"completion_tokens\":3}}\n\n",
        "data: [DONE]\n\n",
    );

    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .and(body_partial_json(json!({"stream": true})))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let stream = provider_for(&server)
        .complete_stream(
            &[ChatMessage::user("story")],
            &GenerationParams::new(400, 0.8),
        )
        .await
        .expect("stream should open");

    let items: Vec<StreamChunk> = stream
        .map(|item| item.expect("no stream errors expected"))
        .collect()
        .await;

    assert_eq!(
        &items[..3],
        &[
            StreamChunk::Text("Once ".to_string()),
            StreamChunk::Text("upon ".to_string()),
            StreamChunk::Text("a time...".to_string()),
        ]
    );
    match &items[3] {
        StreamChunk::Complete {
            input_tokens,
            output_tokens,
            ..
        } => {
            assert_eq!(*input_tokens, 30);
            assert_eq!(*output_tokens, 3);
        }
        other => panic!("expected completion, got {other:?}"),
    }
    assert_eq!(items.len(), 4);
}

#[tokio::test]
async fn stream_error_event_surfaces_as_item() {
    let server = MockServer::start().await;

    let body = concat!(
        "data: {\"choices\":[{\"delta\":{\"content\":\"Once \"}}]}\n\n",
        "data: {\"error\":{\"message\":\"provider overloaded\",\"code\":502}}\n\n",
    );

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let items: Vec<_> = provider_for(&server)
        .complete_stream(&[ChatMessage::user("story")], &GenerationParams::default())
        .await
        .expect("stream should open")
        .collect()
        .await;

    assert_eq!(items.len(), 2);
    assert!(matches!(items[0], Ok(StreamChunk::Text(ref t)) if t == "Once "));
    assert!(matches!(items[1], Err(ProviderError::ApiError(ref m)) if m == "provider overloaded"));
}
