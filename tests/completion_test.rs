//! HTTP completion backend against a mock chat-completions server.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use realtime_relay::core::completion::{
    CompletionBackend, CompletionError, CompletionMessage, CompletionRequest, CompletionRole,
    HttpCompletion,
};

fn request(text: &str) -> CompletionRequest {
    CompletionRequest {
        instructions: Some("Answer briefly.".to_string()),
        messages: vec![CompletionMessage::new(CompletionRole::User, text)],
        temperature: Some(0.5),
        max_output_tokens: Some(64),
    }
}

fn reply(content: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "choices": [{"index": 0, "message": {"role": "assistant", "content": content}}]
    }))
}

#[tokio::test]
async fn test_completion_returns_first_choice() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-completion"))
        .and(body_partial_json(json!({
            "model": "qwen-plus",
            "temperature": 0.5,
            "max_tokens": 64,
            "messages": [
                {"role": "system", "content": "Answer briefly."},
                {"role": "user", "content": "What time is it?"}
            ]
        })))
        .respond_with(reply("Time to test."))
        .expect(1)
        .mount(&server)
        .await;

    let backend = HttpCompletion::new(format!("{}/v1/", server.uri()), "qwen-plus")
        .with_api_key("sk-completion");
    let text = backend.complete(request("What time is it?")).await.unwrap();
    assert_eq!(text, "Time to test.");
}

#[tokio::test]
async fn test_reasoning_effort_suffix() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({
            "model": "o3-mini",
            "reasoning_effort": "high"
        })))
        .respond_with(reply("Thought about it."))
        .expect(1)
        .mount(&server)
        .await;

    let backend = HttpCompletion::new(server.uri(), "o3-mini-high");
    let text = backend.complete(request("Think hard.")).await.unwrap();
    assert_eq!(text, "Thought about it.");
}

#[tokio::test]
async fn test_error_status_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .mount(&server)
        .await;

    let backend = HttpCompletion::new(server.uri(), "qwen-plus");
    let err = backend.complete(request("Hello")).await.unwrap_err();
    assert!(matches!(
        &err,
        CompletionError::Status { status: 500, body } if body == "upstream exploded"
    ));
    assert_eq!(err.code(), "completion_error");
}

#[tokio::test]
async fn test_empty_choices_are_invalid() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&server)
        .await;

    let backend = HttpCompletion::new(server.uri(), "qwen-plus");
    let err = backend.complete(request("Hello")).await.unwrap_err();
    assert!(matches!(err, CompletionError::InvalidResponse(_)));
}

#[tokio::test]
async fn test_slow_backend_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(reply("late").set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let backend =
        HttpCompletion::new(server.uri(), "qwen-plus").with_timeout(Duration::from_millis(200));
    let err = backend.complete(request("Hello")).await.unwrap_err();
    assert!(matches!(err, CompletionError::Request(_)));
}
