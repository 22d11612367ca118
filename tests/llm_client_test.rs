use httpmock::prelude::*;
use scholar_pipeline::adapters::OpenAiCompatibleClient;
use scholar_pipeline::config::toml_config::LlmConfig;
use scholar_pipeline::domain::model::ChatMessage;
use scholar_pipeline::domain::ports::LanguageModel;
use scholar_pipeline::ScholarError;
use serde_json::json;

fn client(server: &MockServer, retry_attempts: u32) -> OpenAiCompatibleClient {
    OpenAiCompatibleClient::new(LlmConfig {
        base_url: server.url("/v1/"),
        api_key: "test-key".to_string(),
        model: "test-model".to_string(),
        timeout_seconds: 5,
        retry_attempts,
        retry_delay_seconds: 0,
        ..LlmConfig::default()
    })
    .unwrap()
}

fn messages() -> Vec<ChatMessage> {
    vec![
        ChatMessage::system("You are terse."),
        ChatMessage::user("Say hi"),
    ]
}

#[tokio::test]
async fn test_completion_request_and_response() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/chat/completions")
                .header("authorization", "Bearer test-key")
                .json_body_partial(
                    r#"{"model": "test-model", "messages": [{"role": "system", "content": "You are terse."}, {"role": "user", "content": "Say hi"}]}"#,
                );
            then.status(200).json_body(json!({
                "id": "cmpl-1",
                "choices": [{ "index": 0, "message": { "role": "assistant", "content": "  hi  " } }]
            }));
        })
        .await;

    let answer = client(&server, 0).complete(&messages()).await.unwrap();

    assert_eq!(answer, "hi");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_provider_error_message_is_surfaced() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/chat/completions");
            then.status(401).json_body(json!({
                "error": { "message": "Incorrect API key provided", "type": "invalid_request_error" }
            }));
        })
        .await;

    let err = client(&server, 3).complete(&messages()).await.unwrap_err();

    match err {
        ScholarError::LlmError { status, message } => {
            assert_eq!(status, 401);
            assert_eq!(message, "Incorrect API key provided");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    // 4xx 不重試
    mock.assert_hits_async(1).await;
}

#[tokio::test]
async fn test_html_body_is_rejected() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/chat/completions");
            then.status(200)
                .header("content-type", "text/html")
                .body("<!DOCTYPE html><html><body>Gateway login</body></html>");
        })
        .await;

    let err = client(&server, 0).complete(&messages()).await.unwrap_err();

    match err {
        ScholarError::LlmError { message, .. } => assert!(message.contains("HTML")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_blank_completion_is_an_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/chat/completions");
            then.status(200).json_body(json!({
                "choices": [{ "message": { "role": "assistant", "content": "   " } }]
            }));
        })
        .await;

    let err = client(&server, 0).complete(&messages()).await.unwrap_err();
    assert!(matches!(err, ScholarError::EmptyCompletion));
}

#[tokio::test]
async fn test_transient_errors_are_retried() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/chat/completions");
            then.status(503)
                .json_body(json!({ "error": { "message": "overloaded" } }));
        })
        .await;

    let err = client(&server, 2).complete(&messages()).await.unwrap_err();

    assert!(matches!(err, ScholarError::LlmError { status: 503, .. }));
    // 第一次 + 兩次重試
    mock.assert_hits_async(3).await;
}
