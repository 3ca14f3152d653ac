use agora::client_wrapper::{ClientWrapper, Message, Role, TokenUsage};
use agora::clients::deepseek::DeepSeekClient;
use agora::clients::openai_compatible::OpenAICompatibleClient;
use agora::error::ChatError;
use agora::llm_adapter::{LlmAdapter, RetryPolicy};
use agora::AgoraConfig;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn completion(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 12, "completion_tokens": 5, "total_tokens": 17}
    })
}

fn adapter_for(server: &MockServer) -> LlmAdapter {
    let client = OpenAICompatibleClient::new("test-key", "deepseek-chat", &server.uri()).unwrap();
    LlmAdapter::new(Arc::new(client), 0.0)
}

fn context() -> Vec<Message> {
    vec![Message::new(Role::User, "hi").with_name("User")]
}

#[tokio::test]
async fn test_request_carries_model_messages_and_clamped_temperature() {
    agora::init_logger();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(json!({
            "model": "deepseek-chat",
            "temperature": 1.0,
            "messages": [
                {"role": "system", "content": "You are A"},
                {"role": "user", "content": "hi", "name": "User"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("hello from A")))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = adapter_for(&server);
    let reply = adapter.complete("You are A", &context(), 1.3).await.unwrap();

    assert_eq!(reply, "hello from A");
    assert_eq!(
        adapter.last_usage().await,
        Some(TokenUsage {
            input_tokens: 12,
            output_tokens: 5,
            total_tokens: 17
        })
    );
}

#[tokio::test]
async fn test_flat_content_body_is_accepted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"content": "flat reply"})))
        .mount(&server)
        .await;

    let reply = adapter_for(&server)
        .complete("You are A", &context(), 0.7)
        .await
        .unwrap();
    assert_eq!(reply, "flat reply");
}

#[tokio::test]
async fn test_non_2xx_is_an_upstream_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .expect(1)
        .mount(&server)
        .await;

    let err = adapter_for(&server)
        .complete("You are A", &context(), 0.7)
        .await
        .unwrap_err();

    match err {
        ChatError::Upstream(message) => {
            assert!(message.contains("HTTP 401"), "{}", message);
            assert!(message.contains("invalid api key"), "{}", message);
        }
        other => panic!("expected upstream error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_malformed_body_is_an_upstream_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
        .mount(&server)
        .await;

    let err = adapter_for(&server)
        .complete("You are A", &context(), 0.7)
        .await
        .unwrap_err();
    assert!(matches!(err, ChatError::Upstream(ref m) if m.contains("malformed response body")));

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&server)
        .await;

    let err = adapter_for(&server)
        .complete("You are A", &context(), 0.7)
        .await
        .unwrap_err();
    assert!(matches!(err, ChatError::Upstream(ref m) if m.contains("no reply content")));
}

#[tokio::test]
async fn test_retry_policy_recovers_from_transient_failures() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("third time lucky")))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = adapter_for(&server).with_retry_policy(RetryPolicy {
        max_retries: 2,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(1),
        multiplier: 1.0,
    });

    let reply = adapter.complete("You are A", &context(), 0.7).await.unwrap();
    assert_eq!(reply, "third time lucky");
}

#[tokio::test]
async fn test_deepseek_client_points_at_configured_backend() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({"model": "deepseek-chat"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("ok")))
        .expect(1)
        .mount(&server)
        .await;

    let config = AgoraConfig {
        api_key: "test-key".to_string(),
        base_url: server.uri(),
        ..AgoraConfig::default()
    };
    let client = DeepSeekClient::from_config(&config).unwrap();
    assert_eq!(client.model_name(), "deepseek-chat");

    let reply = client.send_message(&context(), Some(0.5)).await.unwrap();
    assert_eq!(&*reply.content, "ok");
    assert_eq!(reply.role, Role::Assistant);
}

#[test]
fn test_missing_api_key_is_a_configuration_error() {
    let config = AgoraConfig::default();
    assert!(config.api_key.is_empty());

    match DeepSeekClient::from_config(&config) {
        Err(ChatError::Configuration(message)) => assert!(message.contains("DEEPSEEK_API_KEY")),
        Err(other) => panic!("unexpected error: {:?}", other),
        Ok(_) => panic!("a client without a key must not be built"),
    }
}
