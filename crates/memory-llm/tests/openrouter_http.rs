use memory_core::llm::{ModelCallError, ModelInvoker, ModelRequest};
use memory_core::types::PromptMessage;
use memory_llm::OpenRouterInvoker;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn request() -> ModelRequest {
    ModelRequest {
        model: "openai/gpt-3.5-turbo".to_string(),
        system_prompt: Some("Return JSON".to_string()),
        messages: vec![PromptMessage::user("alice (user): I like tea")],
        max_output_tokens: 256,
        temperature: 0.2,
    }
}

#[tokio::test]
async fn returns_first_choice_content() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("Authorization", "Bearer sk-or-test"))
        .and(body_partial_json(serde_json::json!({
            "model": "openai/gpt-3.5-turbo",
            "stream": false,
            "max_tokens": 256
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "{\"core_facts\": []}"}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let invoker = OpenRouterInvoker::new("sk-or-test").with_base_url(server.uri());
    let text = invoker.invoke(request()).await.unwrap();
    assert_eq!(text, "{\"core_facts\": []}");
}

#[tokio::test]
async fn maps_http_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .mount(&server)
        .await;

    let invoker = OpenRouterInvoker::new("k").with_base_url(server.uri());
    let err = invoker.invoke(request()).await.unwrap_err();
    assert_eq!(err, ModelCallError::RateLimited("slow down".to_string()));
}

#[tokio::test]
async fn auth_failure_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
        .mount(&server)
        .await;

    let invoker = OpenRouterInvoker::new("k").with_base_url(server.uri());
    assert!(matches!(
        invoker.invoke(request()).await,
        Err(ModelCallError::Auth(_))
    ));
}

#[tokio::test]
async fn empty_choices_is_invalid() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})))
        .mount(&server)
        .await;

    let invoker = OpenRouterInvoker::new("k").with_base_url(server.uri());
    assert!(matches!(
        invoker.invoke(request()).await,
        Err(ModelCallError::InvalidResponse(_))
    ));
}

#[tokio::test]
async fn slow_server_hits_transport_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_secs(2))
                .set_body_json(serde_json::json!({"choices": []})),
        )
        .mount(&server)
        .await;

    let invoker = OpenRouterInvoker::new("k")
        .with_base_url(server.uri())
        .with_timeout(Duration::from_millis(100));
    assert!(matches!(
        invoker.invoke(request()).await,
        Err(ModelCallError::Transport(_))
    ));
}
