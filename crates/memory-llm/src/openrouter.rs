use async_trait::async_trait;
use memory_core::llm::{ModelCallError, ModelInvoker, ModelRequest};
use reqwest::{Client, StatusCode};
use std::time::Duration;

use crate::protocol::{build_body, first_choice_text, ChatCompletionResponse};

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Non-streaming chat completions against OpenRouter or any
/// OpenAI-compatible endpoint.
pub struct OpenRouterInvoker {
    client: Client,
    api_key: String,
    base_url: String,
    timeout: Option<Duration>,
}

impl OpenRouterInvoker {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: None,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Per-request HTTP timeout. The orchestrator applies its own deadline
    /// on top of this.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl std::fmt::Debug for OpenRouterInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenRouterInvoker")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

fn map_status(status: StatusCode, body: String) -> ModelCallError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ModelCallError::Auth(body),
        StatusCode::TOO_MANY_REQUESTS => ModelCallError::RateLimited(body),
        other => ModelCallError::Api {
            status: other.as_u16(),
            body,
        },
    }
}

#[async_trait]
impl ModelInvoker for OpenRouterInvoker {
    async fn invoke(&self, request: ModelRequest) -> Result<String, ModelCallError> {
        let body = build_body(&request);
        log::debug!(
            "OpenRouter request: model={} messages={} max_tokens={}",
            body.model,
            body.messages.len(),
            body.max_tokens
        );

        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body);
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ModelCallError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            log::warn!("OpenRouter returned HTTP {}: {}", status, text);
            return Err(map_status(status, text));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ModelCallError::InvalidResponse(e.to_string()))?;

        first_choice_text(parsed)
            .ok_or_else(|| ModelCallError::InvalidResponse("response has no message content".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let invoker = OpenRouterInvoker::new("sk-or-test");
        assert_eq!(invoker.api_key, "sk-or-test");
        assert_eq!(invoker.base_url(), DEFAULT_BASE_URL);
        assert!(invoker.timeout.is_none());
    }

    #[test]
    fn test_with_base_url_strips_trailing_slash() {
        let invoker = OpenRouterInvoker::new("k").with_base_url("http://localhost:8080/v1/");
        assert_eq!(invoker.base_url(), "http://localhost:8080/v1");
    }

    #[test]
    fn test_debug_hides_key() {
        let invoker = OpenRouterInvoker::new("secret-key");
        assert!(!format!("{:?}", invoker).contains("secret-key"));
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            map_status(StatusCode::UNAUTHORIZED, String::new()),
            ModelCallError::Auth(_)
        ));
        assert!(matches!(
            map_status(StatusCode::FORBIDDEN, String::new()),
            ModelCallError::Auth(_)
        ));
        assert!(matches!(
            map_status(StatusCode::TOO_MANY_REQUESTS, String::new()),
            ModelCallError::RateLimited(_)
        ));
        assert_eq!(
            map_status(StatusCode::BAD_GATEWAY, "upstream".into()),
            ModelCallError::Api {
                status: 502,
                body: "upstream".into()
            }
        );
    }
}
