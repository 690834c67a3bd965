//! OpenAI-compatible chat completion payloads.

use memory_core::llm::ModelRequest;
use memory_core::types::Role;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<WireMessage<'a>>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub stream: bool,
}

#[derive(Debug, Serialize)]
pub struct WireMessage<'a> {
    pub role: &'static str,
    pub content: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
pub struct ChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
}

/// Non-streaming body; the system prompt goes first as a `system` message.
pub fn build_body(request: &ModelRequest) -> ChatCompletionRequest<'_> {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);
    if let Some(system) = request.system_prompt.as_deref().filter(|s| !s.trim().is_empty()) {
        messages.push(WireMessage {
            role: Role::System.as_str(),
            content: system,
        });
    }
    messages.extend(request.messages.iter().map(|m| WireMessage {
        role: m.role.as_str(),
        content: &m.content,
    }));

    ChatCompletionRequest {
        model: &request.model,
        messages,
        max_tokens: request.max_output_tokens,
        temperature: request.temperature,
        stream: false,
    }
}

/// Text of the first choice, if the provider returned one.
pub fn first_choice_text(response: ChatCompletionResponse) -> Option<String> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
}
