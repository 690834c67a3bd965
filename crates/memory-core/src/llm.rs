//! The model-call collaborator.
//!
//! Concrete transports live outside this crate; the orchestrator only needs
//! "send a prompt, get text back".

use crate::types::PromptMessage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelCallError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("API error (HTTP {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// One non-streaming model call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRequest {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    pub messages: Vec<PromptMessage>,
    pub max_output_tokens: u32,
    pub temperature: f32,
}

#[async_trait]
pub trait ModelInvoker: Send + Sync {
    /// Send the request and return the response text.
    async fn invoke(&self, request: ModelRequest) -> Result<String, ModelCallError>;
}

/// Arc-wrapped invoker for sharing across tasks.
pub type SharedModelInvoker = Arc<dyn ModelInvoker>;
