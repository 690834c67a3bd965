use crate::budget::BudgetError;
use crate::llm::ModelCallError;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid thread id: {0:?}")]
    InvalidThreadId(String),
}

/// Failures inside the summarization workflow.
///
/// These never escape [`maybe_summarize`](crate::orchestrator::SummarizationOrchestrator::maybe_summarize);
/// they are logged and reported through the returned outcome.
#[derive(Error, Debug)]
pub enum SummarizationError {
    #[error("No model profile for '{0}'; token estimate unavailable")]
    EstimationUnavailable(String),

    #[error("Extraction output could not be parsed: {0}")]
    ExtractionParse(String),

    #[error("Model call failed: {0}")]
    ModelCall(#[from] ModelCallError),

    #[error("Extraction call timed out after {0:?}")]
    ExtractionTimeout(Duration),

    #[error("Extraction prompt ({required_tokens} tokens) cannot fit model budget ({available_tokens} tokens)")]
    PromptTooLarge {
        required_tokens: u32,
        available_tokens: u32,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Failures while preparing a conversational prompt; these reach the caller.
#[derive(Error, Debug)]
pub enum ContextError {
    #[error(transparent)]
    Budget(#[from] BudgetError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}
