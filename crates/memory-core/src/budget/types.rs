//! Core types for context preparation.

use crate::budget::context::BudgetAdvisory;
use crate::types::PromptMessage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Messages ready for a conversational model call.
#[derive(Debug, Clone)]
pub struct PreparedContext {
    /// System prompt after truncation, if the thread has one
    pub system_prompt: Option<String>,
    /// Summary block, recent window and the new user message, in order
    pub messages: Vec<PromptMessage>,
    pub token_usage: TokenUsageBreakdown,
    /// Whether any recent message was dropped to fit the window
    pub truncation_occurred: bool,
    pub advisory: Option<BudgetAdvisory>,
}

/// Detailed token usage breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenUsageBreakdown {
    /// Tokens used by the system prompt, overhead included
    pub system_tokens: u32,
    /// Tokens used by the injected summary
    pub summary_tokens: u32,
    /// Tokens used by the recent message window and the new message
    pub window_tokens: u32,
    pub total_tokens: u32,
    /// Context window of the target model
    pub budget_limit: u32,
}

impl TokenUsageBreakdown {
    /// Percentage of the window used.
    pub fn usage_percentage(&self) -> f64 {
        if self.budget_limit == 0 {
            return 0.0;
        }
        (self.total_tokens as f64 / self.budget_limit as f64) * 100.0
    }
}

/// Errors on the conversational path; these reach the caller.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BudgetError {
    #[error("System prompt ({system_tokens} tokens) exceeds available budget ({available_tokens} tokens)")]
    SystemPromptTooLarge {
        system_tokens: u32,
        available_tokens: u32,
    },

    #[error("ERROR_MSG_TOO_LONG: user message tokens ({message_tokens}) exceed model max_tokens ({max_tokens})")]
    MessageTooLong { message_tokens: u32, max_tokens: u32 },

    #[error("Request ({required_tokens} tokens) does not fit the context window ({available_tokens} tokens available)")]
    ContextExceeded {
        required_tokens: u32,
        available_tokens: u32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_percentage_handles_zero_limit() {
        let usage = TokenUsageBreakdown {
            system_tokens: 0,
            summary_tokens: 0,
            window_tokens: 10,
            total_tokens: 10,
            budget_limit: 0,
        };
        assert_eq!(usage.usage_percentage(), 0.0);
    }

    #[test]
    fn message_too_long_mentions_both_counts() {
        let err = BudgetError::MessageTooLong {
            message_tokens: 2000,
            max_tokens: 1024,
        };
        let text = err.to_string();
        assert!(text.contains("2000"));
        assert!(text.contains("1024"));
    }
}
