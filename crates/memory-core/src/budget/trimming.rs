//! Fitting message lists into a model's context window.
//!
//! Messages are kept newest-first until the budget is filled, then returned in
//! chronological order. The input is never mutated.

use crate::budget::counter::TokenEstimator;
use crate::budget::types::BudgetError;
use crate::types::HasContent;
use serde::{Deserialize, Serialize};

/// Default per-message token cap used by [`filter_by_length`].
pub const DEFAULT_MAX_MESSAGE_TOKENS: u32 = 5000;

/// Default tokens reserved for the model's response.
pub const DEFAULT_RESERVE_TOKENS: u32 = 1000;

/// Result of dropping oversized messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterReport {
    pub deleted_count: usize,
    /// First 100 characters of each dropped message
    pub deleted_previews: Vec<String>,
    pub remaining_count: usize,
}

/// Result of trimming to the context window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrimReport {
    pub messages_removed: usize,
    pub messages_kept: usize,
    pub system_tokens: u32,
    pub tokens_used_by_messages: u32,
    /// Budget for messages after the reserve and system prompt
    pub available_tokens: u32,
}

impl TrimReport {
    pub fn tokens_used(&self) -> u32 {
        self.system_tokens.saturating_add(self.tokens_used_by_messages)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanReport {
    pub filtering: FilterReport,
    pub trimming: TrimReport,
    pub total_removed: usize,
}

/// Drop every message whose estimate exceeds `max_message_tokens`.
pub fn filter_by_length<M: HasContent + Clone>(
    estimator: &TokenEstimator,
    messages: &[M],
    model: &str,
    max_message_tokens: u32,
) -> (Vec<M>, FilterReport) {
    let mut kept = Vec::with_capacity(messages.len());
    let mut deleted_previews = Vec::new();

    for message in messages {
        let tokens = estimator.estimate(message.content(), model);
        if tokens > max_message_tokens {
            deleted_previews.push(preview(message.content(), 100));
            continue;
        }
        kept.push(message.clone());
    }

    let report = FilterReport {
        deleted_count: deleted_previews.len(),
        deleted_previews,
        remaining_count: kept.len(),
    };
    (kept, report)
}

/// Keep the most recent messages that fit in
/// `context_window - reserve_tokens - estimate(system_prompt)`.
///
/// A message that alone exceeds the remaining room is skipped, and older
/// messages are still considered.
pub fn trim_to_context<M: HasContent + Clone>(
    estimator: &TokenEstimator,
    messages: &[M],
    model: &str,
    system_prompt: Option<&str>,
    reserve_tokens: u32,
) -> Result<(Vec<M>, TrimReport), BudgetError> {
    let profile = estimator.profiles().resolve(model).profile;
    let max_input_tokens = profile.context_window.saturating_sub(reserve_tokens);
    let system_tokens = system_prompt
        .map(|p| estimator.estimate(p, model))
        .unwrap_or(0);

    if system_tokens >= max_input_tokens {
        return Err(BudgetError::SystemPromptTooLarge {
            system_tokens,
            available_tokens: max_input_tokens,
        });
    }
    let available_tokens = max_input_tokens - system_tokens;

    let mut selected: Vec<M> = Vec::new();
    let mut used: u32 = 0;
    let mut removed = 0usize;

    for message in messages.iter().rev() {
        let tokens = estimator.estimate(message.content(), model);
        if used.saturating_add(tokens) <= available_tokens {
            used = used.saturating_add(tokens);
            selected.push(message.clone());
        } else {
            tracing::debug!(
                "Dropping message ({tokens} tokens) that does not fit remaining budget ({budget} tokens)",
                tokens = tokens,
                budget = available_tokens.saturating_sub(used)
            );
            removed += 1;
        }
    }

    selected.reverse();

    let report = TrimReport {
        messages_removed: removed,
        messages_kept: selected.len(),
        system_tokens,
        tokens_used_by_messages: used,
        available_tokens,
    };
    Ok((selected, report))
}

/// [`filter_by_length`] followed by [`trim_to_context`].
pub fn clean_messages<M: HasContent + Clone>(
    estimator: &TokenEstimator,
    messages: &[M],
    model: &str,
    system_prompt: Option<&str>,
    max_message_tokens: u32,
    reserve_tokens: u32,
) -> Result<(Vec<M>, CleanReport), BudgetError> {
    let (filtered, filtering) = filter_by_length(estimator, messages, model, max_message_tokens);
    let (trimmed, trimming) =
        trim_to_context(estimator, &filtered, model, system_prompt, reserve_tokens)?;
    let total_removed = filtering.deleted_count + trimming.messages_removed;
    Ok((
        trimmed,
        CleanReport {
            filtering,
            trimming,
            total_removed,
        },
    ))
}

/// Truncate at a character boundary, appending `...` when shortened.
pub(crate) fn preview(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let truncated: String = s.chars().take(max_chars).collect();
    format!("{}...", truncated)
}
