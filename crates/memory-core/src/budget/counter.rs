//! Token estimation for budget management.
//!
//! The estimator is deliberately approximate: it counts whitespace-separated
//! words and multiplies by a provider constant, rounding up. It over-estimates
//! on purpose and must not be treated as a real tokenizer.

use crate::budget::profiles::ModelProfileRegistry;
use crate::error::SummarizationError;
use crate::types::HasContent;
use std::sync::Arc;

/// Formatting overhead added for every message in a list.
pub const MESSAGE_OVERHEAD: u32 = 10;

/// Overhead added once when a system prompt is present.
pub const SYSTEM_OVERHEAD: u32 = 50;

/// An estimate and whether it was priced with a known model profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenEstimate {
    pub tokens: u32,
    /// False when the model had no profile and the default constant was used
    pub verified: bool,
}

/// Word-count token estimator bound to a profile registry.
#[derive(Debug, Clone)]
pub struct TokenEstimator {
    profiles: Arc<ModelProfileRegistry>,
}

impl TokenEstimator {
    pub fn new(profiles: Arc<ModelProfileRegistry>) -> Self {
        Self { profiles }
    }

    pub fn profiles(&self) -> &Arc<ModelProfileRegistry> {
        &self.profiles
    }

    /// Approximate token count of `text` for `model`.
    ///
    /// Unknown models are priced with the default constant.
    pub fn estimate(&self, text: &str, model: &str) -> u32 {
        self.estimate_detailed(text, model).tokens
    }

    /// Like [`estimate`](Self::estimate) but reports whether the model was known.
    pub fn estimate_detailed(&self, text: &str, model: &str) -> TokenEstimate {
        let resolved = self.profiles.resolve(model);
        if resolved.is_fallback {
            tracing::debug!(model, "token estimate is unverified: unknown model");
        }
        TokenEstimate {
            tokens: estimate_words(text, resolved.profile.tokens_per_word),
            verified: !resolved.is_fallback,
        }
    }

    /// Strict variant that refuses to price text for a model with no profile.
    pub fn estimate_checked(&self, text: &str, model: &str) -> Result<u32, SummarizationError> {
        let profile = self
            .profiles
            .get(model)
            .ok_or_else(|| SummarizationError::EstimationUnavailable(model.to_string()))?;
        Ok(estimate_words(text, profile.tokens_per_word))
    }

    /// Approximate token count of a message list plus optional system prompt.
    pub fn estimate_messages<M: HasContent>(
        &self,
        messages: &[M],
        model: &str,
        system_prompt: Option<&str>,
    ) -> u32 {
        let tokens_per_word = self.profiles.resolve(model).profile.tokens_per_word;

        let system_tokens = match system_prompt {
            Some(prompt) if !prompt.trim().is_empty() => {
                SYSTEM_OVERHEAD.saturating_add(estimate_words(prompt, tokens_per_word))
            }
            _ => 0,
        };

        messages
            .iter()
            .map(|m| estimate_words(m.content(), tokens_per_word).saturating_add(MESSAGE_OVERHEAD))
            .fold(system_tokens, |acc, x| acc.saturating_add(x))
    }
}

/// `ceil(words * tokens_per_word)`; zero for empty or whitespace-only text.
pub fn estimate_words(text: &str, tokens_per_word: f64) -> u32 {
    let words = text.split_whitespace().count();
    if words == 0 {
        return 0;
    }
    let tokens = (words as f64 * tokens_per_word).ceil();
    if tokens >= u32::MAX as f64 {
        u32::MAX
    } else {
        tokens as u32
    }
}
