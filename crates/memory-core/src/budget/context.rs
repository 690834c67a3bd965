//! Per-conversation context window accounting.

use crate::budget::counter::TokenEstimator;
use crate::budget::profiles::{ModelProfile, ModelProfileRegistry};
use serde::{Deserialize, Serialize};

/// Default safety buffer for a running conversation.
pub const DEFAULT_SESSION_BUFFER: u32 = 500;

/// Default safety buffer for one-off validation.
pub const DEFAULT_VALIDATION_BUFFER: u32 = 100;

/// Default fraction at which [`ContextBudget::warn_if_approaching`] fires.
pub const DEFAULT_WARN_FRACTION: f64 = 0.9;

/// Snapshot of context window usage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetStatus {
    pub model: String,
    pub used: u32,
    pub max: u32,
    /// `max(0, max - used)`, ignoring the buffer
    pub remaining: u32,
    /// Percentage of the window used, rounded to two decimals
    pub percentage_used: f64,
    /// True when `used + buffer > max`
    pub over_safety_threshold: bool,
    /// True when the remaining room is strictly larger than the buffer
    pub is_valid: bool,
    pub buffer: u32,
    /// How far into the buffer usage has reached
    pub tokens_to_safety: u32,
    #[serde(default)]
    pub history_length: usize,
}

/// Severity of a budget advisory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdvisoryLevel {
    Info,
    Warning,
    Critical,
}

/// Non-fatal notice about how full the window is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetAdvisory {
    pub level: AdvisoryLevel,
    pub message: String,
}

/// One `add` call recorded by the accumulator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageEntry {
    pub source: String,
    pub tokens: u32,
    pub cumulative: u32,
}

/// Running token usage for one conversation against one model.
///
/// Never persisted. Accumulation is not capped: callers ask
/// [`can_fit`](Self::can_fit) / [`available`](Self::available) and decide.
#[derive(Debug, Clone)]
pub struct ContextBudget {
    estimator: TokenEstimator,
    profile: ModelProfile,
    buffer: u32,
    used_tokens: u32,
    history: Vec<UsageEntry>,
}

impl ContextBudget {
    /// Budget for `model` with the default session buffer.
    pub fn new(estimator: TokenEstimator, model: &str) -> Self {
        Self::with_buffer(estimator, model, DEFAULT_SESSION_BUFFER)
    }

    pub fn with_buffer(estimator: TokenEstimator, model: &str, buffer: u32) -> Self {
        let profile = estimator.profiles().resolve(model).profile;
        Self {
            estimator,
            profile,
            buffer,
            used_tokens: 0,
            history: Vec::new(),
        }
    }

    pub fn profile(&self) -> &ModelProfile {
        &self.profile
    }

    pub fn used_tokens(&self) -> u32 {
        self.used_tokens
    }

    pub fn buffer(&self) -> u32 {
        self.buffer
    }

    pub fn history(&self) -> &[UsageEntry] {
        &self.history
    }

    /// Estimate `text` and add it to the running total. Returns the tokens added.
    pub fn add(&mut self, text: &str) -> u32 {
        self.add_from(text, "message")
    }

    /// Like [`add`](Self::add), tagging the history entry with `source`.
    pub fn add_from(&mut self, text: &str, source: &str) -> u32 {
        let tokens = self.estimator.estimate(text, &self.profile.name);
        self.add_tokens(tokens, source);
        tokens
    }

    /// Add an already-estimated token count.
    pub fn add_tokens(&mut self, tokens: u32, source: &str) {
        self.used_tokens = self.used_tokens.saturating_add(tokens);
        self.history.push(UsageEntry {
            source: source.to_string(),
            tokens,
            cumulative: self.used_tokens,
        });
    }

    /// True iff `text` fits under the window while keeping the buffer free.
    ///
    /// Always false once `used + buffer` reaches the window.
    pub fn can_fit(&self, text: &str) -> bool {
        let tokens = self.estimator.estimate(text, &self.profile.name);
        self.can_fit_tokens(tokens)
    }

    pub fn can_fit_tokens(&self, tokens: u32) -> bool {
        let reserved = self.used_tokens.saturating_add(self.buffer);
        reserved < self.profile.context_window
            && reserved.saturating_add(tokens) <= self.profile.context_window
    }

    /// `max(0, context_window - buffer - used)`
    pub fn available(&self) -> u32 {
        self.profile
            .context_window
            .saturating_sub(self.buffer)
            .saturating_sub(self.used_tokens)
    }

    pub fn status(&self) -> BudgetStatus {
        let mut status = compute_status(&self.profile, self.used_tokens, self.buffer);
        status.history_length = self.history.len();
        status
    }

    /// Advisory string once usage reaches `threshold_fraction` of the window.
    pub fn warn_if_approaching(&self, threshold_fraction: f64) -> Option<String> {
        let status = self.status();
        if status.percentage_used >= threshold_fraction * 100.0 {
            Some(format!(
                "{}% of context window used for {}. Only {} tokens remaining.",
                status.percentage_used, status.model, status.remaining
            ))
        } else {
            None
        }
    }

    /// Graded advisory: info at 50 %, warning at 75 %, critical at 90 %.
    pub fn advisory(&self) -> Option<BudgetAdvisory> {
        advisory_for(&self.status())
    }

    /// Zero the running total, e.g. after the thread was compacted.
    pub fn reset(&mut self) {
        self.used_tokens = 0;
        self.history.clear();
    }
}

/// Stateless status for an externally tracked usage value.
pub fn validate_context(
    profiles: &ModelProfileRegistry,
    model: &str,
    used_tokens: u32,
    buffer: u32,
) -> BudgetStatus {
    let profile = profiles.resolve(model).profile;
    compute_status(&profile, used_tokens, buffer)
}

pub fn advisory_for(status: &BudgetStatus) -> Option<BudgetAdvisory> {
    let pct = status.percentage_used;
    let (level, message) = if pct >= 90.0 {
        (
            AdvisoryLevel::Critical,
            format!(
                "CRITICAL: {}% of context window used. Only {} tokens remaining.",
                pct, status.remaining
            ),
        )
    } else if pct >= 75.0 {
        (
            AdvisoryLevel::Warning,
            format!(
                "WARNING: {}% of context window used. {} tokens remaining.",
                pct, status.remaining
            ),
        )
    } else if pct >= 50.0 {
        (
            AdvisoryLevel::Info,
            format!("INFO: {}% of context window used.", pct),
        )
    } else {
        return None;
    };
    Some(BudgetAdvisory { level, message })
}

fn compute_status(profile: &ModelProfile, used: u32, buffer: u32) -> BudgetStatus {
    let max = profile.context_window;
    let remaining = max.saturating_sub(used);
    let percentage_used = if max == 0 {
        100.0
    } else {
        ((used as f64 / max as f64) * 10_000.0).round() / 100.0
    };

    BudgetStatus {
        model: profile.name.clone(),
        used,
        max,
        remaining,
        percentage_used,
        over_safety_threshold: used.saturating_add(buffer) > max,
        is_valid: remaining > buffer,
        buffer,
        tokens_to_safety: buffer.saturating_sub(remaining),
        history_length: 0,
    }
}
